use crate::spectrograph_ctl::EventSink;
use crate::spectrograph_ctl::Request;
use crate::spectrograph_types::PortStatusMap;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use redis::streams::StreamReadOptions;
use redis::streams::StreamReadReply;
use redis::Commands;
use redis::Connection;
use redis::FromRedisValue;
use redis::RedisError;
use redis::Value;
use std::collections::HashMap;
use thiserror::Error;

pub const SET_OBS_TYPE: &str = "set_obs_type";
pub const PREPARE_OBSERVATION: &str = "prepare_observation";
pub const UPDATE_STATUS: &str = "update_status";
pub const SPECTROGRAPH_CHANGED_PORTS: &str = "spectrograph_changed_ports";

#[derive(Debug, Error)]
#[error("Failed to convert entry '{entry_id}' of stream '{stream_key}': {message}")]
pub struct ConversionError {
    stream_key: String,
    entry_id: String,
    message: String,
    #[source]
    source: Option<RedisError>,
}

impl ConversionError {
    pub fn new<S1: Into<String>, S2: Into<String>, S3: Into<String>>(
        stream_key: S1,
        entry_id: S2,
        message: S3,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            entry_id: entry_id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn from_redis_error<S1: Into<String>, S2: Into<String>>(
        stream_key: S1,
        entry_id: S2,
        source: RedisError,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            entry_id: entry_id.into(),
            message: format!("{}", source),
            source: Some(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchRequestsError {
    #[error(transparent)]
    ConversionError(#[from] ConversionError),

    #[error(transparent)]
    RedisError(#[from] RedisError),

    #[error(transparent)]
    RequestHandlerError(#[from] anyhow::Error),
}

/// Reads requests from `stream_key` forever and hands every batch, in stream
/// order, to `request_handler`. The id of the last handled entry is kept
/// under `last_entry_id_key` so a restart continues where it stopped.
pub fn dispatch_requests<E, H>(
    redis: &mut Connection,
    stream_key: &str,
    last_entry_id_key: &str,
    block_ms: usize,
    conversion_error_handler: E,
    request_handler: &mut H,
) -> Result<(), DispatchRequestsError>
where
    E: Fn(ConversionError) -> Option<ConversionError>,
    H: FnMut(Vec<Request>) -> Result<()>,
{
    loop {
        let last_entry_id = redis
            .get::<&str, Option<String>>(last_entry_id_key)?
            .unwrap_or_else(|| String::from("$"));

        let xread_result = xread_requests(
            redis,
            stream_key,
            &last_entry_id,
            block_ms,
            &conversion_error_handler,
        )?;

        let (last_entry_id, requests) = match xread_result {
            Some(xread_result) => xread_result,
            None => continue,
        };

        if !requests.is_empty() {
            request_handler(requests)?;
        }

        redis.set::<&str, String, ()>(last_entry_id_key, last_entry_id)?;
    }
}

fn xread_requests<E>(
    redis: &mut Connection,
    stream_key: &str,
    last_entry_id: &str,
    block_ms: usize,
    conversion_error_handler: E,
) -> Result<Option<(String, Vec<Request>)>, DispatchRequestsError>
where
    E: Fn(ConversionError) -> Option<ConversionError>,
{
    let opts = StreamReadOptions::default().block(block_ms);
    let reply: Option<StreamReadReply> =
        redis.xread_options(&[stream_key], &[last_entry_id], &opts)?;

    let reply = match reply {
        Some(reply) => reply,
        None => return Ok(None),
    };

    for stream in reply.keys {
        let mut requests = Vec::new();
        let mut entry_id = String::from(last_entry_id);
        for entry in stream.ids {
            entry_id = entry.id;
            match from_redis(&stream.key, &entry_id, &entry.map) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    if let Some(e) = conversion_error_handler(e) {
                        return Err(DispatchRequestsError::ConversionError(e));
                    }
                    continue;
                }
            };
        }
        return Ok(Some((entry_id, requests)));
    }
    Ok(None)
}

/// Converts the fields of one stream entry into a [`Request`].
///
/// The mode name is passed on as is; whether it names a known observing mode
/// is up to the controller.
pub fn from_redis(
    stream_key: &str,
    entry_id: &str,
    fields: &HashMap<String, Value>,
) -> Result<Request, ConversionError> {
    let event = get_as_string(stream_key, entry_id, fields, "event")?;
    let mode = get_as_string(stream_key, entry_id, fields, "mode")?;

    match event.as_str() {
        SET_OBS_TYPE => Ok(Request::SetObsType { mode }),
        PREPARE_OBSERVATION => {
            let obs_instructions =
                get_as_string(stream_key, entry_id, fields, "obs_instructions")?;
            Ok(Request::PrepareObservation {
                mode,
                obs_instructions,
            })
        }
        unknown => Err(ConversionError::new(
            stream_key,
            entry_id,
            format!("Unknown event '{}'", unknown),
        )),
    }
}

fn get_as_string(
    stream_key: &str,
    entry_id: &str,
    fields: &HashMap<String, Value>,
    field: &str,
) -> Result<String, ConversionError> {
    let value = match fields.get(field) {
        Some(value) => value,
        None => {
            return Err(ConversionError::new(
                stream_key,
                entry_id,
                format!("Field '{}' is missing", field),
            ))
        }
    };
    let value = match String::from_redis_value(value) {
        Err(e) => return Err(ConversionError::from_redis_error(stream_key, entry_id, e)),
        Ok(value) => value,
    };
    Ok(value)
}

/// Field/value pairs of an `update_status` event.
pub fn status_fields(
    instrument_id: &str,
    status: &PortStatusMap,
) -> Result<Vec<(&'static str, String)>> {
    let payload = serde_json::to_string(status).context("Failed to encode port status")?;
    Ok(vec![
        ("event", UPDATE_STATUS.to_string()),
        ("instrument", instrument_id.to_string()),
        ("payload", payload),
    ])
}

/// Field/value pairs of a `spectrograph_changed_ports` event.
pub fn changed_ports_fields(
    instrument_id: &str,
    obs_instructions: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("event", SPECTROGRAPH_CHANGED_PORTS.to_string()),
        ("instrument", instrument_id.to_string()),
        ("payload", obs_instructions.to_string()),
    ]
}

/// Publishes controller events to a redis stream.
pub struct RedisEventSink {
    redis: Connection,
    stream_key: String,
    instrument_id: String,
}

impl RedisEventSink {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        redis: Connection,
        stream_key: S1,
        instrument_id: S2,
    ) -> Self {
        Self {
            redis,
            stream_key: stream_key.into(),
            instrument_id: instrument_id.into(),
        }
    }

    fn publish(&mut self, fields: &[(&'static str, String)]) -> Result<()> {
        let entry_id: String = self
            .redis
            .xadd(&self.stream_key, "*", fields)
            .with_context(|| format!("Failed to publish to stream '{}'", self.stream_key))?;
        debug!("Published {} to stream '{}'", entry_id, self.stream_key);
        Ok(())
    }
}

impl EventSink for RedisEventSink {
    fn update_status(&mut self, instrument_id: &str, status: &PortStatusMap) -> Result<()> {
        let fields = status_fields(instrument_id, status)?;
        self.publish(&fields)
    }

    fn changed_ports(&mut self, obs_instructions: &str) -> Result<()> {
        let fields = changed_ports_fields(&self.instrument_id, obs_instructions);
        self.publish(&fields)
    }
}
