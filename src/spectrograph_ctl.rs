use crate::k8056::K8056Error;
use crate::k8056::RelayDriver;
use crate::k8056_types::CardAddress;
use crate::k8056_types::DEFAULT_ADDRESS;
use crate::spectrograph_types::ObservingMode;
use crate::spectrograph_types::PortStatusMap;
use crate::spectrograph_types::UnknownModeError;

use log::error;
use log::info;
use log::warn;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use thiserror::Error;

pub const INSTRUMENT_NAME: &str = "spectrograph";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Unknown observing mode '{0}'")]
    UnknownMode(String),

    #[error("Failed to apply observing mode '{mode}': {source}")]
    Driver {
        mode: ObservingMode,
        #[source]
        source: K8056Error,
    },

    #[error(transparent)]
    Publish(#[from] anyhow::Error),
}

impl From<UnknownModeError> for ControlError {
    fn from(e: UnknownModeError) -> Self {
        ControlError::UnknownMode(e.0)
    }
}

/// Inbound requests of the event gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    SetObsType {
        mode: String,
    },
    PrepareObservation {
        mode: String,
        obs_instructions: String,
    },
}

impl Request {
    pub fn mode(&self) -> &str {
        match self {
            Request::SetObsType { mode } => mode,
            Request::PrepareObservation { mode, .. } => mode,
        }
    }
}

/// Outbound notifications of the event gateway.
pub trait EventSink {
    /// Publishes the port status after a mode was applied.
    fn update_status(&mut self, instrument_id: &str, status: &PortStatusMap)
        -> anyhow::Result<()>;

    /// Forwards the observation plan once the ports are configured.
    fn changed_ports(&mut self, obs_instructions: &str) -> anyhow::Result<()>;
}

/// Read access to the port status, usable from other threads while the
/// controller is applying a mode.
#[derive(Clone, Debug)]
pub struct StatusReader(Arc<RwLock<PortStatusMap>>);

impl StatusReader {
    pub fn get(&self) -> PortStatusMap {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SpectrographControl<D: RelayDriver, S: EventSink> {
    driver: D,
    sink: S,
    instrument_id: String,
    address: CardAddress,
    status: Arc<RwLock<PortStatusMap>>,
}

impl<D: RelayDriver, S: EventSink> SpectrographControl<D, S> {
    pub fn new<I: Into<String>>(driver: D, sink: S, instrument_id: I) -> Self {
        Self::with_address(driver, sink, instrument_id, DEFAULT_ADDRESS)
    }

    /// Controller for a card that was configured to a non default address.
    pub fn with_address<I: Into<String>>(
        driver: D,
        sink: S,
        instrument_id: I,
        address: CardAddress,
    ) -> Self {
        Self {
            driver,
            sink,
            instrument_id: instrument_id.into(),
            address,
            status: Arc::new(RwLock::new(PortStatusMap::default())),
        }
    }

    pub fn instrument_name(&self) -> &'static str {
        INSTRUMENT_NAME
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn is_simulated(&self) -> bool {
        self.driver.is_simulated()
    }

    pub fn current_status(&self) -> PortStatusMap {
        self.status_reader().get()
    }

    pub fn status_reader(&self) -> StatusReader {
        StatusReader(self.status.clone())
    }

    pub fn handle(&mut self, request: Request) -> Result<PortStatusMap, ControlError> {
        match request {
            Request::SetObsType { mode } => self.apply_mode(&mode),
            Request::PrepareObservation {
                mode,
                obs_instructions,
            } => self.prepare_observation(&mode, &obs_instructions),
        }
    }

    pub fn apply_mode(&mut self, mode: &str) -> Result<PortStatusMap, ControlError> {
        let mode = mode.parse::<ObservingMode>()?;
        self.apply(mode)
    }

    /// Drives every port to the status `mode` requires, in [`Port::ALL`]
    /// order, whatever the current status is.
    ///
    /// If the card fails mid-way the stored status keeps the ports that were
    /// switched before the failure; that status is published and the error
    /// is returned.
    ///
    /// If only publishing fails the relays are switched and the new status is
    /// stored; `ControlError::Publish` is returned.
    ///
    /// [`Port::ALL`]: crate::spectrograph_types::Port::ALL
    pub fn apply(&mut self, mode: ObservingMode) -> Result<PortStatusMap, ControlError> {
        info!("Applying observing mode '{}'", mode);

        let target = mode.ports();
        let mut applied = self.current_status();

        for (port, status) in target.iter() {
            let result = match status.is_on() {
                true => self.driver.set_relay(port.relay(), self.address),
                false => self.driver.clear_relay(port.relay(), self.address),
            };

            if let Err(source) = result {
                self.store(applied);
                if let Err(e) = self.sink.update_status(&self.instrument_id, &applied) {
                    warn!("Failed to publish partial status: {:#}", e);
                }
                return Err(ControlError::Driver { mode, source });
            }

            applied.set(port, status);
        }

        self.store(target);
        self.sink.update_status(&self.instrument_id, &target)?;
        Ok(target)
    }

    pub fn prepare_observation(
        &mut self,
        mode: &str,
        obs_instructions: &str,
    ) -> Result<PortStatusMap, ControlError> {
        let status = self.apply_mode(mode)?;
        self.sink.changed_ports(obs_instructions)?;
        Ok(status)
    }

    fn store(&self, status: PortStatusMap) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Applies requests one after the other until all senders are gone. A failed
/// request is logged and does not stop the worker.
pub fn run_worker<D, S>(mut control: SpectrographControl<D, S>, requests: Receiver<Request>)
where
    D: RelayDriver,
    S: EventSink,
{
    for request in requests {
        let mode = request.mode().to_string();
        match control.handle(request) {
            Ok(status) => info!("Observing mode '{}' applied: {:?}", mode, status),
            Err(e) => error!("Request for observing mode '{}' failed: {:#}", mode, e),
        }
    }
    info!("Request channel closed");
}
