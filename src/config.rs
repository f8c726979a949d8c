use crate::k8056_types::DriverConfig;

use clap::ArgAction;
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_DEVICE: &str = "/dev/cu.usbserial-AK068Y10";

/// Switches the spectrograph light path through a K8056 relay card on
/// requests read from a redis stream.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Serial device of the relay card
    #[arg(long, default_value = DEFAULT_DEVICE)]
    pub device: String,

    /// How often every frame is sent again after the first transmission
    #[arg(long, default_value_t = 0)]
    pub repeat: u32,

    /// Seconds to wait after every transmission
    #[arg(long, value_name = "SECONDS", default_value = "0", value_parser = parse_seconds)]
    pub wait: Duration,

    /// Run without a relay card attached; any case of "true" enables it
    #[arg(
        long,
        env = "SHELYAK_SIMULATE",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_toggle
    )]
    pub simulate: bool,

    #[arg(long, default_value = "redis://127.0.0.1/")]
    pub redis_url: String,

    /// Stream the set_obs_type and prepare_observation requests are read from
    #[arg(long, default_value = "spectrograph:requests")]
    pub request_stream: String,

    /// Stream update_status and spectrograph_changed_ports events are added to
    #[arg(long, default_value = "spectrograph:events")]
    pub event_stream: String,

    #[arg(long, default_value = "spectrograph")]
    pub instrument_id: String,

    /// Milliseconds a stream read blocks before it is retried
    #[arg(long, default_value_t = 5000)]
    pub block_ms: usize,

    /// Increase log verbosity (-v, -vv, ...)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig::new(self.repeat, self.wait)
    }

    pub fn last_entry_id_key(&self) -> String {
        format!("{}:last_id", self.request_stream)
    }
}

fn parse_toggle(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds = value
        .parse::<f64>()
        .map_err(|e| format!("'{}' is not a number: {}", value, e))?;
    match seconds.is_finite() && seconds >= 0.0 {
        true => Ok(Duration::from_secs_f64(seconds)),
        false => Err(format!("'{}' must be a non-negative number of seconds", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["k8056-spectrograph"]).unwrap();
        assert_eq!(args.device, DEFAULT_DEVICE);
        assert_eq!(args.driver_config(), DriverConfig::default());
        assert_eq!(args.last_entry_id_key(), "spectrograph:requests:last_id");
        assert_eq!(args.instrument_id, "spectrograph");
    }

    #[test]
    fn test_driver_config() {
        let args =
            Args::try_parse_from(["k8056-spectrograph", "--repeat", "2", "--wait", "0.25"])
                .unwrap();
        assert_eq!(
            args.driver_config(),
            DriverConfig::new(2, Duration::from_millis(250))
        );
    }

    #[test]
    fn test_negative_wait_is_rejected() {
        assert!(Args::try_parse_from(["k8056-spectrograph", "--wait", "-1"]).is_err());
        assert!(Args::try_parse_from(["k8056-spectrograph", "--wait", "soon"]).is_err());
    }

    #[test]
    fn test_simulate_env_toggle() {
        for (value, simulate) in [
            ("true", true),
            ("True", true),
            ("TRUE", true),
            ("false", false),
            ("no", false),
            ("1", false),
        ] {
            std::env::set_var("SHELYAK_SIMULATE", value);
            let args = Args::try_parse_from(["k8056-spectrograph"]).unwrap();
            assert_eq!(args.simulate, simulate, "SHELYAK_SIMULATE={}", value);
        }
        std::env::remove_var("SHELYAK_SIMULATE");
        let args = Args::try_parse_from(["k8056-spectrograph"]).unwrap();
        assert!(!args.simulate);
    }

    #[test]
    fn test_simulate_flag() {
        let args = Args::try_parse_from(["k8056-spectrograph", "--simulate", "-vv"]).unwrap();
        assert!(args.simulate);
        assert_eq!(args.verbose, 2);
    }
}
