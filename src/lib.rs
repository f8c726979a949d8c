//! Light path control of a Shelyak spectrograph.
//!
//! The mirror, the LED and the two calibration lamps (ThAr and tungsten) are
//! powered through a Velleman K8056 relay card. [`spectrograph_ctl`] turns
//! named observing modes into relay commands, [`k8056`] speaks the card's
//! serial protocol and [`redis_gateway`] connects the controller to the
//! other instruments.

pub mod config;
pub mod k8056;
pub mod k8056_types;
pub mod redis_gateway;
pub mod spectrograph_ctl;
pub mod spectrograph_types;
