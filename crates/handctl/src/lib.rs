//! Hand gesture controller.
//!
//! `handctl` turns hand landmarks observed through a webcam into keyboard and mouse input. The
//! landmarks are computed by an external program (see [`source`]), classified into a small set of
//! [gestures](gesture), mapped to [actions](action) through the user's [settings] and injected by
//! the [dispatcher](dispatch) as key and mouse button presses.
//!
//! # Coordinates
//!
//! Landmark coordinates are normalized to the camera image: X points to the right, Y points
//! *down*, both in range `0.0..=1.0`. Z is relative depth and unused by the classifier.
//!
//! # Environment Variables
//!
//! * `HANDCTL_SETTINGS`: path of the settings file used when `--settings` is not given. Defaults
//!   to `settings.json` in the working directory.
//! * `RUST_LOG`: overrides the log filter (see [env_logger]).
//!
//! [env_logger]: https://docs.rs/env_logger

use log::LevelFilter;

pub mod action;
pub mod dispatch;
pub mod gesture;
pub mod hand;
pub mod input;
pub mod pipeline;
pub mod settings;
pub mod source;
pub mod timer;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("enigo"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handctl will log at *debug*
/// level. Otherwise, they will log at *info* level.
///
/// `enigo` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
