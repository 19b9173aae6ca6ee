//! DeviceControlBuilder -- fluent builder for constructing [`DeviceControl`]
//! instances.
//!
//! Separates configuration from construction so that callers can set tuning
//! defaults, the minimum acceptable hardware API version and event delivery
//! options before any session with the hardware API is opened.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rsplib_control::DeviceControlBuilder;
//! use rsplib_test_harness::MockApi;
//!
//! # fn example() -> rsplib_core::Result<()> {
//! let control = DeviceControlBuilder::new(Arc::new(MockApi::new()))
//!     .frequency(14_074_000.0)
//!     .sample_rate(2_000_000.0)
//!     .min_api_version(3.07)
//!     .build()?;
//! control.open()?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::sync::Arc;

use rsplib_core::api::HardwareApi;
use rsplib_core::error::{Error, Result};
use rsplib_core::helpers::{format_freq_mhz, format_sample_rate};

use crate::control::DeviceControl;
use crate::models::{MAX_FREQUENCY_HZ, MAX_SAMPLE_RATE_HZ, MIN_FREQUENCY_HZ, MIN_SAMPLE_RATE_HZ};

/// Default capacity of the [`DeviceEvent`](rsplib_core::DeviceEvent)
/// broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Settings fixed at construction time.
#[derive(Debug, Clone)]
pub(crate) struct ControlConfig {
    pub min_api_version: Option<f32>,
    pub frequency_hz: Option<f64>,
    pub sample_rate_hz: Option<f64>,
    pub auto_acknowledge_overload: bool,
    pub event_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            min_api_version: None,
            frequency_hz: None,
            sample_rate_hz: None,
            auto_acknowledge_overload: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Fluent builder for [`DeviceControl`].
///
/// Every setting is optional. Without a frequency or sample rate the
/// device keeps whatever the hardware API reports after selection.
pub struct DeviceControlBuilder {
    api: Arc<dyn HardwareApi>,
    config: ControlConfig,
}

impl DeviceControlBuilder {
    /// Create a builder over a hardware API implementation.
    pub fn new(api: Arc<dyn HardwareApi>) -> Self {
        DeviceControlBuilder {
            api,
            config: ControlConfig::default(),
        }
    }

    /// Refuse to open sessions with a hardware API older than `version`.
    pub fn min_api_version(mut self, version: f32) -> Self {
        self.config.min_api_version = Some(version);
        self
    }

    /// Tuner frequency applied right after a device is selected.
    pub fn frequency(mut self, freq_hz: f64) -> Self {
        self.config.frequency_hz = Some(freq_hz);
        self
    }

    /// Sample rate applied right after a device is selected.
    pub fn sample_rate(mut self, rate_hz: f64) -> Self {
        self.config.sample_rate_hz = Some(rate_hz);
        self
    }

    /// Acknowledge power-overload notifications to the hardware once the
    /// overload handler has run (default: enabled).
    pub fn auto_acknowledge_overload(mut self, enabled: bool) -> Self {
        self.config.auto_acknowledge_overload = enabled;
        self
    }

    /// Capacity of the device event broadcast channel (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Validate the configuration and build a closed [`DeviceControl`].
    pub fn build(self) -> Result<DeviceControl> {
        let config = self.config;
        if config.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be greater than zero".into(),
            ));
        }
        if let Some(freq) = config.frequency_hz {
            if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&freq) {
                return Err(Error::InvalidParameter(format!(
                    "default frequency {} is out of range",
                    format_freq_mhz(freq)
                )));
            }
        }
        if let Some(rate) = config.sample_rate_hz {
            if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&rate) {
                return Err(Error::InvalidParameter(format!(
                    "default sample rate {} is out of range",
                    format_sample_rate(rate)
                )));
            }
        }
        if let Some(version) = config.min_api_version {
            if !version.is_finite() || version <= 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "invalid minimum API version {version}"
                )));
            }
        }
        Ok(DeviceControl::with_config(self.api, config))
    }
}
