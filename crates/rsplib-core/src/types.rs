//! Core types used throughout rsplib.
//!
//! These types provide a model-agnostic view of the SDRplay receiver family:
//! device descriptors produced by enumeration, the lifecycle state, the
//! parameter block associated with an open device, and the payloads of
//! asynchronous hardware events.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Lifecycle state of a device-control instance.
///
/// States are ordered: each state implies every state before it has been
/// passed through (a streaming device is also selected and opened).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceState {
    /// No session with the hardware API.
    Closed,
    /// Session established, no device bound.
    Opened,
    /// A device is claimed and its parameters may be changed.
    DeviceSelected,
    /// Stream buffers are prepared; no samples are delivered yet.
    StreamingInitialized,
    /// Sample blocks are being delivered to the stream handler.
    Streaming,
}

impl DeviceState {
    /// Whether a device handle exists in this state.
    pub fn has_device(&self) -> bool {
        *self >= DeviceState::DeviceSelected
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Closed => "Closed",
            DeviceState::Opened => "Opened",
            DeviceState::DeviceSelected => "DeviceSelected",
            DeviceState::StreamingInitialized => "StreamingInitialized",
            DeviceState::Streaming => "Streaming",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// SDRplay receiver model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// Original RSP1.
    Rsp1,
    /// RSP1A.
    Rsp1A,
    /// RSP1B (RSP1A electronics in a metal enclosure).
    Rsp1B,
    /// RSP2 / RSP2pro.
    Rsp2,
    /// Dual-tuner RSPduo.
    RspDuo,
    /// RSPdx.
    RspDx,
    /// RSPdx-R2.
    RspDxR2,
}

impl Model {
    /// Hardware version identifier reported by enumeration.
    pub fn hw_version(&self) -> u8 {
        match self {
            Model::Rsp1 => 1,
            Model::Rsp2 => 2,
            Model::RspDuo => 3,
            Model::RspDx => 4,
            Model::Rsp1B => 6,
            Model::RspDxR2 => 7,
            Model::Rsp1A => 255,
        }
    }

    /// Map a hardware version identifier back to a model.
    pub fn from_hw_version(hw_ver: u8) -> Option<Model> {
        match hw_ver {
            1 => Some(Model::Rsp1),
            2 => Some(Model::Rsp2),
            3 => Some(Model::RspDuo),
            4 => Some(Model::RspDx),
            6 => Some(Model::Rsp1B),
            7 => Some(Model::RspDxR2),
            255 => Some(Model::Rsp1A),
            _ => None,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Model::Rsp1 => "RSP1",
            Model::Rsp1A => "RSP1A",
            Model::Rsp1B => "RSP1B",
            Model::Rsp2 => "RSP2",
            Model::RspDuo => "RSPduo",
            Model::RspDx => "RSPdx",
            Model::RspDxR2 => "RSPdxR2",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`Model`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseModelError(String);

impl fmt::Display for ParseModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown model: {}", self.0)
    }
}

impl std::error::Error for ParseModelError {}

impl FromStr for Model {
    type Err = ParseModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "").as_str() {
            "RSP1" => Ok(Model::Rsp1),
            "RSP1A" => Ok(Model::Rsp1A),
            "RSP1B" => Ok(Model::Rsp1B),
            "RSP2" | "RSP2PRO" => Ok(Model::Rsp2),
            "RSPDUO" => Ok(Model::RspDuo),
            "RSPDX" => Ok(Model::RspDx),
            "RSPDXR2" => Ok(Model::RspDxR2),
            _ => Err(ParseModelError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceInfo / DeviceHandle
// ---------------------------------------------------------------------------

/// Descriptor of a discoverable device.
///
/// Produced by enumeration and consumed read-only by selection. The serial
/// number is the identity; model and hardware version are display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Device serial number.
    pub serial: String,
    /// Receiver model.
    pub model: Model,
    /// Raw hardware version byte as reported by the hardware API.
    pub hw_version: u8,
}

impl DeviceInfo {
    /// Create a descriptor whose hardware version matches its model.
    pub fn new(serial: &str, model: Model) -> Self {
        DeviceInfo {
            serial: serial.to_string(),
            model,
            hw_version: model.hw_version(),
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model, self.serial)
    }
}

/// Opaque reference to a device claimed through the hardware API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    /// Wrap a raw handle value issued by the hardware API.
    pub fn from_raw(raw: u64) -> Self {
        DeviceHandle(raw)
    }

    /// Return the raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Device parameters
// ---------------------------------------------------------------------------

/// Antenna port on RSPdx-family receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Antenna {
    /// Port A (SMA, bias-tee capable).
    A,
    /// Port B (SMA).
    B,
    /// Port C (BNC, HF).
    C,
}

impl fmt::Display for Antenna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Antenna::A => write!(f, "Antenna A"),
            Antenna::B => write!(f, "Antenna B"),
            Antenna::C => write!(f, "Antenna C"),
        }
    }
}

/// Model-specific fields of the parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantParams {
    /// RSP1A / RSP1B have no extra front-end fields beyond the common block.
    Rsp1a,
    /// RSPdx / RSPdx-R2 front-end fields.
    RspDx {
        /// High-dynamic-range mode.
        hdr_enable: bool,
        /// Bias-tee power on antenna port A.
        bias_t_enable: bool,
        /// Selected antenna port.
        antenna: Antenna,
    },
    /// Models with only the common controls.
    Basic,
}

impl VariantParams {
    /// Default variant fields for a model.
    pub fn for_model(model: Model) -> Self {
        match model {
            Model::Rsp1A | Model::Rsp1B => VariantParams::Rsp1a,
            Model::RspDx | Model::RspDxR2 => VariantParams::RspDx {
                hdr_enable: false,
                bias_t_enable: false,
                antenna: Antenna::A,
            },
            _ => VariantParams::Basic,
        }
    }
}

/// Mutable parameter block associated with an open device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceParams {
    /// Tuner centre frequency in hertz.
    pub frequency_hz: f64,
    /// ADC sample rate in hertz.
    pub sample_rate_hz: f64,
    /// IF gain reduction in dB.
    pub gain_reduction_db: u8,
    /// Selected LNA state (index into the model's LNA gain ladder).
    pub lna_state: u8,
    /// Whether the hardware AGC loop is enabled.
    pub agc_enabled: bool,
    /// Model-specific fields.
    pub variant: VariantParams,
}

impl DeviceParams {
    /// Factory defaults for a freshly selected device.
    pub fn defaults_for(model: Model) -> Self {
        DeviceParams {
            frequency_hz: 100_000_000.0,
            sample_rate_hz: 2_000_000.0,
            gain_reduction_db: 40,
            lna_state: 0,
            agc_enabled: false,
            variant: VariantParams::for_model(model),
        }
    }
}

/// Identifies which field of [`DeviceParams`] a hardware update applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamUpdate {
    /// Tuner frequency.
    Frequency,
    /// Sample rate.
    SampleRate,
    /// Gain reduction and LNA state.
    Gain,
    /// AGC enable.
    Agc,
    /// RSPdx HDR mode.
    HdrMode,
    /// RSPdx bias-tee.
    BiasT,
    /// RSPdx antenna port.
    Antenna,
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// A block of received I/Q samples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleBlock {
    /// In-phase samples.
    pub xi: Vec<i16>,
    /// Quadrature samples.
    pub xq: Vec<i16>,
    /// Sample number of the first sample in this block.
    pub first_sample_num: u32,
    /// Set when the hardware reset its sample counter (after a re-tune or
    /// sample-rate change).
    pub reset: bool,
}

impl SampleBlock {
    /// Create a block from paired I/Q vectors.
    pub fn new(xi: Vec<i16>, xq: Vec<i16>, first_sample_num: u32) -> Self {
        SampleBlock {
            xi,
            xq,
            first_sample_num,
            reset: false,
        }
    }

    /// Number of complex samples in the block.
    pub fn num_samples(&self) -> usize {
        self.xi.len().min(self.xq.len())
    }

    /// Whether the block carries no samples.
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Mean power of the block (`i^2 + q^2`), or `0.0` for an empty block.
    pub fn mean_power(&self) -> f32 {
        let n = self.num_samples();
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .xi
            .iter()
            .zip(&self.xq)
            .map(|(&i, &q)| (i as f64).powi(2) + (q as f64).powi(2))
            .sum();
        (sum / n as f64) as f32
    }
}

/// Effective gain reported by the hardware after an AGC or user change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainUpdate {
    /// IF gain reduction in dB.
    pub gain_reduction_db: u32,
    /// Gain reduction contributed by the LNA state, in dB.
    pub lna_gain_reduction_db: u32,
    /// Overall system gain in dB.
    pub current_gain_db: f64,
}

/// Front-end overload notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerOverload {
    /// The input level exceeded the safe range.
    Detected,
    /// The input level returned to the safe range.
    Corrected,
}

impl PowerOverload {
    /// Whether this event marks the onset of an overload.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, PowerOverload::Detected)
    }
}

impl fmt::Display for PowerOverload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerOverload::Detected => write!(f, "overload detected"),
            PowerOverload::Corrected => write!(f, "overload corrected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
