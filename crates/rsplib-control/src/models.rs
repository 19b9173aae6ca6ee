//! SDRplay model definitions.
//!
//! Each supported receiver is described by an [`RspModel`] that captures its
//! tuning ranges, gain-reduction limits, LNA gain ladder and which
//! variant-specific controls it carries.
//!
//! Models are defined as factory functions (e.g. [`rsp1a()`]) that return a
//! fully populated [`RspModel`]:
//!
//! | Model   | Family   | LNA states (by band)        | HDR | Bias-T | Antennas |
//! |---------|----------|-----------------------------|-----|--------|----------|
//! | RSP1    | Basic    | 4                           | No  | No     | 1        |
//! | RSP1A   | RSP1A    | 7 / 10 / 10 / 9             | No  | Yes    | 1        |
//! | RSP1B   | RSP1A    | 7 / 10 / 10 / 9             | No  | Yes    | 1        |
//! | RSP2    | Basic    | 9 / 6 / 6                   | No  | Yes    | 3        |
//! | RSPduo  | Basic    | 7 / 10 / 10 / 9             | No  | Yes    | 2        |
//! | RSPdx   | RSPdx    | 19 / 20 / 27 / 28 / 21 / 19 | Yes | Yes    | 3        |
//! | RSPdxR2 | RSPdx    | 19 / 20 / 27 / 28 / 21 / 19 | Yes | Yes    | 3        |
//!
//! The HDR, Bias-T and antenna columns describe the hardware. Only the
//! RSPdx family exposes them as controls (see
//! [`RspDxR2`](crate::variants::RspDxR2)); on other models they are
//! informational.

use std::fmt;

use rsplib_core::Model;

/// Lowest tuner frequency across the family, in hertz.
pub const MIN_FREQUENCY_HZ: f64 = 1_000.0;

/// Highest tuner frequency across the family, in hertz.
pub const MAX_FREQUENCY_HZ: f64 = 2_000_000_000.0;

/// Lowest ADC sample rate accepted by the API, in hertz.
pub const MIN_SAMPLE_RATE_HZ: f64 = 2_000_000.0;

/// Highest ADC sample rate accepted by the API, in hertz.
pub const MAX_SAMPLE_RATE_HZ: f64 = 10_660_000.0;

/// Documented IF gain-reduction range, in dB.
pub const MIN_GAIN_REDUCTION_DB: u8 = 20;

/// Documented IF gain-reduction range, in dB.
pub const MAX_GAIN_REDUCTION_DB: u8 = 59;

/// Which variant controller a model is exposed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// RSP1A-style gain reduction and LNA state controls.
    Rsp1a,
    /// RSPdx-style HDR, bias-tee and antenna controls.
    RspDx,
    /// Common controls only.
    Basic,
}

impl Family {
    /// Human-readable family name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Rsp1a => "RSP1A family",
            Family::RspDx => "RSPdx family",
            Family::Basic => "basic receiver",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Number of LNA states available up to (and excluding) a band edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LnaBand {
    /// Upper edge of the band in hertz (exclusive).
    pub upper_hz: f64,
    /// Number of selectable LNA states in this band.
    pub states: u8,
}

const fn band(upper_hz: f64, states: u8) -> LnaBand {
    LnaBand { upper_hz, states }
}

const RSP1_LNA: &[LnaBand] = &[band(f64::INFINITY, 4)];

const RSP1A_LNA: &[LnaBand] = &[
    band(60_000_000.0, 7),
    band(420_000_000.0, 10),
    band(1_000_000_000.0, 10),
    band(f64::INFINITY, 9),
];

const RSP2_LNA: &[LnaBand] = &[
    band(420_000_000.0, 9),
    band(1_000_000_000.0, 6),
    band(f64::INFINITY, 6),
];

const RSPDX_LNA: &[LnaBand] = &[
    band(12_000_000.0, 19),
    band(60_000_000.0, 20),
    band(250_000_000.0, 27),
    band(420_000_000.0, 28),
    band(1_000_000_000.0, 21),
    band(f64::INFINITY, 19),
];

/// Static model definition for an SDRplay receiver.
#[derive(Debug, Clone)]
pub struct RspModel {
    /// Human-readable model name (e.g. "RSP1A").
    pub name: &'static str,
    /// Model tag reported by enumeration.
    pub model: Model,
    /// Variant controller family.
    pub family: Family,
    /// LNA gain ladder by frequency band, ascending.
    pub lna_bands: &'static [LnaBand],
    /// Whether the model has high-dynamic-range mode.
    pub has_hdr: bool,
    /// Whether the hardware can inject bias-tee power. Controllable only on
    /// the RSPdx family.
    pub has_bias_t: bool,
    /// Number of antenna ports.
    pub antenna_ports: u8,
}

impl RspModel {
    /// Number of LNA states available at a tuner frequency.
    pub fn lna_states_at(&self, freq_hz: f64) -> u8 {
        self.lna_bands
            .iter()
            .find(|b| freq_hz < b.upper_hz)
            .or(self.lna_bands.last())
            .map(|b| b.states)
            .unwrap_or(1)
    }

    /// Whether a frequency is inside the tunable range.
    pub fn frequency_in_range(&self, freq_hz: f64) -> bool {
        (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&freq_hz)
    }

    /// Whether a sample rate is inside the supported range.
    pub fn sample_rate_in_range(&self, rate_hz: f64) -> bool {
        (MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&rate_hz)
    }

    /// Clamp a requested gain reduction into the documented range.
    pub fn clamp_gain_reduction(&self, db: i32) -> u8 {
        db.clamp(MIN_GAIN_REDUCTION_DB as i32, MAX_GAIN_REDUCTION_DB as i32) as u8
    }
}

/// RSP1 model definition.
pub fn rsp1() -> RspModel {
    RspModel {
        name: "RSP1",
        model: Model::Rsp1,
        family: Family::Basic,
        lna_bands: RSP1_LNA,
        has_hdr: false,
        has_bias_t: false,
        antenna_ports: 1,
    }
}

/// RSP1A model definition.
///
/// 14-bit ADC, 1 kHz to 2 GHz, single SMA antenna port.
pub fn rsp1a() -> RspModel {
    RspModel {
        name: "RSP1A",
        model: Model::Rsp1A,
        family: Family::Rsp1a,
        lna_bands: RSP1A_LNA,
        has_hdr: false,
        has_bias_t: true,
        antenna_ports: 1,
    }
}

/// RSP1B model definition. Same front end as the RSP1A.
pub fn rsp1b() -> RspModel {
    RspModel {
        name: "RSP1B",
        model: Model::Rsp1B,
        ..rsp1a()
    }
}

/// RSP2 model definition.
pub fn rsp2() -> RspModel {
    RspModel {
        name: "RSP2",
        model: Model::Rsp2,
        family: Family::Basic,
        lna_bands: RSP2_LNA,
        has_hdr: false,
        has_bias_t: true,
        antenna_ports: 3,
    }
}

/// RSPduo model definition (dual tuner, controlled here as a single tuner).
pub fn rspduo() -> RspModel {
    RspModel {
        name: "RSPduo",
        model: Model::RspDuo,
        family: Family::Basic,
        lna_bands: RSP1A_LNA,
        has_hdr: false,
        has_bias_t: true,
        antenna_ports: 2,
    }
}

/// RSPdx model definition.
pub fn rspdx() -> RspModel {
    RspModel {
        name: "RSPdx",
        model: Model::RspDx,
        family: Family::RspDx,
        lna_bands: RSPDX_LNA,
        has_hdr: true,
        has_bias_t: true,
        antenna_ports: 3,
    }
}

/// RSPdx-R2 model definition.
///
/// Three antenna ports (A and B on SMA, C on BNC), HDR mode for the
/// LF/MF/HF bands below 2 MHz, bias-tee on port A.
pub fn rspdx_r2() -> RspModel {
    RspModel {
        name: "RSPdxR2",
        model: Model::RspDxR2,
        ..rspdx()
    }
}

/// All supported models.
pub fn all_models() -> Vec<RspModel> {
    vec![
        rsp1(),
        rsp1a(),
        rsp1b(),
        rsp2(),
        rspduo(),
        rspdx(),
        rspdx_r2(),
    ]
}

/// Look up the definition for a model tag.
pub fn model_for(model: Model) -> RspModel {
    match model {
        Model::Rsp1 => rsp1(),
        Model::Rsp1A => rsp1a(),
        Model::Rsp1B => rsp1b(),
        Model::Rsp2 => rsp2(),
        Model::RspDuo => rspduo(),
        Model::RspDx => rspdx(),
        Model::RspDxR2 => rspdx_r2(),
    }
}
