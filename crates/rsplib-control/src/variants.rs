//! Variant views over a [`DeviceControl`].
//!
//! [`Receiver`] is resolved when a device is selected and carries only the
//! controls the selected hardware has. There is no gain-reduction setter on
//! [`RspDxR2`] and no HDR setter on [`Rsp1a`]; calling code that matches on
//! the receiver can only reach controls that exist.
//!
//! Every view derefs to [`DeviceControl`] for the common lifecycle and
//! tuning operations. Because the underlying device can be released and a
//! different one selected while a view is alive, each variant setter
//! re-checks the selected model and fails with
//! [`Error::WrongVariant`](rsplib_core::Error::WrongVariant) on mismatch.
//!
//! ```
//! use std::sync::Arc;
//! use rsplib_control::{DeviceControl, Receiver};
//! use rsplib_core::{DeviceInfo, Model};
//! use rsplib_test_harness::MockApi;
//!
//! # fn example() -> rsplib_core::Result<()> {
//! let api = MockApi::with_devices([DeviceInfo::new("1000", Model::Rsp1A)]);
//! let control = DeviceControl::new(Arc::new(api));
//! control.open()?;
//! let devices = control.get_available_devices()?;
//! match control.select_device(&devices[0])? {
//!     Receiver::Rsp1a(rx) => {
//!         rx.set_gain_reduction(40)?;
//!         rx.set_lna_state(3)?;
//!     }
//!     Receiver::RspDxR2(rx) => rx.set_hdr_mode(true)?,
//!     Receiver::Basic(_) => {}
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::ops::Deref;

use tracing::warn;

use rsplib_core::error::{Error, Result};
use rsplib_core::types::{Antenna, Model, ParamUpdate, VariantParams};

use crate::control::DeviceControl;
use crate::models::{Family, model_for};

/// Variant view for the selected device.
#[derive(Debug, Clone, Copy)]
pub enum Receiver<'a> {
    /// RSP1A or RSP1B.
    Rsp1a(Rsp1a<'a>),
    /// RSPdx or RSPdx-R2.
    RspDxR2(RspDxR2<'a>),
    /// Any other model: common controls only.
    Basic(BasicReceiver<'a>),
}

impl<'a> Receiver<'a> {
    pub(crate) fn new(control: &'a DeviceControl, model: Model) -> Self {
        match model_for(model).family {
            Family::Rsp1a => Receiver::Rsp1a(Rsp1a { control, model }),
            Family::RspDx => Receiver::RspDxR2(RspDxR2 { control, model }),
            Family::Basic => Receiver::Basic(BasicReceiver { control, model }),
        }
    }

    /// Model the view was resolved for.
    pub fn model(&self) -> Model {
        match self {
            Receiver::Rsp1a(rx) => rx.model,
            Receiver::RspDxR2(rx) => rx.model,
            Receiver::Basic(rx) => rx.model,
        }
    }

    /// The RSP1A controls, if the selected device has them.
    pub fn as_rsp1a(&self) -> Option<&Rsp1a<'a>> {
        match self {
            Receiver::Rsp1a(rx) => Some(rx),
            _ => None,
        }
    }

    /// The RSPdx controls, if the selected device has them.
    pub fn as_rspdx(&self) -> Option<&RspDxR2<'a>> {
        match self {
            Receiver::RspDxR2(rx) => Some(rx),
            _ => None,
        }
    }

    /// Convert into the RSP1A view, or hand the receiver back.
    pub fn into_rsp1a(self) -> std::result::Result<Rsp1a<'a>, Self> {
        match self {
            Receiver::Rsp1a(rx) => Ok(rx),
            other => Err(other),
        }
    }

    /// Convert into the RSPdx view, or hand the receiver back.
    pub fn into_rspdx(self) -> std::result::Result<RspDxR2<'a>, Self> {
        match self {
            Receiver::RspDxR2(rx) => Ok(rx),
            other => Err(other),
        }
    }
}

impl Deref for Receiver<'_> {
    type Target = DeviceControl;

    fn deref(&self) -> &DeviceControl {
        match self {
            Receiver::Rsp1a(rx) => rx.control,
            Receiver::RspDxR2(rx) => rx.control,
            Receiver::Basic(rx) => rx.control,
        }
    }
}

// ---------------------------------------------------------------------------
// RSP1A
// ---------------------------------------------------------------------------

/// Gain controls of the RSP1A and RSP1B.
///
/// ```
/// use rsplib_control::Rsp1a;
///
/// fn attenuate(rx: &Rsp1a<'_>) -> rsplib_core::Result<u8> {
///     rx.set_gain_reduction(40)
/// }
/// ```
///
/// HDR mode belongs to the RSPdx family and does not exist here:
///
/// ```compile_fail
/// use rsplib_control::Rsp1a;
///
/// fn enable_hdr(rx: &Rsp1a<'_>) -> rsplib_core::Result<()> {
///     rx.set_hdr_mode(true)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Rsp1a<'a> {
    control: &'a DeviceControl,
    model: Model,
}

impl Rsp1a<'_> {
    /// Set IF gain reduction in dB.
    ///
    /// Values outside the documented range are clamped rather than
    /// rejected. Returns the value actually applied.
    pub fn set_gain_reduction(&self, db: i32) -> Result<u8> {
        let mut applied = 0;
        self.control.update_params(
            "set_gain_reduction",
            Some(Family::Rsp1a),
            ParamUpdate::Gain,
            |params, model| {
                applied = model.clamp_gain_reduction(db);
                if i32::from(applied) != db {
                    warn!(requested = db, applied, "gain reduction clamped");
                }
                params.gain_reduction_db = applied;
                Ok(())
            },
        )?;
        Ok(applied)
    }

    /// Current IF gain reduction in dB.
    pub fn gain_reduction(&self) -> Result<u8> {
        self.control
            .read_params("gain_reduction", Some(Family::Rsp1a), |params, _| {
                params.gain_reduction_db
            })
    }

    /// Select an LNA state.
    ///
    /// The number of states depends on the tuned band; an index at or past
    /// [`lna_state_count`](Self::lna_state_count) is rejected.
    pub fn set_lna_state(&self, state: u8) -> Result<()> {
        self.control.update_params(
            "set_lna_state",
            Some(Family::Rsp1a),
            ParamUpdate::Gain,
            |params, model| {
                let count = model.lna_states_at(params.frequency_hz);
                if state >= count {
                    return Err(Error::InvalidParameter(format!(
                        "LNA state {state} out of range (0..{count} at this frequency)"
                    )));
                }
                params.lna_state = state;
                Ok(())
            },
        )
    }

    /// Current LNA state.
    pub fn lna_state(&self) -> Result<u8> {
        self.control
            .read_params("lna_state", Some(Family::Rsp1a), |params, _| {
                params.lna_state
            })
    }

    /// Number of LNA states available at the current frequency.
    pub fn lna_state_count(&self) -> Result<u8> {
        self.control
            .read_params("lna_state_count", Some(Family::Rsp1a), |params, model| {
                model.lna_states_at(params.frequency_hz)
            })
    }

    /// Enable or disable the hardware AGC loop.
    pub fn set_agc_enabled(&self, enabled: bool) -> Result<()> {
        self.control.update_params(
            "set_agc_enabled",
            Some(Family::Rsp1a),
            ParamUpdate::Agc,
            |params, _| {
                params.agc_enabled = enabled;
                Ok(())
            },
        )
    }

    /// Whether the hardware AGC loop is enabled.
    pub fn agc_enabled(&self) -> Result<bool> {
        self.control
            .read_params("agc_enabled", Some(Family::Rsp1a), |params, _| {
                params.agc_enabled
            })
    }
}

impl Deref for Rsp1a<'_> {
    type Target = DeviceControl;

    fn deref(&self) -> &DeviceControl {
        self.control
    }
}

// ---------------------------------------------------------------------------
// RSPdx / RSPdx-R2
// ---------------------------------------------------------------------------

/// Front-end controls of the RSPdx and RSPdx-R2.
///
/// ```
/// use rsplib_control::RspDxR2;
///
/// fn enable_hdr(rx: &RspDxR2<'_>) -> rsplib_core::Result<()> {
///     rx.set_hdr_mode(true)
/// }
/// ```
///
/// There is no gain-reduction setter, either on the view or through its
/// [`DeviceControl`] deref:
///
/// ```compile_fail
/// use rsplib_control::RspDxR2;
///
/// fn attenuate(rx: &RspDxR2<'_>) -> rsplib_core::Result<u8> {
///     rx.set_gain_reduction(40)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RspDxR2<'a> {
    control: &'a DeviceControl,
    model: Model,
}

impl RspDxR2<'_> {
    fn update(
        &self,
        operation: &'static str,
        change: ParamUpdate,
        apply: impl FnOnce(&mut bool, &mut bool, &mut Antenna),
    ) -> Result<()> {
        self.control.update_params(
            operation,
            Some(Family::RspDx),
            change,
            |params, _| match &mut params.variant {
                VariantParams::RspDx {
                    hdr_enable,
                    bias_t_enable,
                    antenna,
                } => {
                    apply(hdr_enable, bias_t_enable, antenna);
                    Ok(())
                }
                _ => Err(Error::InvalidParameter(
                    "device reported no RSPdx front-end parameters".into(),
                )),
            },
        )
    }

    fn read<T>(
        &self,
        operation: &'static str,
        read: impl FnOnce(bool, bool, Antenna) -> T,
    ) -> Result<T> {
        self.control
            .read_params(operation, Some(Family::RspDx), |params, _| {
                match params.variant {
                    VariantParams::RspDx {
                        hdr_enable,
                        bias_t_enable,
                        antenna,
                    } => Some(read(hdr_enable, bias_t_enable, antenna)),
                    _ => None,
                }
            })?
            .ok_or_else(|| {
                Error::InvalidParameter("device reported no RSPdx front-end parameters".into())
            })
    }

    /// Toggle high-dynamic-range mode.
    pub fn set_hdr_mode(&self, enable: bool) -> Result<()> {
        self.update("set_hdr_mode", ParamUpdate::HdrMode, |hdr, _, _| {
            *hdr = enable
        })
    }

    /// Whether HDR mode is enabled.
    pub fn hdr_mode(&self) -> Result<bool> {
        self.read("hdr_mode", |hdr, _, _| hdr)
    }

    /// Toggle bias-tee power on antenna port A.
    pub fn set_bias_t_enabled(&self, enable: bool) -> Result<()> {
        self.update("set_bias_t_enabled", ParamUpdate::BiasT, |_, bias_t, _| {
            *bias_t = enable
        })
    }

    /// Whether bias-tee power is enabled.
    pub fn bias_t_enabled(&self) -> Result<bool> {
        self.read("bias_t_enabled", |_, bias_t, _| bias_t)
    }

    /// Select the antenna port.
    pub fn set_antenna(&self, port: Antenna) -> Result<()> {
        self.update("set_antenna", ParamUpdate::Antenna, |_, _, antenna| {
            *antenna = port
        })
    }

    /// Selected antenna port.
    pub fn antenna(&self) -> Result<Antenna> {
        self.read("antenna", |_, _, antenna| antenna)
    }
}

impl Deref for RspDxR2<'_> {
    type Target = DeviceControl;

    fn deref(&self) -> &DeviceControl {
        self.control
    }
}

// ---------------------------------------------------------------------------
// Basic
// ---------------------------------------------------------------------------

/// View for models without variant-specific controls.
#[derive(Debug, Clone, Copy)]
pub struct BasicReceiver<'a> {
    control: &'a DeviceControl,
    model: Model,
}

impl Deref for BasicReceiver<'_> {
    type Target = DeviceControl;

    fn deref(&self) -> &DeviceControl {
        self.control
    }
}
