//! Asynchronous device event types.
//!
//! Events are published through a [`tokio::sync::broadcast`] channel when the
//! lifecycle state changes or the hardware reports gain, overload or removal.
//! They complement the per-category handlers: handlers see every event on the
//! hardware thread, subscribers get a best-effort async copy.

use crate::types::{DeviceState, GainUpdate, PowerOverload};

/// An event emitted by a device-control instance.
///
/// Delivered on a bounded broadcast channel; slow subscribers may miss
/// events under heavy load.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The lifecycle state changed.
    StateChanged {
        /// State before the transition.
        from: DeviceState,
        /// State after the transition.
        to: DeviceState,
    },

    /// The hardware reported a new effective gain.
    GainChanged(GainUpdate),

    /// The front end entered or left an overload condition.
    PowerOverload(PowerOverload),

    /// The selected device was unplugged or stopped responding.
    DeviceRemoved,
}
