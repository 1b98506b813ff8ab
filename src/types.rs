//! Core types and collaborator interfaces for the calibration core

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

/// Timestamp or duration in milliseconds
///
/// The core never reads a clock. Callers supply `now` from a monotonic
/// millisecond source on every time-dependent call, which keeps the
/// calibration math deterministic and testable.
pub type Millis = u64;

/// Opaque handle for a pending "needs reset" status entry
///
/// Issued by the surrounding status system and stored on the tracker; the
/// core only hands it back to the [`StatusSink`] when a reset resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusId(pub u32);

/// Source of raw orientation data for a single tracker
///
/// Implemented by the tracker object that owns a
/// [`CalibrationState`](crate::CalibrationState). The status-token methods
/// have no-op defaults for sources without a status system.
pub trait TrackerSource {
    /// Current orientation in the sensor's own reference frame
    fn raw_rotation(&self) -> UnitQuaternion<f32>;

    /// Whether this tracker is strapped to the body and needs mounting
    /// correction (IMU trackers), as opposed to trackers that already
    /// report in a world frame
    fn needs_mounting(&self) -> bool;

    /// Pending "needs reset" status raised for this tracker, if any
    fn last_reset_status(&self) -> Option<StatusId> {
        None
    }

    /// Forget the pending status token after it has been resolved
    fn clear_last_reset_status(&mut self) {}

    /// Whether the pending status was raised by a recent reconnect
    fn status_reset_recently(&self) -> bool {
        false
    }

    /// Clear the reconnect marker once a yaw reset has resolved it
    fn clear_status_reset_recently(&mut self) {}
}

/// Sink for resolved reset statuses
///
/// Called at most once per reset operation. Implementations must tolerate
/// ids that are no longer pending.
pub trait StatusSink {
    /// Remove a previously raised status entry
    fn remove_status(&mut self, id: StatusId);
}

/// Discards resolved statuses; useful when no status system is attached
impl StatusSink for () {
    fn remove_status(&mut self, _id: StatusId) {}
}

/// Query over the tracker registry used to gate drift compensation
///
/// Drift is only measurable against a stable heading reference, so
/// compensation requires a non-internal, non-IMU tracker assigned to the
/// head position.
pub trait HeadTrackerQuery {
    /// True when an external (non-IMU) head tracker is present
    fn has_external_head_tracker(&self) -> bool;
}

impl<F: Fn() -> bool> HeadTrackerQuery for F {
    fn has_external_head_tracker(&self) -> bool {
        self()
    }
}

/// Drift compensation settings pushed in by the config subsystem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftCompensationConfig {
    /// Master switch for drift compensation
    pub enabled: bool,
    /// Blend factor in `[0, 1]` applied to the estimated drift
    pub amount: f32,
    /// Number of reset-to-reset drift samples kept in history
    pub max_resets: u32,
}

impl Default for DriftCompensationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 0.8,
            max_resets: 1,
        }
    }
}

/// How arm trackers should be posed during a reset
///
/// Loaded from configuration and stored, but not yet consumed by the reset
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArmsResetMode {
    /// Arms hanging down and slightly back
    #[default]
    Back,
    /// Arms pointing forward
    Forward,
    /// T-pose with palms up
    TposeUp,
    /// T-pose with palms down
    TposeDown,
}

/// Arms reset mode settings pushed in by the config subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArmsResetModeConfig {
    /// Selected arm pose for resets
    pub mode: ArmsResetMode,
}
