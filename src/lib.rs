//! Tracker calibration - the reset and drift-compensation core of an
//! inertial body-tracking server
//!
//! Body-worn trackers report raw orientation quaternions in their own
//! arbitrary sensor frames. This library converts those raw readings into
//! corrected orientations in the user's reference frame (anchored to a
//! head-mounted reference) and keeps the correction accurate over time:
//!
//! - A correction-quaternion chain adjusts each raw rotation to resets,
//!   mounting and drift compensation on every sensor tick
//! - Full, yaw and mounting resets recompute the correction quaternions
//!   from a live raw sample and the HMD orientation
//! - A drift estimator learns each tracker's systematic yaw drift from the
//!   history of resets and blends it back into the adjusted rotation
//!
//! The core has no clock and no I/O; callers pass in timestamps and wire up
//! collaborators through small traits. Access to one tracker's
//! [`CalibrationState`] must be serialized by the caller.
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::UnitQuaternion;
//! use tracker_calibration::{CalibrationState, TrackerSource};
//!
//! struct Imu {
//!     rotation: UnitQuaternion<f32>,
//! }
//!
//! impl TrackerSource for Imu {
//!     fn raw_rotation(&self) -> UnitQuaternion<f32> {
//!         self.rotation
//!     }
//!
//!     fn needs_mounting(&self) -> bool {
//!         true
//!     }
//! }
//!
//! let mut imu = Imu {
//!     rotation: UnitQuaternion::from_euler_angles(0.1, 0.0, 0.5),
//! };
//! let mut calibration = CalibrationState::new();
//!
//! // The user stands straight and faces the HMD forward: full reset.
//! calibration.reset_full(&mut imu, &mut (), UnitQuaternion::identity(), 0);
//!
//! // Every sensor tick: corrected orientation in the reference frame.
//! let corrected = calibration.reference_adjusted(imu.rotation, 16);
//! ```

mod calibration;
mod drift;
mod math;
mod ring;
mod types;

// Re-export all public types and functions
pub use calibration::CalibrationState;
pub use drift::{DRIFT_COOLDOWN_MS, DriftCompensation};
pub use math::{QuaternionExt, average_quaternions};
pub use ring::CircularBuffer;
pub use types::*;
