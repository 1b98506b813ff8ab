//! Reset operations and reference-frame adjustment for a single tracker

use std::f32::consts::PI;

use log::debug;
use nalgebra::{UnitQuaternion, Vector3};

use crate::drift::DriftCompensation;
use crate::math::QuaternionExt;
use crate::types::{
    ArmsResetMode, ArmsResetModeConfig, DriftCompensationConfig, HeadTrackerQuery, Millis,
    StatusSink, TrackerSource,
};

/// Per-tracker calibration state
///
/// Holds the correction quaternions produced by full, yaw and mounting
/// resets, plus the drift estimator fed by them. Each tracker owns exactly
/// one `CalibrationState`; the caller is responsible for serializing access
/// per tracker (resets may come from a control thread while the sensor
/// thread reads the adjusted rotation).
///
/// The adjusted output chains the corrections onto the raw rotation:
/// mounting orientation, gyroscope fix, attachment fix, mounting-reset fix,
/// yaw fix, then drift compensation. Quaternion multiplication order in
/// that chain is part of the contract.
pub struct CalibrationState {
    /// Manually configured sensor-to-body mounting orientation
    mounting_orientation: UnitQuaternion<f32>,

    // Reference adjustment quats
    gyro_fix: UnitQuaternion<f32>,
    attachment_fix: UnitQuaternion<f32>,
    mount_rot_fix: UnitQuaternion<f32>,
    yaw_fix: UnitQuaternion<f32>,

    // Zero-reference adjustment quats for IMU diagnostics
    gyro_fix_no_mounting: UnitQuaternion<f32>,
    attachment_fix_no_mounting: UnitQuaternion<f32>,
    yaw_fix_zero_reference: UnitQuaternion<f32>,

    /// Adjusted rotation captured at the last reset, informational only
    last_reset_quaternion: Option<UnitQuaternion<f32>>,

    arms_reset_mode: ArmsResetMode,
    drift: DriftCompensation,
}

impl CalibrationState {
    /// Create a fresh calibration with all corrections at identity
    ///
    /// The default mounting orientation is a 180° yaw: trackers are worn
    /// with the sensor facing backwards unless configured otherwise.
    pub fn new() -> Self {
        Self {
            mounting_orientation: UnitQuaternion::from_yaw(PI),
            gyro_fix: UnitQuaternion::identity(),
            attachment_fix: UnitQuaternion::identity(),
            mount_rot_fix: UnitQuaternion::identity(),
            yaw_fix: UnitQuaternion::identity(),
            gyro_fix_no_mounting: UnitQuaternion::identity(),
            attachment_fix_no_mounting: UnitQuaternion::identity(),
            yaw_fix_zero_reference: UnitQuaternion::identity(),
            last_reset_quaternion: None,
            arms_reset_mode: ArmsResetMode::default(),
            drift: DriftCompensation::new(),
        }
    }

    /// Manually configured mounting orientation
    pub fn mounting_orientation(&self) -> UnitQuaternion<f32> {
        self.mounting_orientation
    }

    /// Set the mounting orientation manually
    ///
    /// Manual mounting and mounting reset are mutually exclusive
    /// corrections, so any mounting-reset fix is cleared.
    pub fn set_mounting_orientation(&mut self, orientation: UnitQuaternion<f32>) {
        self.mounting_orientation = orientation;
        self.clear_mounting();
    }

    /// Correction produced by the last mounting reset
    pub fn mount_rot_fix(&self) -> UnitQuaternion<f32> {
        self.mount_rot_fix
    }

    /// Adjusted rotation observed at the last full or yaw reset
    pub fn last_reset_quaternion(&self) -> Option<UnitQuaternion<f32>> {
        self.last_reset_quaternion
    }

    /// Currently configured arms reset mode
    pub fn arms_reset_mode(&self) -> ArmsResetMode {
        self.arms_reset_mode
    }

    /// Read access to the drift estimator
    pub fn drift_compensation(&self) -> &DriftCompensation {
        &self.drift
    }

    /// Load drift compensation settings and re-evaluate the gate
    pub fn read_drift_compensation_config(
        &mut self,
        config: &DriftCompensationConfig,
        registry: &impl HeadTrackerQuery,
    ) {
        self.drift.read_config(config);
        self.drift.refresh_enabled(registry);
    }

    /// Drop all accumulated drift data
    pub fn clear_drift_compensation(&mut self) {
        self.drift.clear();
    }

    /// Re-evaluate the drift compensation gate against the registry
    pub fn refresh_drift_compensation_enabled(&mut self, registry: &impl HeadTrackerQuery) {
        self.drift.refresh_enabled(registry);
    }

    /// Set the per-tracker drift allowance gate
    ///
    /// Takes effect on the next
    /// [`refresh_drift_compensation_enabled`](Self::refresh_drift_compensation_enabled).
    pub fn set_allow_drift_compensation(&mut self, allow: bool) {
        self.drift.set_allow(allow);
    }

    /// Load arms reset mode settings
    pub fn read_arms_reset_mode_config(&mut self, config: &ArmsResetModeConfig) {
        self.arms_reset_mode = config.mode;
    }

    /// Raw rotation adjusted to resets, mounting and drift compensation,
    /// with the HMD as the reference
    pub fn reference_adjusted(
        &self,
        rotation: UnitQuaternion<f32>,
        now: Millis,
    ) -> UnitQuaternion<f32> {
        self.drift.adjust(self.adjust_to_reference(rotation), now)
    }

    /// Raw rotation adjusted to resets only, with the identity quaternion
    /// as the reference; no mounting or drift applied
    pub fn identity_adjusted(&self, rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let mut rot = self.gyro_fix_no_mounting * rotation;
        rot *= self.attachment_fix_no_mounting;
        self.yaw_fix_zero_reference * rot
    }

    /// Raw rotation adjusted to mounting only
    pub fn mounting_adjusted(&self, rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        rotation * self.mounting_orientation * self.mount_rot_fix
    }

    /// Apply the reference correction chain without drift compensation
    fn adjust_to_reference(&self, rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let mut rot = rotation * self.mounting_orientation;
        rot = self.gyro_fix * rot;
        rot *= self.attachment_fix;
        rot *= self.mount_rot_fix;
        self.yaw_fix * rot
    }

    /// Full reset: count the tracker's current rotation as (0, HMD yaw, 0)
    ///
    /// Recomputes every correction so the tracker can be strapped to the
    /// body at any pitch and roll. Trackers that do not need mounting
    /// correction instead get their mounting-reset fix pointed at the
    /// reference's yaw. Feeds the drift estimator with the adjusted
    /// rotation under the previous calibration, and resolves any pending
    /// "needs reset" status.
    pub fn reset_full<T: TrackerSource, S: StatusSink>(
        &mut self,
        tracker: &mut T,
        status: &mut S,
        reference: UnitQuaternion<f32>,
        now: Millis,
    ) {
        let before = self.adjust_to_reference(tracker.raw_rotation());
        self.last_reset_quaternion = Some(before);

        if tracker.needs_mounting() {
            self.gyro_fix =
                Self::fix_gyroscope(tracker.raw_rotation() * self.mounting_orientation);
        } else {
            // Point the mounting fix at the HMD's yaw so the
            // non-mounting-adjusted tracker goes forward.
            self.mount_rot_fix = UnitQuaternion::from_yaw(reference.yaw_angle());
        }
        self.attachment_fix =
            self.fix_attachment(tracker.raw_rotation() * self.mounting_orientation);

        self.make_identity_adjustments_full(tracker);

        self.yaw_fix = self.fix_yaw(tracker.raw_rotation() * self.mounting_orientation, reference);

        self.calculate_drift(before, tracker, now);

        if let Some(id) = tracker.last_reset_status() {
            status.remove_status(id);
            tracker.clear_last_reset_status();
        }

        debug!("full reset applied (needs mounting: {})", tracker.needs_mounting());
    }

    /// Yaw reset: align only the tracker's heading with the HMD's yaw
    ///
    /// Pitch and roll calibration from the last full reset are preserved.
    /// The pending reset status is only resolved when it was raised by a
    /// recent reconnect.
    pub fn reset_yaw<T: TrackerSource, S: StatusSink>(
        &mut self,
        tracker: &mut T,
        status: &mut S,
        reference: UnitQuaternion<f32>,
        now: Millis,
    ) {
        let before = self.adjust_to_reference(tracker.raw_rotation());
        self.last_reset_quaternion = Some(before);

        self.yaw_fix = self.fix_yaw(tracker.raw_rotation() * self.mounting_orientation, reference);

        self.make_identity_adjustments_yaw(tracker);

        self.calculate_drift(before, tracker, now);

        if tracker.status_reset_recently() {
            if let Some(id) = tracker.last_reset_status() {
                status.remove_status(id);
                tracker.clear_status_reset_recently();
                tracker.clear_last_reset_status();
            }
        }

        debug!("yaw reset applied");
    }

    /// Mounting reset: recompute which way the tracker faces on the body
    ///
    /// Recovers the mounting yaw from where the drift- and
    /// reference-adjusted rotation sends the world-up vector. The change
    /// against the previous mounting fix is folded into the yaw fix, so the
    /// adjusted yaw output stays continuous across the recalibration.
    pub fn reset_mounting<T: TrackerSource>(
        &mut self,
        reverse_yaw: bool,
        tracker: &T,
        reference: UnitQuaternion<f32>,
        now: Millis,
    ) {
        // Current calibrated rotation
        let mut buffer = self
            .drift
            .adjust(tracker.raw_rotation() * self.mounting_orientation, now);
        buffer = self.gyro_fix * buffer;
        buffer *= self.attachment_fix;

        // Use the HMD's yaw as the reference
        buffer *= reference.twist_about(Vector3::y_axis()).inverse();

        // Rotate a vector pointing up by the quat
        let rot_vector = buffer * Vector3::y();

        // Recover the yaw angle using tan
        let yaw_angle = rot_vector.x.atan2(rot_vector.z);
        let yaw_angle = if reverse_yaw { yaw_angle } else { yaw_angle - PI };

        let new_fix = UnitQuaternion::from_yaw(yaw_angle);

        // Fold the difference from the previous mounting into the yaw fix
        // to correct for the rotation change
        self.yaw_fix *= (new_fix * self.mount_rot_fix.inverse()).inverse();
        self.mount_rot_fix = new_fix;

        debug!("mounting reset applied (reverse yaw: {})", reverse_yaw);
    }

    /// Undo the mounting reset correction
    pub fn clear_mounting(&mut self) {
        // Nothing to clear without a mounting reset quaternion
        if self.mount_rot_fix == UnitQuaternion::identity() {
            return;
        }

        // Undo the effect on the yaw fix
        self.yaw_fix *= self.mount_rot_fix.inverse();
        self.mount_rot_fix = UnitQuaternion::identity();
    }

    /// Isolate and invert the yaw component of a sensor rotation
    fn fix_gyroscope(sensor_rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        UnitQuaternion::from_yaw(sensor_rotation.yaw_angle()).inverse()
    }

    /// Invert the gyro-corrected sensor rotation
    fn fix_attachment(&self, sensor_rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        (self.gyro_fix * sensor_rotation).inverse()
    }

    /// Invert the yaw of the fully corrected rotation, aligned to the
    /// reference's yaw-only component
    fn fix_yaw(
        &self,
        sensor_rotation: UnitQuaternion<f32>,
        reference: UnitQuaternion<f32>,
    ) -> UnitQuaternion<f32> {
        let mut rot = self.gyro_fix * sensor_rotation;
        rot *= self.attachment_fix;
        rot *= self.mount_rot_fix;
        let rot = UnitQuaternion::from_yaw(rot.yaw_angle());
        rot.inverse() * reference.twist_about(Vector3::y_axis())
    }

    fn make_identity_adjustments_full<T: TrackerSource>(&mut self, tracker: &T) {
        let sensor_rotation = tracker.raw_rotation();
        self.gyro_fix_no_mounting = Self::fix_gyroscope(sensor_rotation);
        self.attachment_fix_no_mounting = self.fix_attachment(sensor_rotation);
    }

    fn make_identity_adjustments_yaw<T: TrackerSource>(&mut self, tracker: &T) {
        let mut sensor_rotation = self.gyro_fix_no_mounting * tracker.raw_rotation();
        sensor_rotation *= self.attachment_fix_no_mounting;
        self.yaw_fix_zero_reference = self.fix_yaw(sensor_rotation, UnitQuaternion::identity());
    }

    /// Feed the drift estimator with the rotation before and after this
    /// reset, so drift is measured relative to the previous calibration
    fn calculate_drift<T: TrackerSource>(
        &mut self,
        before: UnitQuaternion<f32>,
        tracker: &T,
        now: Millis,
    ) {
        if self.drift.is_enabled() {
            let after = self.adjust_to_reference(tracker.raw_rotation());
            self.drift.observe(before, after, now);
        }
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::new()
    }
}
