//! Yaw drift estimation and compensation for the calibration core

use log::debug;
use nalgebra::UnitQuaternion;

use crate::math::{QuaternionExt, average_quaternions};
use crate::ring::CircularBuffer;
use crate::types::{DriftCompensationConfig, HeadTrackerQuery, Millis};

/// Resets closer together than this refine the latest drift sample instead
/// of starting a new one
pub const DRIFT_COOLDOWN_MS: Millis = 50_000;

/// Per-tracker yaw drift estimator
///
/// Tracks the yaw-only delta between consecutive reset calibrations. Each
/// delta and the time it accumulated over form one history sample; samples
/// are combined into a weighted average that is blended back into the
/// adjusted rotation over time, pre-compensating systematic heading drift
/// between resets.
///
/// Three independent gates must all hold for compensation to apply: the
/// config switch, the per-tracker allowance, and the presence of an
/// external head tracker (queried on refresh).
#[derive(Debug, Clone)]
pub struct DriftCompensation {
    /// Config switch
    compensate: bool,
    /// Per-tracker allowance, set by the owning tracker
    allow: bool,
    /// Combined gate, refreshed against the registry
    enabled: bool,
    /// Blend factor from config
    amount: f32,
    /// Yaw deltas observed between resets
    drift_quats: CircularBuffer<UnitQuaternion<f32>>,
    /// Time each delta accumulated over, in lock-step with `drift_quats`
    drift_times: CircularBuffer<Millis>,
    /// Sum of all stored durations
    total_drift_time: Millis,
    /// When drift accumulation started, set on every observation
    drift_since: Option<Millis>,
    /// When the last history sample was started
    time_at_last_reset: Millis,
    /// Weighted average of the stored deltas
    averaged_drift_quat: UnitQuaternion<f32>,
    /// Running composition of deltas within the current cooldown window
    rotation_since_reset: UnitQuaternion<f32>,
}

impl DriftCompensation {
    pub fn new() -> Self {
        Self {
            compensate: false,
            allow: false,
            enabled: false,
            amount: 0.0,
            drift_quats: CircularBuffer::with_capacity(0),
            drift_times: CircularBuffer::with_capacity(0),
            total_drift_time: 0,
            drift_since: None,
            time_at_last_reset: 0,
            averaged_drift_quat: UnitQuaternion::identity(),
            rotation_since_reset: UnitQuaternion::identity(),
        }
    }

    /// Apply drift compensation settings
    ///
    /// A `max_resets` differing from the current history capacity
    /// reallocates both history buffers, dropping all samples. Call
    /// [`refresh_enabled`](Self::refresh_enabled) afterwards to re-evaluate
    /// the combined gate.
    pub fn read_config(&mut self, config: &DriftCompensationConfig) {
        self.compensate = config.enabled;
        self.amount = config.amount;

        let max_resets = config.max_resets as usize;
        if self.compensate && max_resets != self.drift_quats.capacity() {
            self.drift_quats = CircularBuffer::with_capacity(max_resets);
            self.drift_times = CircularBuffer::with_capacity(max_resets);
        }

        debug!(
            "drift compensation config applied (enabled: {}, amount: {}, max resets: {})",
            config.enabled, config.amount, config.max_resets
        );
    }

    /// Re-evaluate the combined compensation gate against the registry
    pub fn refresh_enabled(&mut self, registry: &impl HeadTrackerQuery) {
        self.enabled = self.compensate && self.allow && registry.has_external_head_tracker();
    }

    /// Set the per-tracker allowance gate
    ///
    /// Takes effect on the next [`refresh_enabled`](Self::refresh_enabled).
    pub fn set_allow(&mut self, allow: bool) {
        self.allow = allow;
    }

    /// Drop all accumulated drift data
    pub fn clear(&mut self) {
        self.drift_since = None;
        self.time_at_last_reset = 0;
        self.total_drift_time = 0;
        self.drift_quats.clear();
        self.drift_times.clear();
    }

    /// Whether all three compensation gates currently hold
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured blend factor
    pub fn amount(&self) -> f32 {
        self.amount
    }

    /// Number of drift samples currently stored
    pub fn history_len(&self) -> usize {
        self.drift_quats.len()
    }

    /// Maximum number of drift samples kept
    pub fn history_capacity(&self) -> usize {
        self.drift_quats.capacity()
    }

    /// Sum of all stored sample durations in milliseconds
    pub fn total_drift_time(&self) -> Millis {
        self.total_drift_time
    }

    /// Duration of the newest stored sample, if any
    pub fn latest_drift_time(&self) -> Option<Millis> {
        self.drift_times.latest().copied()
    }

    /// Blend the estimated drift into an adjusted rotation
    ///
    /// Interpolates from `rotation` toward the drift-corrected rotation by
    /// `amount * elapsed / total_drift_time`. The factor is deliberately
    /// unclamped: elapsed time beyond the accumulated history extrapolates
    /// past the averaged drift.
    pub fn adjust(&self, rotation: UnitQuaternion<f32>, now: Millis) -> UnitQuaternion<f32> {
        if self.enabled && self.total_drift_time > 0 {
            let since = self.drift_since.unwrap_or(0);
            let factor = self.amount * ((now - since) as f32 / self.total_drift_time as f32);
            rotation.slerp(&(self.averaged_drift_quat * rotation), factor)
        } else {
            rotation
        }
    }

    /// Record the drift observed by a reset
    ///
    /// `before` is the reference-adjusted rotation under the previous
    /// calibration, `after` the same raw sample under the recomputed one;
    /// their yaw-only delta is the drift accumulated since the previous
    /// observation.
    ///
    /// Resets separated by more than the cooldown start a new history
    /// sample (evicting the oldest at capacity). Resets within the cooldown
    /// compose their delta onto the newest sample, so rapid successive
    /// resets refine one sample instead of flooding the history. The very
    /// first observation only starts the clock.
    pub fn observe(
        &mut self,
        before: UnitQuaternion<f32>,
        after: UnitQuaternion<f32>,
        now: Millis,
    ) {
        if !self.enabled {
            return;
        }

        let since = self.drift_since.unwrap_or(0);

        if self.drift_since.is_some() && now - self.time_at_last_reset > DRIFT_COOLDOWN_MS {
            if self.drift_quats.len() == self.drift_quats.capacity() {
                self.drift_quats.pop_oldest();
                self.drift_times.pop_oldest();
            }

            self.drift_quats.push(yaw_delta(before, after));
            self.drift_times.push(now - since);
            self.recompute_total_drift_time();

            if let Some(&latest) = self.drift_quats.latest() {
                self.recompute_average();
                self.rotation_since_reset = latest;
            }
            self.time_at_last_reset = now;
        } else if now - self.time_at_last_reset < DRIFT_COOLDOWN_MS && !self.drift_quats.is_empty()
        {
            self.rotation_since_reset *= yaw_delta(before, after);
            let refined = self.rotation_since_reset;
            if let Some(latest) = self.drift_quats.latest_mut() {
                *latest = refined;
            }
            if let Some(latest) = self.drift_times.latest_mut() {
                *latest += now - since;
            }
            self.recompute_total_drift_time();
            self.recompute_average();
        } else {
            self.time_at_last_reset = now;
        }

        self.drift_since = Some(now);
    }

    fn recompute_total_drift_time(&mut self) {
        self.total_drift_time = self.drift_times.iter().sum();
    }

    /// Recompute the weighted average of the stored deltas
    ///
    /// Only called with a non-empty history and a positive total duration.
    fn recompute_average(&mut self) {
        let weights = drift_weights(&self.drift_times, self.total_drift_time);
        self.averaged_drift_quat =
            average_quaternions(self.drift_quats.iter().copied().zip(weights));
    }
}

impl Default for DriftCompensation {
    fn default() -> Self {
        Self::new()
    }
}

/// Yaw-only delta between two adjusted rotations
///
/// Pitch and roll differences between calibrations are not drift; only the
/// heading component accumulates.
fn yaw_delta(before: UnitQuaternion<f32>, after: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::from_yaw(after.yaw_angle())
        * UnitQuaternion::from_yaw(before.yaw_angle()).inverse()
}

/// Duration-proportional weights with a recency bias
///
/// Base weights are each sample's share of the total duration. A single
/// decay pass then walks from the newest slot down to index 1, moving
/// `weight[i - 1] / len` of mass from each older slot into its newer
/// neighbor; the weights still sum to 1 afterwards by construction.
fn drift_weights(times: &CircularBuffer<Millis>, total: Millis) -> Vec<f32> {
    let mut weights: Vec<f32> = times
        .iter()
        .map(|&time| time as f32 / total as f32)
        .collect();

    let len = weights.len();
    for i in (1..len).rev() {
        let share = weights[i - 1] / len as f32;
        weights[i] += share;
        weights[i - 1] -= share;
    }

    weights
}
