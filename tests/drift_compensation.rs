use nalgebra::UnitQuaternion;
use tracker_calibration::{
    CalibrationState, DRIFT_COOLDOWN_MS, DriftCompensationConfig, Millis, QuaternionExt,
    TrackerSource,
};

struct TestTracker {
    rotation: UnitQuaternion<f32>,
}

impl TrackerSource for TestTracker {
    fn raw_rotation(&self) -> UnitQuaternion<f32> {
        self.rotation
    }

    fn needs_mounting(&self) -> bool {
        true
    }
}

fn drift_enabled_state(max_resets: u32) -> CalibrationState {
    let mut state = CalibrationState::new();
    state.set_allow_drift_compensation(true);
    state.read_drift_compensation_config(
        &DriftCompensationConfig {
            enabled: true,
            amount: 1.0,
            max_resets,
        },
        &|| true,
    );
    assert!(state.drift_compensation().is_enabled());
    state
}

/// A tracker drifting at a constant yaw rate, reset once to teach the
/// estimator the rate, stays compensated between resets
#[test]
fn test_compensation_cancels_linear_yaw_drift() {
    let mut state = drift_enabled_state(5);
    let strapped = UnitQuaternion::from_yzx(0.2, 0.7, -0.1);
    let mut tracker = TestTracker { rotation: strapped };

    // Drift rate: 0.1 rad per minute
    let drifted = |at: Millis| UnitQuaternion::from_yaw(0.1 * at as f32 / 60_000.0) * strapped;

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);

    tracker.rotation = drifted(60_000);
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);
    assert_eq!(state.drift_compensation().history_len(), 1);
    assert_eq!(state.drift_compensation().total_drift_time(), 60_000);

    // Between resets, the learned rate cancels the ongoing drift
    for at in [75_000, 90_000, 120_000] {
        let adjusted = state.reference_adjusted(drifted(at), at);
        assert!(
            adjusted.yaw_angle().abs() < 1e-3,
            "residual yaw {} at t={}",
            adjusted.yaw_angle(),
            at
        );
    }
}

/// Elapsed time beyond the accumulated history extrapolates the estimate
/// rather than clamping at the averaged drift
#[test]
fn test_compensation_extrapolates_past_history() {
    let mut state = drift_enabled_state(5);
    let strapped = UnitQuaternion::from_yaw(0.4);
    let mut tracker = TestTracker { rotation: strapped };

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);

    tracker.rotation = UnitQuaternion::from_yaw(0.1) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);

    // Twice the accumulated 60s: the correction doubles past the average
    let adjusted = state.reference_adjusted(tracker.rotation, 180_000);
    assert!(
        (adjusted.yaw_angle() + 0.2).abs() < 1e-3,
        "extrapolated yaw was {}",
        adjusted.yaw_angle()
    );
}

/// Resets within the cooldown window refine the newest history sample
/// instead of adding a new one
#[test]
fn test_resets_within_cooldown_share_a_slot() {
    let mut state = drift_enabled_state(5);
    let strapped = UnitQuaternion::from_yaw(1.0);
    let mut tracker = TestTracker { rotation: strapped };

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);

    tracker.rotation = UnitQuaternion::from_yaw(0.05) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);
    assert_eq!(state.drift_compensation().history_len(), 1);
    assert_eq!(state.drift_compensation().latest_drift_time(), Some(60_000));

    // Two more resets 10 seconds apart, both within the cooldown
    tracker.rotation = UnitQuaternion::from_yaw(0.06) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 70_000);
    tracker.rotation = UnitQuaternion::from_yaw(0.07) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 80_000);

    assert_eq!(state.drift_compensation().history_len(), 1);
    assert_eq!(state.drift_compensation().latest_drift_time(), Some(80_000));
    assert_eq!(state.drift_compensation().total_drift_time(), 80_000);

    // The next reset outside the cooldown starts a fresh sample
    tracker.rotation = UnitQuaternion::from_yaw(0.09) * strapped;
    state.reset_yaw(
        &mut tracker,
        &mut (),
        UnitQuaternion::identity(),
        60_000 + DRIFT_COOLDOWN_MS + 1_000,
    );
    assert_eq!(state.drift_compensation().history_len(), 2);
}

/// The history never grows past the configured number of resets
#[test]
fn test_history_respects_max_resets() {
    let mut state = drift_enabled_state(2);
    let strapped = UnitQuaternion::from_yaw(0.3);
    let mut tracker = TestTracker { rotation: strapped };

    let mut now = 0;
    for step in 0..6 {
        tracker.rotation = UnitQuaternion::from_yaw(0.01 * step as f32) * strapped;
        state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), now);
        now += DRIFT_COOLDOWN_MS + 5_000;
    }

    assert_eq!(state.drift_compensation().history_len(), 2);
    assert_eq!(state.drift_compensation().history_capacity(), 2);
}

/// With compensation disabled, resets record nothing and the adjustment
/// chain passes rotations through untouched by drift
#[test]
fn test_disabled_compensation_is_a_pass_through() {
    let mut state = CalibrationState::new();
    state.read_drift_compensation_config(
        &DriftCompensationConfig {
            enabled: false,
            amount: 1.0,
            max_resets: 5,
        },
        &|| true,
    );

    let strapped = UnitQuaternion::from_yaw(0.9);
    let mut tracker = TestTracker { rotation: strapped };

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);
    tracker.rotation = UnitQuaternion::from_yaw(0.2) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 120_000);

    assert_eq!(state.drift_compensation().history_len(), 0);
    assert_eq!(state.drift_compensation().total_drift_time(), 0);

    // No time dependence: drift adjustment is inert
    let early = state.reference_adjusted(tracker.rotation, 121_000);
    let late = state.reference_adjusted(tracker.rotation, 500_000);
    assert_eq!(early, late);
}

/// Compensation also stays off without an external head tracker, even when
/// enabled in config
#[test]
fn test_missing_head_tracker_disables_compensation() {
    let mut state = CalibrationState::new();
    state.set_allow_drift_compensation(true);
    state.read_drift_compensation_config(
        &DriftCompensationConfig {
            enabled: true,
            amount: 1.0,
            max_resets: 5,
        },
        &|| false,
    );

    assert!(!state.drift_compensation().is_enabled());

    // The head tracker appearing later flips the gate on refresh
    state.refresh_drift_compensation_enabled(&|| true);
    assert!(state.drift_compensation().is_enabled());
}

/// A zero-sample history keeps compensation inert without breaking resets
#[test]
fn test_zero_max_resets_degenerates_gracefully() {
    let mut state = drift_enabled_state(0);
    let strapped = UnitQuaternion::from_yaw(0.5);
    let mut tracker = TestTracker { rotation: strapped };

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);
    tracker.rotation = UnitQuaternion::from_yaw(0.1) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 120_001);

    assert_eq!(state.drift_compensation().history_len(), 0);
    assert_eq!(state.drift_compensation().total_drift_time(), 0);

    let rotation = UnitQuaternion::from_yaw(0.7);
    let adjusted = state.reference_adjusted(rotation, 130_000);
    // Only the reset corrections apply, never a drift blend
    assert!(adjusted.yaw_angle().is_finite());
}

/// Reloading config with a different history depth clears the history
#[test]
fn test_capacity_change_reinitializes_history() {
    let mut state = drift_enabled_state(5);
    let strapped = UnitQuaternion::from_yaw(0.3);
    let mut tracker = TestTracker { rotation: strapped };

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);
    tracker.rotation = UnitQuaternion::from_yaw(0.05) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);
    assert_eq!(state.drift_compensation().history_len(), 1);

    state.read_drift_compensation_config(
        &DriftCompensationConfig {
            enabled: true,
            amount: 1.0,
            max_resets: 3,
        },
        &|| true,
    );

    assert_eq!(state.drift_compensation().history_len(), 0);
    assert_eq!(state.drift_compensation().history_capacity(), 3);
}

/// Clearing drift data restarts estimation from scratch
#[test]
fn test_clear_drift_compensation_restarts_estimation() {
    let mut state = drift_enabled_state(5);
    let strapped = UnitQuaternion::from_yaw(0.3);
    let mut tracker = TestTracker { rotation: strapped };

    state.reset_full(&mut tracker, &mut (), UnitQuaternion::identity(), 0);
    tracker.rotation = UnitQuaternion::from_yaw(0.05) * strapped;
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 60_000);
    assert_eq!(state.drift_compensation().history_len(), 1);

    state.clear_drift_compensation();
    assert_eq!(state.drift_compensation().history_len(), 0);

    // The next reset is a first observation again: clock only
    state.reset_yaw(&mut tracker, &mut (), UnitQuaternion::identity(), 200_000);
    assert_eq!(state.drift_compensation().history_len(), 0);
}
