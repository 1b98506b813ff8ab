use nalgebra::UnitQuaternion;
use tracker_calibration::{CalibrationState, QuaternionExt, TrackerSource};

struct Imu {
    rotation: UnitQuaternion<f32>,
}

impl TrackerSource for Imu {
    fn raw_rotation(&self) -> UnitQuaternion<f32> {
        self.rotation
    }

    fn needs_mounting(&self) -> bool {
        true
    }
}

fn main() {
    // Tracker strapped to a thigh at an arbitrary angle
    let strapped = UnitQuaternion::from_yzx(0.3, 1.1, -0.2);
    let mut imu = Imu { rotation: strapped };
    let mut calibration = CalibrationState::new();

    // The user faces forward and triggers a full reset
    calibration.reset_full(&mut imu, &mut (), UnitQuaternion::identity(), 0);

    for tick in 1..=5u64 {
        let now = tick * 10_000;

        // Simulated sensor yaw drift of 0.01 rad per tick
        imu.rotation = UnitQuaternion::from_yaw(0.01) * imu.rotation;

        let corrected = calibration.reference_adjusted(imu.rotation, now);
        let angles = corrected.to_yzx();
        println!(
            "t={:>3}s  corrected x: {:6.2}°, y: {:6.2}°, z: {:6.2}°",
            now / 1_000,
            angles.x.to_degrees(),
            angles.y.to_degrees(),
            angles.z.to_degrees()
        );
    }

    // A yaw reset re-centers the drifted heading on the reference
    calibration.reset_yaw(&mut imu, &mut (), UnitQuaternion::identity(), 60_000);
    let corrected = calibration.reference_adjusted(imu.rotation, 60_000);
    println!(
        "after yaw reset: {:6.2}° of residual yaw",
        corrected.yaw_angle().to_degrees()
    );
}
