//! Quaternion utilities and nalgebra extensions for the calibration core

use nalgebra::{Matrix3, Quaternion, Unit, UnitQuaternion, Vector3};

/// Singularity threshold for the YZX Euler decomposition (sin of the Z angle)
const GIMBAL_LOCK_EPSILON: f32 = 1.0 - 1e-6;

/// Extension trait for UnitQuaternion operations used by the calibration core
///
/// The body-tracking frame is Y-up: "yaw" is the rotation about the vertical
/// Y axis. Euler conversions use the YZX axis order (Y applied last,
/// `Qy * Qz * Qx`), which is the order the reset math is built on.
pub trait QuaternionExt {
    /// Create a quaternion from YZX Euler angles in radians
    fn from_yzx(x: f32, y: f32, z: f32) -> UnitQuaternion<f32>;

    /// Convert the quaternion to YZX Euler angles (x, y, z) in radians
    fn to_yzx(&self) -> Vector3<f32>;

    /// Create a pure yaw rotation about the vertical axis
    fn from_yaw(yaw: f32) -> UnitQuaternion<f32>;

    /// Yaw component of the YZX Euler decomposition, in radians
    ///
    /// Euler-based yaw isolation changes with the tracker's roll when
    /// pointing forward. The reset operations are calibrated around this
    /// behavior, so it must not be swapped for a swing-twist decomposition.
    fn yaw_angle(&self) -> f32;

    /// Twist component of the rotation about the given axis
    ///
    /// Projects the quaternion onto the axis and renormalizes. A rotation
    /// exactly perpendicular to the axis has no twist component; the
    /// normalization then produces NaN, which propagates to the caller.
    fn twist_about(&self, axis: Unit<Vector3<f32>>) -> UnitQuaternion<f32>;
}

impl QuaternionExt for UnitQuaternion<f32> {
    fn from_yzx(x: f32, y: f32, z: f32) -> UnitQuaternion<f32> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x)
    }

    fn to_yzx(&self) -> Vector3<f32> {
        let (w, i, j, k) = (self.w, self.i, self.j, self.k);

        // Matrix element m10 = sin(z) for R = Ry * Rz * Rx
        let sin_z = 2.0 * (i * j + w * k);

        if sin_z.abs() >= GIMBAL_LOCK_EPSILON {
            // Gimbal lock: X and Y rotations share an axis. Assign the
            // combined rotation to Y.
            let y = (2.0 * (i * k + w * j)).atan2(1.0 - 2.0 * (i * i + j * j));
            let z = core::f32::consts::FRAC_PI_2.copysign(sin_z);
            Vector3::new(0.0, y, z)
        } else {
            let x = (2.0 * (w * i - j * k)).atan2(1.0 - 2.0 * (i * i + k * k));
            let y = (2.0 * (w * j - i * k)).atan2(1.0 - 2.0 * (j * j + k * k));
            let z = sin_z.clamp(-1.0, 1.0).asin();
            Vector3::new(x, y, z)
        }
    }

    fn from_yaw(yaw: f32) -> UnitQuaternion<f32> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
    }

    fn yaw_angle(&self) -> f32 {
        self.to_yzx().y
    }

    fn twist_about(&self, axis: Unit<Vector3<f32>>) -> UnitQuaternion<f32> {
        let axis = axis.into_inner();
        let projected = self.imag().dot(&axis);
        UnitQuaternion::new_normalize(Quaternion::from_parts(self.w, axis * projected))
    }
}

/// Weighted average of rotations via matrix summation
///
/// Scales each rotation matrix by its weight, sums them, and converts the
/// sum back to a unit quaternion by re-orthonormalization. This is an
/// approximation of the rotation mean, not a geodesic average; the drift
/// estimator's output is calibrated around it. Requires at least one pair.
pub fn average_quaternions<I>(pairs: I) -> UnitQuaternion<f32>
where
    I: IntoIterator<Item = (UnitQuaternion<f32>, f32)>,
{
    let mut total = Matrix3::zeros();
    for (rotation, weight) in pairs {
        total += rotation.to_rotation_matrix().into_inner() * weight;
    }
    UnitQuaternion::from_matrix(&total)
}
