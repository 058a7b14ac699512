//! SO(3) helpers for attitude propagation.
//!
//! Public API:
//!     pub fn so3_exp(phi: &Vector3<f64>) -> UnitQuaternion<f64>
//!     pub fn so3_exp_matrix(phi: &Vector3<f64>) -> Rotation3<f64>
//!     pub fn so3_log(q: &UnitQuaternion<f64>) -> Vector3<f64>
//!     pub fn is_valid_rotation(q: &UnitQuaternion<f64>, tolerance: f64) -> bool
//!
//! The exponential map takes a rotation vector (axis scaled by angle, e.g. $\omega \Delta t$) to a
//! finite rotation. The logarithm is its inverse on angles in $[0, \pi]$. Both switch to a truncated
//! series near zero where the closed forms divide by a vanishing angle.

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// Below this angle (rad) the series expansions are used.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-6;

/// Exponential map from a rotation vector to a unit quaternion
///
/// For $\theta = \lVert \phi \rVert$:
///
/// $$
/// \operatorname{Exp}(\phi) = \left[ \cos\frac{\theta}{2},\ \frac{\sin(\theta/2)}{\theta} \phi \right]
/// $$
///
/// Near zero the scalar factors are replaced by their Taylor expansions. The result is normalized, so it
/// is a valid rotation regardless of round-off.
///
/// # Arguments
/// * `phi` - rotation vector in radians (axis times angle)
pub fn so3_exp(phi: &Vector3<f64>) -> UnitQuaternion<f64> {
    let theta = phi.norm();
    let (w, k) = if theta < SMALL_ANGLE_THRESHOLD {
        let theta_sq = theta * theta;
        (1.0 - theta_sq / 8.0, 0.5 - theta_sq / 48.0)
    } else {
        let half = 0.5 * theta;
        (half.cos(), half.sin() / theta)
    };
    UnitQuaternion::new_normalize(Quaternion::new(w, k * phi[0], k * phi[1], k * phi[2]))
}
/// Exponential map as a rotation matrix (Rodrigues' formula)
///
/// $$
/// \operatorname{Exp}(\phi) = I + \frac{\sin\theta}{\theta} \Phi + \frac{1 - \cos\theta}{\theta^2} \Phi^2
/// $$
///
/// where $\Phi = [\phi]_\times$ is the cross product matrix of $\phi$. Agrees with [so3_exp] and is
/// computed independently of it.
pub fn so3_exp_matrix(phi: &Vector3<f64>) -> Rotation3<f64> {
    let theta = phi.norm();
    let skew = phi.cross_matrix();
    let skew_sq = skew * skew;
    let (a, b) = if theta < SMALL_ANGLE_THRESHOLD {
        let theta_sq = theta * theta;
        (1.0 - theta_sq / 6.0, 0.5 - theta_sq / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / (theta * theta))
    };
    Rotation3::from_matrix_unchecked(Matrix3::identity() + a * skew + b * skew_sq)
}
/// Logarithm map from a unit quaternion to a rotation vector
///
/// Returns the rotation vector with angle in $[0, \pi]$. The quaternion sign is folded so that $q$ and
/// $-q$ give the same result.
pub fn so3_log(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let q = q.quaternion();
    let (w, v) = if q.w < 0.0 {
        (-q.w, -q.imag())
    } else {
        (q.w, q.imag())
    };
    let sin_half = v.norm();
    if sin_half < SMALL_ANGLE_THRESHOLD {
        // theta / sin(theta / 2) ~ 2 / w for small angles
        return v * (2.0 / w);
    }
    let theta = 2.0 * sin_half.atan2(w);
    v * (theta / sin_half)
}
/// Check that a quaternion still describes a proper rotation
///
/// Verifies unit norm, orthonormal columns of the equivalent rotation matrix, and a determinant of +1,
/// each within `tolerance`.
pub fn is_valid_rotation(q: &UnitQuaternion<f64>, tolerance: f64) -> bool {
    if !q.coords.iter().all(|x| x.is_finite()) {
        return false;
    }
    if (q.quaternion().norm() - 1.0).abs() > tolerance {
        return false;
    }
    let r = q.to_rotation_matrix();
    let m = r.matrix();
    let orthonormal = (m.transpose() * m - Matrix3::identity())
        .iter()
        .all(|x| x.abs() <= tolerance);
    orthonormal && (m.determinant() - 1.0).abs() <= tolerance
}
