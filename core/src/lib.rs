//! Strapdown dead reckoning from raw IMU samples
//!
//! This crate propagates a navigation state (orientation, velocity, position) forward in time using only
//! the angular rate and specific force reported by an inertial measurement unit (IMU). There is no
//! correction from any other sensor and no online bias estimation: the integration is open loop and will
//! drift without bound over time. That drift is the expected behavior of dead reckoning, not a defect.
//!
//! The gyroscope and accelerometer biases and the gravity vector are treated as known constants. They are
//! supplied when the integrator is built (see [config::IntegratorConfig]) and never change afterwards.
//!
//! Primarily built off of:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): vectors, unit quaternions and rotation matrices.
//! - [`log`](https://crates.io/crates/log): diagnostics from the integrator and the sample driver.
//! - [`serde`](https://crates.io/crates/serde) and [`csv`](https://crates.io/crates/csv): configuration
//!   files, the text sample log, and the state record output.
//!
//! ## Crate overview
//!
//! - [integrator]: The strapdown integrator itself. Pure, allocation free, no I/O.
//! - [linalg]: SO(3) helpers (exponential and logarithm maps, rotation validity).
//! - [config]: Calibration constants and sample limits, loadable from JSON/YAML/TOML.
//! - [sim]: Collaborators that live outside the core: a text log sample source, a state record sink,
//!   and the dead reckoning driver loop that wires them to the integrator.
//!
//! ## Frames and conventions
//!
//! Sample vectors are expressed in the body frame of the sensor. Orientation is the rotation taking body
//! frame vectors into the world frame, $R_{wb}$, stored as a unit quaternion. Velocity and position are
//! world frame quantities. The gravity vector is given in the world frame and points *down*, e.g.
//! $g = [0, 0, -9.8]$ for a z-up world.
//!
//! An accelerometer measures specific force, not acceleration. A sensor at rest on a level surface reports
//! roughly $+9.8$ m/s² along its up axis. Rotating the specific force into the world frame and adding the
//! (downward) gravity vector cancels that reaction and leaves the true kinematic acceleration. In free
//! fall the accelerometer reads zero and the world frame acceleration is exactly $g$.
//!
//! ## Propagation step
//!
//! Given the bias corrected angular rate $\omega = \tilde\omega - b_g$ and specific force
//! $f = \tilde f - b_a$, and the elapsed time $\Delta t$ since the previous sample:
//!
//! $$
//! a = R(-) f + g
//! $$
//!
//! $$
//! p(+) = p(-) + v(-) \Delta t + \frac{1}{2} a \Delta t^2
//! $$
//!
//! $$
//! v(+) = v(-) + a \Delta t
//! $$
//!
//! $$
//! R(+) = R(-) \operatorname{Exp}(\omega \Delta t)
//! $$
//!
//! The velocity and position increments use the attitude from *before* the step. The attitude increment
//! is applied on the right, i.e. in the body frame, through the exponential map of SO(3) so that
//! successive small rotations compose exactly instead of being summed as Euler angles.
//!
//! ## Example
//!
//! ```rust
//! use deadreckoning::{ImuSample, config::Calibration, integrator::StrapdownIntegrator};
//! use nalgebra::Vector3;
//!
//! let calibration = Calibration::new(
//!     Vector3::new(0.0, 0.0, -9.8),
//!     Vector3::zeros(),
//!     Vector3::zeros(),
//! );
//! let mut ins = StrapdownIntegrator::new(calibration).unwrap();
//! ins.ingest(&ImuSample::new(0.00, Vector3::zeros(), Vector3::new(0.0, 0.0, 9.8))).unwrap();
//! ins.ingest(&ImuSample::new(0.01, Vector3::zeros(), Vector3::zeros())).unwrap();
//! assert!((ins.velocity()[2] + 0.098).abs() < 1e-12);
//! ```
pub mod config;
pub mod integrator;
pub mod linalg;
pub mod sim;

use nalgebra::{UnitQuaternion, Vector3};

use std::fmt::{self, Debug, Display};

/// Errors surfaced by the integrator to its immediate caller.
///
/// None of these are fatal to the process. A rejected sample never modifies the navigation state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrapdownError {
    /// The sample timestamp is equal to or earlier than the last accepted timestamp.
    #[error("non-increasing timestamp: previous {previous:.9} s, got {current:.9} s")]
    NonIncreasingTimestamp { previous: f64, current: f64 },
    /// NaN or infinity somewhere in the sample.
    #[error("sample at {timestamp} s contains non-finite values")]
    NonFiniteSample { timestamp: f64 },
    /// A reading is finite but far outside what a physical sensor can report.
    #[error("{quantity} magnitude {magnitude:.3} exceeds limit {limit:.3}")]
    SampleOutOfRange {
        quantity: &'static str,
        magnitude: f64,
        limit: f64,
    },
    /// The sample is finite but the step to it is not, e.g. `1e308 - (-1e308)`.
    #[error("step from {previous} s to {current} s is not a finite duration")]
    NonFiniteStep { previous: f64, current: f64 },
    /// Calibration constants that would make every later state meaningless.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    /// A navigation state handed to the integrator that it could not propagate from.
    #[error("invalid navigation state: {0}")]
    InvalidState(String),
}

/// A single timestamped IMU reading.
///
/// Both vectors are in the body frame of the sensor. The accelerometer reading is specific force and thus
/// includes the reaction to gravity (a stationary, level sensor reads about +g on its up axis).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuSample {
    /// Time of the reading in seconds
    pub timestamp: f64,
    /// Angular rate in rad/s, body frame x, y, z axis
    pub gyro: Vector3<f64>,
    /// Specific force in m/s^2, body frame x, y, z axis
    pub accel: Vector3<f64>,
}
impl ImuSample {
    pub fn new(timestamp: f64, gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        ImuSample {
            timestamp,
            gyro,
            accel,
        }
    }
    /// True when the timestamp and every vector component is finite.
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.gyro.iter().all(|x| x.is_finite())
            && self.accel.iter().all(|x| x.is_finite())
    }
}
impl Display for ImuSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImuSample {{ t: {:.6}, gyro: [{:.4}, {:.4}, {:.4}], accel: [{:.4}, {:.4}, {:.4}] }}",
            self.timestamp,
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.accel[0],
            self.accel[1],
            self.accel[2]
        )
    }
}
impl TryFrom<&[f64]> for ImuSample {
    type Error = &'static str;
    /// Builds a sample from `[t, gx, gy, gz, ax, ay, az]`, the column order of the text log.
    fn try_from(slice: &[f64]) -> Result<Self, Self::Error> {
        if slice.len() != 7 {
            return Err("ImuSample requires 7 values: timestamp, 3 gyro, 3 accel");
        }
        Ok(ImuSample::new(
            slice[0],
            Vector3::new(slice[1], slice[2], slice[3]),
            Vector3::new(slice[4], slice[5], slice[6]),
        ))
    }
}

/// Orientation, velocity, and position at a point in time.
///
/// `orientation` rotates body frame vectors into the world frame. `timestamp` is `None` until the
/// integrator has seen its first sample.
#[derive(Clone, Copy, PartialEq)]
pub struct NavState {
    /// Time at which this state is valid, `None` before the first sample
    pub timestamp: Option<f64>,
    /// Body to world rotation
    pub orientation: UnitQuaternion<f64>,
    /// World frame velocity in m/s
    pub velocity: Vector3<f64>,
    /// World frame position in m
    pub position: Vector3<f64>,
}
impl Default for NavState {
    fn default() -> Self {
        NavState {
            timestamp: None,
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            position: Vector3::zeros(),
        }
    }
}
impl NavState {
    /// State at rest at the origin with the given attitude and no timestamp baseline.
    pub fn with_orientation(orientation: UnitQuaternion<f64>) -> Self {
        NavState {
            orientation,
            ..NavState::default()
        }
    }
    /// Check that the state can seed an integrator.
    ///
    /// The timestamp (when set), velocity and position must be finite and the orientation must be a proper
    /// rotation to within `1e-6`.
    pub fn validate(&self) -> Result<(), StrapdownError> {
        if let Some(t) = self.timestamp
            && !t.is_finite()
        {
            return Err(StrapdownError::InvalidState(format!("timestamp {} is not finite", t)));
        }
        if !self.velocity.iter().chain(self.position.iter()).all(|x| x.is_finite()) {
            return Err(StrapdownError::InvalidState(
                "velocity and position must be finite".to_string(),
            ));
        }
        if !linalg::is_valid_rotation(&self.orientation, 1e-6) {
            return Err(StrapdownError::InvalidState(format!(
                "orientation is not a unit quaternion (norm {})",
                self.orientation.quaternion().norm()
            )));
        }
        Ok(())
    }
}
impl Debug for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (roll, pitch, yaw) = self.orientation.euler_angles();
        f.debug_struct("NavState")
            .field("timestamp (s)", &self.timestamp)
            .field(
                "position (m)",
                &format_args!(
                    "[{:.4}, {:.4}, {:.4}]",
                    self.position[0], self.position[1], self.position[2]
                ),
            )
            .field(
                "velocity (m/s)",
                &format_args!(
                    "[{:.4}, {:.4}, {:.4}]",
                    self.velocity[0], self.velocity[1], self.velocity[2]
                ),
            )
            .field(
                "attitude (roll, pitch, yaw in deg)",
                &format_args!(
                    "[{:.2}, {:.2}, {:.2}]",
                    roll.to_degrees(),
                    pitch.to_degrees(),
                    yaw.to_degrees()
                ),
            )
            .finish()
    }
}
impl Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.orientation.quaternion();
        match self.timestamp {
            Some(t) => write!(f, "NavState {{ t: {:.6} s", t)?,
            None => write!(f, "NavState {{ t: unset")?,
        }
        write!(
            f,
            ", p: [{:.3}, {:.3}, {:.3}] m, v: [{:.3}, {:.3}, {:.3}] m/s, q: [{:.4}, {:.4}, {:.4}, {:.4}] }}",
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            q.w,
            q.i,
            q.j,
            q.k
        )
    }
}
impl From<&NavState> for Vec<f64> {
    /// Flattens to `[px, py, pz, qw, qx, qy, qz, vx, vy, vz]`, the column order of the state record.
    fn from(state: &NavState) -> Self {
        let q = state.orientation.quaternion();
        vec![
            state.position[0],
            state.position[1],
            state.position[2],
            q.w,
            q.i,
            q.j,
            q.k,
            state.velocity[0],
            state.velocity[1],
            state.velocity[2],
        ]
    }
}
impl From<NavState> for Vec<f64> {
    fn from(state: NavState) -> Self {
        (&state).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_nav_state_default() {
        let state = NavState::default();
        assert_eq!(state.timestamp, None);
        assert_eq!(state.orientation, UnitQuaternion::identity());
        assert_eq!(state.velocity, Vector3::zeros());
        assert_eq!(state.position, Vector3::zeros());
    }
    #[test]
    fn test_nav_state_to_vec() {
        let state = NavState::default();
        let v: Vec<f64> = state.into();
        assert_eq!(v, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }
    #[test]
    fn test_nav_state_to_vec_order() {
        let mut state = NavState::with_orientation(UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5));
        state.position = Vector3::new(1.0, 2.0, 3.0);
        state.velocity = Vector3::new(4.0, 5.0, 6.0);
        let v: Vec<f64> = (&state).into();
        assert_eq!(v.len(), 10);
        assert_eq!(&v[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&v[7..10], &[4.0, 5.0, 6.0]);
        assert_approx_eq!(v[3], (0.25_f64).cos(), 1e-12);
        assert_approx_eq!(v[6], (0.25_f64).sin(), 1e-12);
    }
    #[test]
    fn test_imu_sample_try_from_slice() {
        let data = [1.5, 0.1, 0.2, 0.3, 1.0, 2.0, 9.8];
        let sample = ImuSample::try_from(&data[..]).unwrap();
        assert_eq!(sample.timestamp, 1.5);
        assert_eq!(sample.gyro, Vector3::new(0.1, 0.2, 0.3));
        assert_eq!(sample.accel, Vector3::new(1.0, 2.0, 9.8));
    }
    #[test]
    fn test_imu_sample_try_from_wrong_length() {
        let data = [1.5, 0.1, 0.2];
        assert!(ImuSample::try_from(&data[..]).is_err());
    }
    #[test]
    fn test_imu_sample_is_finite() {
        let mut sample = ImuSample::new(0.0, Vector3::zeros(), Vector3::zeros());
        assert!(sample.is_finite());
        sample.accel[1] = f64::NAN;
        assert!(!sample.is_finite());
        sample.accel[1] = 0.0;
        sample.timestamp = f64::INFINITY;
        assert!(!sample.is_finite());
    }
    #[test]
    fn test_imu_sample_display() {
        let sample = ImuSample::new(2.0, Vector3::new(0.1, 0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        let s = format!("{}", sample);
        assert!(s.contains("2.000000"));
        assert!(s.contains("0.1000"));
        assert!(s.contains("3.0000"));
    }
    #[test]
    fn test_nav_state_display_and_debug() {
        let mut state = NavState::default();
        assert!(format!("{}", state).contains("unset"));
        state.timestamp = Some(12.5);
        let display = format!("{}", state);
        assert!(display.contains("NavState"));
        assert!(display.contains("12.500000"));
        let debug = format!("{:?}", state);
        assert!(debug.contains("attitude"));
    }
    #[test]
    fn test_error_messages() {
        let err = StrapdownError::NonIncreasingTimestamp {
            previous: 2.0,
            current: 1.0,
        };
        assert!(err.to_string().contains("non-increasing"));
        let err = StrapdownError::InvalidCalibration("zero gravity".to_string());
        assert!(err.to_string().contains("zero gravity"));
    }
    #[test]
    fn test_nav_state_validate() {
        assert!(NavState::default().validate().is_ok());
        let mut state = NavState::with_orientation(UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3));
        state.timestamp = Some(4.0);
        assert!(state.validate().is_ok());

        let mut bad = state;
        bad.timestamp = Some(f64::NAN);
        assert!(matches!(bad.validate(), Err(StrapdownError::InvalidState(_))));
        let mut bad = state;
        bad.velocity[1] = f64::INFINITY;
        assert!(matches!(bad.validate(), Err(StrapdownError::InvalidState(_))));
        let mut bad = state;
        bad.position[2] = f64::NAN;
        assert!(bad.validate().is_err());
        let mut bad = state;
        bad.orientation = UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(2.0, 0.0, 0.0, 0.0));
        assert!(matches!(bad.validate(), Err(StrapdownError::InvalidState(_))));
    }
}
