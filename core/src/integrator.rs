//! Open-loop strapdown integrator
//!
//! [StrapdownIntegrator] owns a [NavState] and the fixed [Calibration] constants, and advances the state by
//! one step for every IMU sample handed to [StrapdownIntegrator::ingest]. The step is:
//!
//! 1. Bias correction: $\omega = \tilde\omega - b_g$, $f = \tilde f - b_a$
//! 2. World frame acceleration: $a = R(-) f + g$
//! 3. Position: $p(+) = p(-) + v(-) \Delta t + \frac{1}{2} a \Delta t^2$
//! 4. Velocity: $v(+) = v(-) + a \Delta t$
//! 5. Attitude: $R(+) = R(-) \operatorname{Exp}(\omega \Delta t)$, renormalized
//! 6. Timestamp: $t(+) = t_{sample}$
//!
//! Steps 2 through 4 use the attitude from before the step. The integrator performs no I/O and no heap
//! allocation.
//!
//! ## Sample acceptance
//!
//! The very first sample only sets the timestamp baseline. After that, a sample is rejected, leaving the
//! state exactly as it was, when:
//! - its timestamp is not strictly greater than the last accepted one
//!   ([StrapdownError::NonIncreasingTimestamp]),
//! - it contains NaN or infinity ([StrapdownError::NonFiniteSample]),
//! - a reading exceeds the configured [SensorLimits] ([StrapdownError::SampleOutOfRange]).
//!
//! A step whose duration overflows to infinity is rejected as well ([StrapdownError::NonFiniteStep]).
//!
//! A sample that arrives `max_dt` or more after the previous one is accepted but not integrated: the
//! state is held and the baseline re-anchored to the new timestamp ([IngestOutcome::GapSkipped]).
use log::{debug, trace, warn};
use nalgebra::{UnitQuaternion, Vector3};

use crate::config::{Calibration, IntegratorConfig, SensorLimits};
use crate::linalg::so3_exp;
use crate::{ImuSample, NavState, StrapdownError};

/// Which of the two integrator states a [StrapdownIntegrator] is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratorPhase {
    /// No sample has been accepted yet; there is no timestamp baseline.
    Uninitialized,
    /// A baseline exists and every accepted sample propagates the state.
    Tracking,
}

/// What an accepted sample did to the navigation state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IngestOutcome {
    /// First sample: only the timestamp baseline was recorded.
    Initialized,
    /// The state was propagated over `dt` seconds.
    Propagated { dt: f64 },
    /// The step reached `max_dt`; only the timestamp moved.
    GapSkipped { dt: f64 },
}

/// Strapdown integrator holding the current navigation state and the calibration constants.
#[derive(Clone, Debug)]
pub struct StrapdownIntegrator {
    state: NavState,
    calibration: Calibration,
    limits: SensorLimits,
    max_dt: Option<f64>,
}
impl StrapdownIntegrator {
    /// Integrator starting at rest at the origin with identity attitude.
    ///
    /// No gap threshold and no range limits are applied; use [StrapdownIntegrator::from_config] for those.
    ///
    /// # Errors
    /// [StrapdownError::InvalidCalibration] if the calibration constants are not usable.
    pub fn new(calibration: Calibration) -> Result<Self, StrapdownError> {
        Self::with_state(calibration, NavState::default())
    }
    /// Integrator starting from an explicit initial state.
    ///
    /// If `initial.timestamp` is set it acts as the baseline and the next sample is propagated against it.
    ///
    /// # Errors
    /// [StrapdownError::InvalidCalibration] for unusable constants, [StrapdownError::InvalidState] for a
    /// non-finite or non-rotation initial state.
    pub fn with_state(calibration: Calibration, initial: NavState) -> Result<Self, StrapdownError> {
        calibration.validate()?;
        initial.validate()?;
        Ok(StrapdownIntegrator {
            state: initial,
            calibration,
            limits: SensorLimits::unbounded(),
            max_dt: None,
        })
    }
    /// Integrator built from a loaded configuration, including gap threshold and sensor limits.
    pub fn from_config(config: &IntegratorConfig) -> Result<Self, StrapdownError> {
        if let Some(max_dt) = config.max_dt
            && !(max_dt.is_finite() && max_dt > 0.0)
        {
            return Err(StrapdownError::InvalidCalibration(format!(
                "max_dt must be a positive number of seconds, got {}",
                max_dt
            )));
        }
        config.limits.validate()?;
        let mut integrator = Self::new(Calibration::from(config))?;
        integrator.limits = config.limits;
        integrator.max_dt = config.max_dt;
        Ok(integrator)
    }
    /// Ingest one IMU sample and update the navigation state in place.
    ///
    /// # Errors
    /// Rejected samples return an error and leave the state untouched. See the module documentation.
    pub fn ingest(&mut self, sample: &ImuSample) -> Result<IngestOutcome, StrapdownError> {
        self.check_sample(sample)?;
        let Some(previous) = self.state.timestamp else {
            self.state.timestamp = Some(sample.timestamp);
            debug!("timestamp baseline set at {:.6} s", sample.timestamp);
            return Ok(IngestOutcome::Initialized);
        };
        let dt = sample.timestamp - previous;
        if !dt.is_finite() {
            return Err(StrapdownError::NonFiniteStep {
                previous,
                current: sample.timestamp,
            });
        }
        if dt <= 0.0 {
            debug!(
                "rejecting sample at {:.6} s, last accepted {:.6} s",
                sample.timestamp, previous
            );
            return Err(StrapdownError::NonIncreasingTimestamp {
                previous,
                current: sample.timestamp,
            });
        }
        if let Some(max_dt) = self.max_dt
            && dt >= max_dt
        {
            warn!(
                "{:.3} s gap before sample at {:.6} s reaches {:.3} s, holding state",
                dt, sample.timestamp, max_dt
            );
            self.state.timestamp = Some(sample.timestamp);
            return Ok(IngestOutcome::GapSkipped { dt });
        }
        self.propagate(sample, dt);
        trace!("{}", self.state);
        Ok(IngestOutcome::Propagated { dt })
    }
    /// [StrapdownIntegrator::ingest], then hand the updated state to `handler`.
    ///
    /// The handler runs exactly once per accepted sample and never for a rejected one. It receives a
    /// snapshot, so it can keep or forward the state without borrowing the integrator.
    pub fn ingest_with<F>(
        &mut self,
        sample: &ImuSample,
        mut handler: F,
    ) -> Result<IngestOutcome, StrapdownError>
    where
        F: FnMut(&NavState),
    {
        let outcome = self.ingest(sample)?;
        let snapshot = self.state;
        handler(&snapshot);
        Ok(outcome)
    }
    /// Replace the navigation state, keeping the calibration.
    ///
    /// An invalid state is refused and the current one kept.
    pub fn reset(&mut self, state: NavState) -> Result<(), StrapdownError> {
        state.validate()?;
        self.state = state;
        Ok(())
    }
    /// Current navigation state (copy).
    pub fn state(&self) -> NavState {
        self.state
    }
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.state.orientation
    }
    pub fn velocity(&self) -> Vector3<f64> {
        self.state.velocity
    }
    pub fn position(&self) -> Vector3<f64> {
        self.state.position
    }
    pub fn timestamp(&self) -> Option<f64> {
        self.state.timestamp
    }
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
    pub fn phase(&self) -> IntegratorPhase {
        match self.state.timestamp {
            None => IntegratorPhase::Uninitialized,
            Some(_) => IntegratorPhase::Tracking,
        }
    }

    fn check_sample(&self, sample: &ImuSample) -> Result<(), StrapdownError> {
        if !sample.is_finite() {
            debug!("rejecting non-finite sample: {}", sample);
            return Err(StrapdownError::NonFiniteSample {
                timestamp: sample.timestamp,
            });
        }
        let rate = sample.gyro.norm();
        if rate > self.limits.max_angular_rate {
            return Err(StrapdownError::SampleOutOfRange {
                quantity: "angular rate",
                magnitude: rate,
                limit: self.limits.max_angular_rate,
            });
        }
        let force = sample.accel.norm();
        if force > self.limits.max_specific_force {
            return Err(StrapdownError::SampleOutOfRange {
                quantity: "specific force",
                magnitude: force,
                limit: self.limits.max_specific_force,
            });
        }
        Ok(())
    }
    fn propagate(&mut self, sample: &ImuSample, dt: f64) {
        let calibration = &self.calibration;
        let omega = sample.gyro - calibration.gyro_bias;
        let specific_force = sample.accel - calibration.accel_bias;
        let r_0 = self.state.orientation;
        let v_0 = self.state.velocity;
        // Rotating specific force into the world frame leaves the +g reaction; adding the (downward)
        // gravity vector cancels it.
        let acceleration = r_0 * specific_force + calibration.gravity;
        self.state.position += v_0 * dt + 0.5 * acceleration * dt * dt;
        self.state.velocity = v_0 + acceleration * dt;
        let mut r_1 = r_0 * so3_exp(&(omega * dt));
        r_1.renormalize();
        self.state.orientation = r_1;
        self.state.timestamp = Some(sample.timestamp);
    }
}
