//! Calibration constants and sample acceptance limits.
//!
//! The integrator does not estimate anything about the sensor. Gravity and both biases are known up front,
//! either from a calibration run or from a configuration file, and are fixed for the lifetime of an
//! integrator. [IntegratorConfig] is the serializable form of those constants plus the tunables that govern
//! which samples are accepted; [Calibration] is the validated, `nalgebra`-typed form the integrator holds.
//!
//! Configuration files can be JSON, YAML, or TOML, dispatched on file extension:
//!
//! ```toml
//! gravity = [0.0, 0.0, -9.8]
//! gyro_bias = [0.000224886, -7.61038e-05, -0.000742259]
//! accel_bias = [-0.165205, 0.0926887, 0.0058049]
//! max_dt = 0.1
//!
//! [limits]
//! max_angular_rate = 35.0
//! max_specific_force = 160.0
//! ```
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::StrapdownError;

/// Gravity used when none is configured, world frame z-up (m/s^2).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, 0.0, -9.8];
/// Gyroscope bias of the default MEMS data set (rad/s).
pub const DEFAULT_GYRO_BIAS: [f64; 3] = [0.000224886, -7.61038e-05, -0.000742259];
/// Accelerometer bias of the default MEMS data set (m/s^2).
pub const DEFAULT_ACCEL_BIAS: [f64; 3] = [-0.165205, 0.0926887, 0.0058049];
/// Largest sample spacing that is still integrated (s). Larger steps are treated as a data gap.
pub const DEFAULT_MAX_DT: f64 = 0.1;
/// Gravity norms below this are treated as "unset" (m/s^2).
const MIN_GRAVITY_NORM: f64 = 1e-3;

fn default_gravity() -> [f64; 3] {
    DEFAULT_GRAVITY
}
fn default_gyro_bias() -> [f64; 3] {
    DEFAULT_GYRO_BIAS
}
fn default_accel_bias() -> [f64; 3] {
    DEFAULT_ACCEL_BIAS
}
fn default_max_dt() -> Option<f64> {
    Some(DEFAULT_MAX_DT)
}

/// Validated calibration constants held by the integrator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// Gravity vector in the world frame, pointing down (m/s^2)
    pub gravity: Vector3<f64>,
    /// Gyroscope bias in the body frame (rad/s)
    pub gyro_bias: Vector3<f64>,
    /// Accelerometer bias in the body frame (m/s^2)
    pub accel_bias: Vector3<f64>,
}
impl Calibration {
    pub fn new(gravity: Vector3<f64>, gyro_bias: Vector3<f64>, accel_bias: Vector3<f64>) -> Self {
        Calibration {
            gravity,
            gyro_bias,
            accel_bias,
        }
    }
    /// Check the constants before any sample is integrated.
    ///
    /// A missing (zero) gravity vector would leave the accelerometer's gravity reaction uncompensated and
    /// show up as a constant ~1 g climb, so it is refused here rather than discovered during ingestion.
    pub fn validate(&self) -> Result<(), StrapdownError> {
        let all_finite = self
            .gravity
            .iter()
            .chain(self.gyro_bias.iter())
            .chain(self.accel_bias.iter())
            .all(|x| x.is_finite());
        if !all_finite {
            return Err(StrapdownError::InvalidCalibration(
                "gravity and biases must be finite".to_string(),
            ));
        }
        if self.gravity.norm() < MIN_GRAVITY_NORM {
            return Err(StrapdownError::InvalidCalibration(format!(
                "gravity vector norm {:.3e} m/s^2 is effectively zero",
                self.gravity.norm()
            )));
        }
        Ok(())
    }
}
impl Default for Calibration {
    fn default() -> Self {
        Calibration::from(&IntegratorConfig::default())
    }
}
impl From<&IntegratorConfig> for Calibration {
    fn from(config: &IntegratorConfig) -> Self {
        Calibration {
            gravity: Vector3::from(config.gravity),
            gyro_bias: Vector3::from(config.gyro_bias),
            accel_bias: Vector3::from(config.accel_bias),
        }
    }
}

/// Magnitudes beyond which a reading is considered physically implausible.
///
/// Defaults cover a ±2000 deg/s gyro and a ±16 g accelerometer, the widest ranges common on MEMS parts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorLimits {
    /// Largest accepted angular rate norm (rad/s)
    pub max_angular_rate: f64,
    /// Largest accepted specific force norm (m/s^2)
    pub max_specific_force: f64,
}
impl Default for SensorLimits {
    fn default() -> Self {
        SensorLimits {
            max_angular_rate: 35.0,
            max_specific_force: 160.0,
        }
    }
}
impl SensorLimits {
    /// Limits that accept every finite reading.
    pub fn unbounded() -> Self {
        SensorLimits {
            max_angular_rate: f64::MAX,
            max_specific_force: f64::MAX,
        }
    }
    /// Both limits must be positive. `+inf` is allowed and disables the check; NaN is not.
    pub fn validate(&self) -> Result<(), StrapdownError> {
        for (name, limit) in [
            ("max_angular_rate", self.max_angular_rate),
            ("max_specific_force", self.max_specific_force),
        ] {
            if limit.is_nan() || limit <= 0.0 {
                return Err(StrapdownError::InvalidCalibration(format!(
                    "{} must be positive, got {}",
                    name, limit
                )));
            }
        }
        Ok(())
    }
}

/// Serializable integrator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Gravity vector in the world frame (m/s^2)
    #[serde(default = "default_gravity")]
    pub gravity: [f64; 3],
    /// Gyroscope bias in the body frame (rad/s)
    #[serde(default = "default_gyro_bias")]
    pub gyro_bias: [f64; 3],
    /// Accelerometer bias in the body frame (m/s^2)
    #[serde(default = "default_accel_bias")]
    pub accel_bias: [f64; 3],
    /// Largest sample spacing that is integrated; `None` integrates any positive step.
    #[serde(default = "default_max_dt")]
    pub max_dt: Option<f64>,
    /// Plausibility limits for raw readings.
    #[serde(default)]
    pub limits: SensorLimits,
}
impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig {
            gravity: DEFAULT_GRAVITY,
            gyro_bias: DEFAULT_GYRO_BIAS,
            accel_bias: DEFAULT_ACCEL_BIAS,
            max_dt: default_max_dt(),
            limits: SensorLimits::default(),
        }
    }
}
impl IntegratorConfig {
    /// Configuration with zero biases and no gap or range limits. Useful for synthetic data.
    pub fn ideal(gravity: [f64; 3]) -> Self {
        IntegratorConfig {
            gravity,
            gyro_bias: [0.0; 3],
            accel_bias: [0.0; 3],
            max_dt: None,
            limits: SensorLimits::unbounded(),
        }
    }
    /// Serialize to text in the given format.
    pub fn to_string_as(&self, format: ConfigFormat) -> io::Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(io::Error::other),
            ConfigFormat::Toml => toml::to_string(self).map_err(io::Error::other),
        }
    }
    /// Parse text in the given format. Missing fields take their defaults.
    pub fn from_str_as(text: &str, format: ConfigFormat) -> io::Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(text).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(io::Error::other),
            ConfigFormat::Toml => toml::from_str(text).map_err(io::Error::other),
        }
    }
    /// Write the configuration, choosing the format from the file extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let text = self.to_string_as(ConfigFormat::from_path(path)?)?;
        fs::write(path, text)
    }
    /// Read a configuration written by [IntegratorConfig::to_file] or by hand.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        Self::from_str_as(&fs::read_to_string(path)?, format)
    }
}

/// On-disk configuration formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}
impl ConfigFormat {
    /// `.json`, `.yaml`/`.yml` or `.toml`, case insensitive.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "unsupported configuration extension {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_cfg() -> IntegratorConfig {
        IntegratorConfig {
            gravity: [0.0, 0.0, -9.81],
            gyro_bias: [1e-4, -2e-4, 3e-4],
            accel_bias: [0.01, 0.02, -0.03],
            max_dt: Some(0.05),
            limits: SensorLimits {
                max_angular_rate: 10.0,
                max_specific_force: 80.0,
            },
        }
    }

    #[test]
    fn roundtrip_every_format() {
        let cfg = sample_cfg();
        for format in [ConfigFormat::Json, ConfigFormat::Yaml, ConfigFormat::Toml] {
            let text = cfg.to_string_as(format).unwrap();
            let loaded = IntegratorConfig::from_str_as(&text, format).unwrap();
            assert_eq!(cfg, loaded, "{:?}", format);
        }
    }
    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/cal.JSON")).unwrap(), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("cal.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("cal.toml")).unwrap(), ConfigFormat::Toml);
        assert!(ConfigFormat::from_path(Path::new("cal")).is_err());
    }
    #[test]
    fn generic_dispatch_roundtrip() {
        let cfg = IntegratorConfig::default();
        for ext in ["json", "yaml", "yml", "toml"] {
            let f = NamedTempFile::new().unwrap();
            let path = f.path().with_extension(ext);
            cfg.to_file(&path).unwrap();
            let loaded = IntegratorConfig::from_file(&path).unwrap();
            assert_eq!(cfg, loaded, "round trip through .{}", ext);
        }
    }
    #[test]
    fn unsupported_extension_error() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("txt");
        let result = cfg.to_file(&path);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
        let result = IntegratorConfig::from_file(&path);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
    }
    #[test]
    fn missing_fields_use_defaults() {
        let cfg: IntegratorConfig = toml::from_str("gravity = [0.0, 0.0, -9.81]\n").unwrap();
        assert_eq!(cfg.gravity, [0.0, 0.0, -9.81]);
        assert_eq!(cfg.gyro_bias, DEFAULT_GYRO_BIAS);
        assert_eq!(cfg.accel_bias, DEFAULT_ACCEL_BIAS);
        assert_eq!(cfg.max_dt, Some(DEFAULT_MAX_DT));
        assert_eq!(cfg.limits, SensorLimits::default());
    }
    #[test]
    fn calibration_from_config() {
        let cal = Calibration::from(&sample_cfg());
        assert_eq!(cal.gravity, Vector3::new(0.0, 0.0, -9.81));
        assert_eq!(cal.accel_bias, Vector3::new(0.01, 0.02, -0.03));
        assert!(cal.validate().is_ok());
    }
    #[test]
    fn zero_gravity_is_rejected() {
        let cal = Calibration::new(Vector3::zeros(), Vector3::zeros(), Vector3::zeros());
        assert!(matches!(
            cal.validate(),
            Err(StrapdownError::InvalidCalibration(_))
        ));
    }
    #[test]
    fn non_finite_bias_is_rejected() {
        let cal = Calibration::new(
            Vector3::new(0.0, 0.0, -9.8),
            Vector3::new(f64::NAN, 0.0, 0.0),
            Vector3::zeros(),
        );
        assert!(cal.validate().is_err());
    }
}
