//! Station configuration loading and validation.
//!
//! The station is configured by a single `station.toml`. Execution
//! mode (hardware vs. simulation) and actuator kind (six-axis arm vs.
//! single-servo gate) are resolved here exactly once at startup; they
//! must not change while the loops are running.

use crate::consts::{
    DEFAULT_FRAME_PERIOD_MS, DEFAULT_FRAME_RETRY_MS, DEFAULT_MOTOR_ENA, DEFAULT_MOTOR_ENB,
    DEFAULT_MOTOR_IN1, DEFAULT_MOTOR_IN2, DEFAULT_MOTOR_IN3, DEFAULT_MOTOR_IN4,
    DEFAULT_POLL_PERIOD_MS, DEFAULT_RELAY_PIN, DEFAULT_SENSOR_PIN, DEFAULT_SERVO_BUS_ADDRESS,
    DEFAULT_SERVO_BUS_FREQUENCY_HZ, DEFAULT_SETTLE_MS, DEFAULT_STOP_TIMEOUT_MS, DEFAULT_THRESHOLD,
    JOINT_COUNT,
};
use crate::motion::{JointConfig, default_joints};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Execution mode, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Simulated sensor, camera and servo bus; no devices required.
    #[default]
    Simulation,
    /// GPIO sensor/conveyor/relay, V4L camera, I2C servo bus.
    Hardware,
}

/// Which sorting actuator is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    /// Six-axis pick-and-place arm.
    #[default]
    Arm,
    /// Single positional servo gate.
    Servo,
}

/// `[station]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationSection {
    /// Hardware or simulation, fixed for the process lifetime.
    #[serde(default)]
    pub mode: BackendMode,
    /// Installed actuator kind.
    #[serde(default)]
    pub actuator: ActuatorKind,
    /// Optional waypoint file merged over the built-in table at startup.
    #[serde(default)]
    pub waypoint_file: Option<PathBuf>,
}

/// `[pins]` section — BCM pin numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    /// Conveyor motor driver IN1.
    #[serde(default = "default_motor_in1")]
    pub motor_in1: u8,
    /// Conveyor motor driver IN2.
    #[serde(default = "default_motor_in2")]
    pub motor_in2: u8,
    /// Conveyor motor driver IN3.
    #[serde(default = "default_motor_in3")]
    pub motor_in3: u8,
    /// Conveyor motor driver IN4.
    #[serde(default = "default_motor_in4")]
    pub motor_in4: u8,
    /// PWM enable A.
    #[serde(default = "default_motor_ena")]
    pub motor_ena: u8,
    /// PWM enable B.
    #[serde(default = "default_motor_enb")]
    pub motor_enb: u8,
    /// Break-beam sensor input.
    #[serde(default = "default_sensor_pin")]
    pub sensor: u8,
    /// Relay output.
    #[serde(default = "default_relay_pin")]
    pub relay: u8,
}

fn default_motor_in1() -> u8 {
    DEFAULT_MOTOR_IN1
}
fn default_motor_in2() -> u8 {
    DEFAULT_MOTOR_IN2
}
fn default_motor_in3() -> u8 {
    DEFAULT_MOTOR_IN3
}
fn default_motor_in4() -> u8 {
    DEFAULT_MOTOR_IN4
}
fn default_motor_ena() -> u8 {
    DEFAULT_MOTOR_ENA
}
fn default_motor_enb() -> u8 {
    DEFAULT_MOTOR_ENB
}
fn default_sensor_pin() -> u8 {
    DEFAULT_SENSOR_PIN
}
fn default_relay_pin() -> u8 {
    DEFAULT_RELAY_PIN
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            motor_in1: DEFAULT_MOTOR_IN1,
            motor_in2: DEFAULT_MOTOR_IN2,
            motor_in3: DEFAULT_MOTOR_IN3,
            motor_in4: DEFAULT_MOTOR_IN4,
            motor_ena: DEFAULT_MOTOR_ENA,
            motor_enb: DEFAULT_MOTOR_ENB,
            sensor: DEFAULT_SENSOR_PIN,
            relay: DEFAULT_RELAY_PIN,
        }
    }
}

/// `[servo_bus]` section — the PCA9685 servo driver chip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoBusConfig {
    /// I2C bus index (`/dev/i2c-<n>`).
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    /// I2C slave address.
    #[serde(default = "default_bus_address")]
    pub address: u16,
    /// PWM frequency in Hz.
    #[serde(default = "default_bus_frequency")]
    pub frequency_hz: u32,
    /// Channel of the single-servo gate (servo actuator only).
    #[serde(default)]
    pub gate_channel: u8,
}

fn default_i2c_bus() -> u8 {
    1
}
fn default_bus_address() -> u16 {
    DEFAULT_SERVO_BUS_ADDRESS
}
fn default_bus_frequency() -> u32 {
    DEFAULT_SERVO_BUS_FREQUENCY_HZ
}

impl Default for ServoBusConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            address: DEFAULT_SERVO_BUS_ADDRESS,
            frequency_hz: DEFAULT_SERVO_BUS_FREQUENCY_HZ,
            gate_channel: 0,
        }
    }
}

/// `[camera]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Capture device node.
    #[serde(default = "default_camera_device")]
    pub device: PathBuf,
    /// Frame width in pixels.
    #[serde(default = "default_camera_width")]
    pub width: u32,
    /// Frame height in pixels.
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

fn default_camera_device() -> PathBuf {
    PathBuf::from("/dev/video0")
}
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

/// `[timing]` section — loop periods and shutdown bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Inspection poll period in milliseconds.
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
    /// Guard hold after a sorting action, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Acquisition frame period in milliseconds.
    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,
    /// Backoff after a missed frame, in milliseconds.
    #[serde(default = "default_frame_retry_ms")]
    pub frame_retry_ms: u64,
    /// Bounded wait for loop threads to stop, in milliseconds.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_poll_period_ms() -> u64 {
    DEFAULT_POLL_PERIOD_MS
}
fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}
fn default_frame_period_ms() -> u64 {
    DEFAULT_FRAME_PERIOD_MS
}
fn default_frame_retry_ms() -> u64 {
    DEFAULT_FRAME_RETRY_MS
}
fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            frame_period_ms: DEFAULT_FRAME_PERIOD_MS,
            frame_retry_ms: DEFAULT_FRAME_RETRY_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

/// `[detection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Initial pass/defect confidence threshold.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// `[sequence]` section — per-step motion durations in seconds.
///
/// Grab and release are short settle moves; transfers are longer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SequenceTimings {
    /// Move to `pickup_ready`.
    #[serde(default = "default_approach_s")]
    pub approach_s: f64,
    /// Descend to `pickup_down`.
    #[serde(default = "default_descend_s")]
    pub descend_s: f64,
    /// Close the gripper (`pickup_grab`).
    #[serde(default = "default_grab_s")]
    pub grab_s: f64,
    /// Lift to `transfer_up`.
    #[serde(default = "default_lift_s")]
    pub lift_s: f64,
    /// Swing to `{target}_drop`.
    #[serde(default = "default_transfer_s")]
    pub transfer_s: f64,
    /// Open the gripper (`{target}_release`).
    #[serde(default = "default_release_s")]
    pub release_s: f64,
    /// Return to `standby`.
    #[serde(default = "default_park_s")]
    pub park_s: f64,
    /// Hold at the gate position before recentring (servo actuator).
    #[serde(default = "default_gate_settle_s")]
    pub gate_settle_s: f64,
    /// Settle between calibration moves.
    #[serde(default = "default_calibration_settle_s")]
    pub calibration_settle_s: f64,
}

fn default_approach_s() -> f64 {
    1.5
}
fn default_descend_s() -> f64 {
    1.0
}
fn default_grab_s() -> f64 {
    0.5
}
fn default_lift_s() -> f64 {
    1.0
}
fn default_transfer_s() -> f64 {
    1.5
}
fn default_release_s() -> f64 {
    0.5
}
fn default_park_s() -> f64 {
    1.5
}
fn default_gate_settle_s() -> f64 {
    0.5
}
fn default_calibration_settle_s() -> f64 {
    1.0
}

impl Default for SequenceTimings {
    fn default() -> Self {
        Self {
            approach_s: default_approach_s(),
            descend_s: default_descend_s(),
            grab_s: default_grab_s(),
            lift_s: default_lift_s(),
            transfer_s: default_transfer_s(),
            release_s: default_release_s(),
            park_s: default_park_s(),
            gate_settle_s: default_gate_settle_s(),
            calibration_settle_s: default_calibration_settle_s(),
        }
    }
}

/// Main configuration loaded from `station.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Mode and actuator selection.
    #[serde(default)]
    pub station: StationSection,
    /// BCM pin map.
    #[serde(default)]
    pub pins: PinConfig,
    /// Servo driver chip settings.
    #[serde(default)]
    pub servo_bus: ServoBusConfig,
    /// Camera capture settings.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Loop periods and shutdown bounds.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Detection threshold.
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Per-joint arm configuration. Defaults to the commissioned
    /// six-joint MG996R layout when omitted.
    #[serde(default = "default_joints")]
    pub joints: Vec<JointConfig>,
    /// Sorting sequence step durations.
    #[serde(default)]
    pub sequence: SequenceTimings,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station: StationSection::default(),
            pins: PinConfig::default(),
            servo_bus: ServoBusConfig::default(),
            camera: CameraConfig::default(),
            timing: TimingConfig::default(),
            detection: DetectionConfig::default(),
            joints: default_joints(),
            sequence: SequenceTimings::default(),
        }
    }
}

impl StationConfig {
    /// Validate the station configuration.
    ///
    /// # Validation Rules
    /// 1. `detection.threshold` within `0.0..=1.0`
    /// 2. `timing.poll_period_ms` and `timing.frame_period_ms` > 0
    /// 3. Exactly [`JOINT_COUNT`] joints for the arm actuator
    /// 4. Joint channels unique, `min_angle < max_angle`,
    ///    `speed_factor > 0` for every joint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection.threshold) {
            return Err(ConfigError::ValidationError(format!(
                "detection.threshold must be within 0.0..=1.0, got {}",
                self.detection.threshold
            )));
        }

        if self.timing.poll_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.poll_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.timing.frame_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.frame_period_ms must be greater than 0".to_string(),
            ));
        }

        if self.station.actuator == ActuatorKind::Arm && self.joints.len() != JOINT_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "arm actuator requires exactly {JOINT_COUNT} joints, got {}",
                self.joints.len()
            )));
        }

        let mut channels = HashSet::new();
        for joint in &self.joints {
            if !channels.insert(joint.channel) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate servo channel {} in joint table",
                    joint.channel
                )));
            }
            if joint.min_angle >= joint.max_angle {
                return Err(ConfigError::ValidationError(format!(
                    "joint '{}': min_angle {} must be below max_angle {}",
                    joint.name, joint.min_angle, joint.max_angle
                )));
            }
            if joint.speed_factor <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "joint '{}': speed_factor must be positive",
                    joint.name
                )));
            }
        }

        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_toml_yields_working_defaults() {
        let config: StationConfig = toml::from_str("").unwrap();
        assert_eq!(config.station.mode, BackendMode::Simulation);
        assert_eq!(config.station.actuator, ActuatorKind::Arm);
        assert_eq!(config.joints.len(), JOINT_COUNT);
        assert_eq!(config.detection.threshold, DEFAULT_THRESHOLD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mode_and_actuator_parse_lowercase() {
        let config: StationConfig = toml::from_str(
            r#"
            [station]
            mode = "hardware"
            actuator = "servo"
            "#,
        )
        .unwrap();
        assert_eq!(config.station.mode, BackendMode::Hardware);
        assert_eq!(config.station.actuator, ActuatorKind::Servo);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = StationConfig::default();
        config.detection.threshold = 1.2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_poll_period() {
        let mut config = StationConfig::default();
        config.timing.poll_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_channels() {
        let mut config = StationConfig::default();
        config.joints[1].channel = config.joints[0].channel;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_joint_range() {
        let mut config = StationConfig::default();
        config.joints[2].min_angle = 120.0;
        config.joints[2].max_angle = -120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_wrong_joint_count_for_arm() {
        let mut config = StationConfig::default();
        config.joints.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn servo_actuator_tolerates_partial_joint_table() {
        let mut config = StationConfig::default();
        config.station.actuator = ActuatorKind::Servo;
        config.joints.pop();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loader_file_not_found() {
        let result = StationConfig::load(Path::new("/nonexistent/station.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();
        let result = StationConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn loader_full_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [station]
            mode = "simulation"
            actuator = "arm"
            waypoint_file = "waypoints.json"

            [timing]
            poll_period_ms = 20
            settle_ms = 200

            [detection]
            threshold = 0.9
            "#
        )
        .unwrap();
        file.flush().unwrap();

        let config = StationConfig::load(file.path()).unwrap();
        assert_eq!(config.timing.poll_period_ms, 20);
        assert_eq!(config.timing.settle_ms, 200);
        assert_eq!(config.detection.threshold, 0.9);
        assert_eq!(
            config.station.waypoint_file,
            Some(PathBuf::from("waypoints.json"))
        );
        assert!(config.validate().is_ok());
    }
}
