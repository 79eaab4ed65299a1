//! Arm positions, joint configuration and the waypoint table.

use crate::consts::JOINT_COUNT;
use crate::hal::driver::HalError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Error types for motion operations.
#[derive(Debug, Clone, Error)]
pub enum MotionError {
    /// Joint index outside 0..JOINT_COUNT
    #[error("unknown joint index {0}")]
    UnknownJoint(usize),

    /// Named waypoint missing from the table
    #[error("unknown waypoint '{0}'")]
    UnknownWaypoint(String),

    /// Servo bus command failed
    #[error("servo bus error: {0}")]
    Bus(#[from] HalError),

    /// Move interrupted by an emergency stop
    #[error("motion interrupted by emergency stop")]
    Interrupted,

    /// A sequence or calibration run is already in flight
    #[error("actuator busy: a sequence is already running")]
    Busy,

    /// Waypoint file could not be read or written
    #[error("waypoint persistence error: {0}")]
    Persistence(String),
}

/// An arm pose: one angle per joint, in degrees.
///
/// Immutable value type — a new `Position` replaces the current one
/// rather than mutating it. Serializes as a flat 6-element array,
/// which is also the on-disk waypoint format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub [f64; JOINT_COUNT]);

impl Position {
    /// All joints at zero degrees.
    pub const fn zero() -> Self {
        Self([0.0; JOINT_COUNT])
    }

    /// Build from per-joint angles.
    pub const fn new(angles: [f64; JOINT_COUNT]) -> Self {
        Self(angles)
    }

    /// Angle of a single joint, if the index is valid.
    pub fn angle(&self, joint: usize) -> Option<f64> {
        self.0.get(joint).copied()
    }

    /// Per-joint angles as an array.
    pub const fn angles(&self) -> [f64; JOINT_COUNT] {
        self.0
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::zero()
    }
}

/// Configuration of a single continuous-rotation joint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointConfig {
    /// PWM channel on the servo driver chip (0..=5).
    pub channel: u8,
    /// Minimum reachable angle in degrees.
    pub min_angle: f64,
    /// Maximum reachable angle in degrees.
    pub max_angle: f64,
    /// Commissioning home angle in degrees.
    pub home_angle: f64,
    /// Drive scaling applied to the normalized throttle. Must be > 0.
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
    /// Human-readable joint name.
    #[serde(default)]
    pub name: String,
}

fn default_speed_factor() -> f64 {
    1.0
}

/// The commissioned six-joint MG996R arm layout.
pub fn default_joints() -> Vec<JointConfig> {
    let joint = |channel, min_angle, max_angle, home_angle, speed_factor, name: &str| JointConfig {
        channel,
        min_angle,
        max_angle,
        home_angle,
        speed_factor,
        name: name.to_string(),
    };
    vec![
        joint(0, -180.0, 180.0, 0.0, 1.0, "base_rotation"),
        joint(1, -90.0, 90.0, 0.0, 0.8, "shoulder_pitch"),
        joint(2, -120.0, 120.0, -90.0, 0.8, "elbow_bend"),
        joint(3, -90.0, 90.0, 0.0, 1.2, "wrist_pitch"),
        joint(4, -180.0, 180.0, 0.0, 1.5, "wrist_roll"),
        joint(5, -45.0, 45.0, 0.0, 2.0, "gripper"),
    ]
}

/// Named waypoint positions, runtime-mutable and persistable.
///
/// The on-disk format is a JSON object mapping name to a flat array of
/// six angles. Entries that are not arrays of at least six numbers are
/// ignored on load; saving rewrites the whole file from the in-memory
/// table.
#[derive(Debug, Clone, Default)]
pub struct WaypointTable {
    positions: HashMap<String, Position>,
}

impl WaypointTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in pick-and-place waypoint set.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        let entries: [(&str, [f64; JOINT_COUNT]); 10] = [
            ("home", [0.0, 0.0, -90.0, 0.0, 0.0, 0.0]),
            ("pickup_ready", [0.0, -45.0, -45.0, -45.0, 0.0, 30.0]),
            ("pickup_down", [0.0, -60.0, -30.0, -60.0, 0.0, 30.0]),
            ("pickup_grab", [0.0, -60.0, -30.0, -60.0, 0.0, -30.0]),
            ("transfer_up", [0.0, -30.0, -60.0, -30.0, 0.0, -30.0]),
            ("pass_drop", [90.0, -45.0, -45.0, -45.0, 0.0, -30.0]),
            ("pass_release", [90.0, -45.0, -45.0, -45.0, 0.0, 30.0]),
            ("fail_drop", [-90.0, -45.0, -45.0, -45.0, 0.0, -30.0]),
            ("fail_release", [-90.0, -45.0, -45.0, -45.0, 0.0, 30.0]),
            ("standby", [0.0, -20.0, -70.0, -20.0, 0.0, 0.0]),
        ];
        for (name, angles) in entries {
            table.set(name, Position::new(angles));
        }
        table
    }

    /// Look up a waypoint by name.
    pub fn get(&self, name: &str) -> Option<Position> {
        self.positions.get(name).copied()
    }

    /// Save or overwrite a named waypoint.
    pub fn set(&mut self, name: &str, position: Position) {
        self.positions.insert(name.to_string(), position);
    }

    /// Number of stored waypoints.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Names of all stored waypoints.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// Merge waypoints from a JSON file into the table.
    ///
    /// Existing names are overwritten; malformed entries are skipped
    /// with a warning. A missing file is not an error (the built-in
    /// defaults remain in effect).
    pub fn load_file(&mut self, path: &Path) -> Result<(), MotionError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("waypoint file {} not found, keeping defaults", path.display());
                return Ok(());
            }
            Err(e) => return Err(MotionError::Persistence(e.to_string())),
        };

        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| MotionError::Persistence(e.to_string()))?;

        for (name, value) in raw {
            match parse_waypoint(&value) {
                Some(position) => {
                    self.positions.insert(name, position);
                }
                None => {
                    warn!("ignoring malformed waypoint '{name}' in {}", path.display());
                }
            }
        }
        Ok(())
    }

    /// Write the whole table to a JSON file, overwriting it.
    pub fn save_file(&self, path: &Path) -> Result<(), MotionError> {
        let raw: HashMap<&str, [f64; JOINT_COUNT]> = self
            .positions
            .iter()
            .map(|(name, position)| (name.as_str(), position.angles()))
            .collect();
        let content = serde_json::to_string_pretty(&raw)
            .map_err(|e| MotionError::Persistence(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| MotionError::Persistence(e.to_string()))
    }
}

/// A waypoint entry must be an array of at least six numbers; extra
/// elements are ignored.
fn parse_waypoint(value: &serde_json::Value) -> Option<Position> {
    let list = value.as_array()?;
    if list.len() < JOINT_COUNT {
        return None;
    }
    let mut angles = [0.0; JOINT_COUNT];
    for (slot, item) in angles.iter_mut().zip(list.iter()) {
        *slot = item.as_f64()?;
    }
    Some(Position::new(angles))
}
