//! Shared constants for the sortline workspace.

/// Number of joints on the six-axis arm.
pub const JOINT_COUNT: usize = 6;

/// Inspection poll period in milliseconds (~20 Hz sensor sampling).
pub const DEFAULT_POLL_PERIOD_MS: u64 = 50;

/// Acquisition frame period in milliseconds (~30 FPS).
pub const DEFAULT_FRAME_PERIOD_MS: u64 = 33;

/// Backoff after a missed frame in the acquisition loop.
pub const DEFAULT_FRAME_RETRY_MS: u64 = 100;

/// Hold after a sorting action before the processing guard clears.
/// Suppresses re-triggering on sensor bounce from the same part.
pub const DEFAULT_SETTLE_MS: u64 = 1000;

/// Bounded wait for a loop thread to observe its stop flag and exit.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 3000;

/// Default pass/defect confidence threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Single-servo gate angle for a passing part.
pub const SERVO_PASS_ANGLE: f64 = 45.0;

/// Single-servo gate angle for a defective part.
pub const SERVO_FAIL_ANGLE: f64 = 135.0;

/// Single-servo gate idle (centre) angle.
pub const SERVO_IDLE_ANGLE: f64 = 90.0;

/// Default I2C address of the PCA9685 servo driver.
pub const DEFAULT_SERVO_BUS_ADDRESS: u16 = 0x40;

/// Default PWM frequency for servo control, in Hz.
pub const DEFAULT_SERVO_BUS_FREQUENCY_HZ: u32 = 50;

// Default BCM pin map (matches the commissioned line wiring).

/// Conveyor motor driver line IN1.
pub const DEFAULT_MOTOR_IN1: u8 = 18;
/// Conveyor motor driver line IN2.
pub const DEFAULT_MOTOR_IN2: u8 = 19;
/// Conveyor motor driver line IN3.
pub const DEFAULT_MOTOR_IN3: u8 = 20;
/// Conveyor motor driver line IN4.
pub const DEFAULT_MOTOR_IN4: u8 = 21;
/// Conveyor motor PWM enable A.
pub const DEFAULT_MOTOR_ENA: u8 = 12;
/// Conveyor motor PWM enable B.
pub const DEFAULT_MOTOR_ENB: u8 = 13;
/// Break-beam sensor input.
pub const DEFAULT_SENSOR_PIN: u8 = 24;
/// Relay output.
pub const DEFAULT_RELAY_PIN: u8 = 25;
