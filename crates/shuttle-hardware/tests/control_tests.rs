//! Device Control Integration Tests
//!
//! Exercises the synchronous wrappers with simulated devices:
//! - A newer command preempts an in-flight one
//! - Concurrent moves inside a fail-fast scope
//! - Configuration files on disk
//!
//! # Running Tests
//! ```bash
//! cargo test --test control_tests
//! ```

use parking_lot::Mutex as ParkingLotMutex;
use shuttle_core::context::{self, Interrupted};
use shuttle_core::time::{Duration, Instant};
use shuttle_core::{HardwareTaskScope, ScopeError, TaskError};
use shuttle_hardware::{
    ConfigError, ControlError, HardwareConfig, LinearActuator, LinearMotorControl, Servo,
    ServoConfig, ServoControl,
};
use std::io::Write;
use std::sync::Arc;

/// Moves at a fixed speed toward its target in simulated time
struct SimulatedSlide {
    speed_m_per_s: f64,
    state: ParkingLotMutex<SlideState>,
}

struct SlideState {
    origin: f64,
    target: f64,
    commanded_at: Instant,
    commands: Vec<f64>,
}

impl SimulatedSlide {
    fn new(speed_m_per_s: f64) -> Self {
        Self {
            speed_m_per_s,
            state: ParkingLotMutex::new(SlideState {
                origin: 0.0,
                target: 0.0,
                commanded_at: Instant::now(),
                commands: Vec::new(),
            }),
        }
    }

    fn position_of(&self, state: &SlideState) -> f64 {
        let travelled = Instant::now().since(state.commanded_at).to_seconds() * self.speed_m_per_s;
        let distance = state.target - state.origin;
        if travelled >= distance.abs() {
            state.target
        } else {
            state.origin + travelled * distance.signum()
        }
    }

    fn commands(&self) -> Vec<f64> {
        self.state.lock().commands.clone()
    }
}

impl LinearActuator for SimulatedSlide {
    fn set_target_position_meters(&self, position: f64) {
        let mut state = self.state.lock();
        state.origin = self.position_of(&state);
        state.target = position;
        state.commanded_at = Instant::now();
        state.commands.push(position);
    }

    fn is_busy(&self) -> bool {
        let state = self.state.lock();
        self.position_of(&state) != state.target
    }

    fn target_position_meters(&self) -> f64 {
        self.state.lock().target
    }

    fn position_meters(&self) -> f64 {
        let state = self.state.lock();
        self.position_of(&state)
    }

    fn velocity_meters(&self) -> f64 {
        if self.is_busy() {
            self.speed_m_per_s
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct RecordingServo {
    raw: ParkingLotMutex<Vec<f64>>,
}

impl Servo for RecordingServo {
    fn set_position(&self, raw: f64) {
        self.raw.lock().push(raw);
    }
}

// ===== Preemption between commands =====

#[test]
fn test_newer_move_preempts_older_one() {
    let motor = Arc::new(
        LinearMotorControl::new(SimulatedSlide::new(1.0)).poll_interval(Duration::of_millis(5)),
    );

    let older = {
        let motor = Arc::clone(&motor);
        context::spawn("older-move", move || motor.go_to_position(10.0)).unwrap()
    };
    std::thread::sleep(std::time::Duration::from_millis(100));
    assert!(motor.is_moving());

    let start = Instant::now();
    motor.go_to_position(0.0).unwrap();
    assert!(Instant::now().since(start).is_less_than(Duration::of_millis(2_000)));

    assert!(matches!(
        older.join().unwrap(),
        Err(ControlError::Interrupted(Interrupted))
    ));
    assert_eq!(motor.device().commands(), vec![10.0, 0.0]);
    assert_eq!(motor.target_position_meters(), 0.0);
    assert_eq!(motor.velocity_meters(), 0.0);
}

#[test]
fn test_newer_angle_preempts_older_one() {
    let servo = Arc::new(
        ServoControl::new(
            RecordingServo::default(),
            ServoConfig {
                speed_rad_per_sec: 0.5,
                range_rad: 7.0,
                flip_direction: false,
                zero_position: 0.0,
            },
        )
        .unwrap(),
    );

    // the first move is estimated to take several seconds
    let older = {
        let servo = Arc::clone(&servo);
        context::spawn("older-angle", move || servo.go_to_angle(1.0)).unwrap()
    };
    std::thread::sleep(std::time::Duration::from_millis(100));

    // stop where the servo currently is
    let newer = {
        let servo = Arc::clone(&servo);
        context::spawn("newer-angle", move || {
            let here = servo.servo_position().unwrap_or(1.0);
            servo.go_to_angle(here)
        })
        .unwrap()
    };

    assert!(matches!(
        older.join().unwrap(),
        Err(ControlError::Interrupted(Interrupted))
    ));
    newer.join().unwrap().unwrap();
    assert_eq!(servo.servo().raw.lock().len(), 2);
    assert!(servo.servo_position().is_some());
}

// ===== Concurrent moves in a scope =====

#[test]
fn test_scope_cancels_sibling_move_on_timeout() {
    let fast = Arc::new(
        LinearMotorControl::new(SimulatedSlide::new(0.001))
            .timeout(Duration::of_millis(50))
            .poll_interval(Duration::of_millis(5)),
    );
    let slow = Arc::new(
        LinearMotorControl::new(SimulatedSlide::new(0.001)).poll_interval(Duration::of_millis(5)),
    );

    let scope = HardwareTaskScope::<ControlError>::open();
    let start = Instant::now();
    {
        let fast = Arc::clone(&fast);
        scope.fork(move || fast.go_to_position(1.0).map_err(TaskError::Failed));
    }
    {
        let slow = Arc::clone(&slow);
        scope.fork(move || match slow.go_to_position(1.0) {
            Err(ControlError::Interrupted(interrupted)) => Err(TaskError::Interrupted(interrupted)),
            other => other.map_err(TaskError::Failed),
        });
    }

    match scope.join() {
        Err(ScopeError::Failed(ControlError::Timeout(timeout))) => {
            assert!(!timeout.waited.is_less_than(Duration::of_millis(50)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(Instant::now().since(start).is_less_than(Duration::of_millis(2_000)));
    assert!(!slow.is_moving());
    scope.close().unwrap();
}

// ===== Configuration files =====

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[motor]
timeout_ms = 1500
poll_interval_ms = 20

[servo]
speed_rad_per_sec = 4.0
range_rad = 3.0
zero_position = 1.5
"#
    )
    .unwrap();

    let config = HardwareConfig::load(file.path()).unwrap();
    let motor = LinearMotorControl::with_config(SimulatedSlide::new(1.0), &config.motor);
    motor.go_to_position(0.0).unwrap();

    let servo = ServoControl::new(RecordingServo::default(), config.servo.unwrap()).unwrap();
    assert_eq!(servo.minimum_angle(), -1.5);
    assert_eq!(servo.maximum_angle(), 1.5);
}

#[test]
fn test_stalled_servo_config_is_rejected() {
    let stalled = ServoConfig {
        speed_rad_per_sec: 0.0,
        range_rad: 3.0,
        flip_direction: false,
        zero_position: 0.0,
    };
    match ServoControl::new(RecordingServo::default(), stalled) {
        Err(ConfigError::Invalid(message)) => assert!(message.contains("speed")),
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("zero-speed servo accepted"),
    }
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shuttle.toml");
    match HardwareConfig::load(&path) {
        Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("unexpected {other:?}"),
    }
}
