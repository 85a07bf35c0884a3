//! [`RobotClient`] – typed wrapper over the actuator service's procedures.
//!
//! Parameters are forwarded as given; range enforcement is the job of the
//! safety layer in `pickservo-kernel`, which sits in front of this client.

use pickservo_types::RpcError;
use serde_json::{Value, json};

use crate::rpc::RpcTransport;

/// Remote procedure names understood by the actuator service.
pub mod methods {
    pub const ARM_MOVE_IK: &str = "ArmMoveIk";
    pub const SET_GRIPPER_OPEN: &str = "SetGripperOpen";
    pub const SET_GRIPPER_CLOSE: &str = "SetGripperClose";
    pub const SET_GRIPPER_POSITION: &str = "SetGripperPosition";
    pub const GET_GRIPPER_POSITION: &str = "GetGripperPosition";
    pub const SET_MECANUM_VELOCITY: &str = "SetMecanumVelocity";
    pub const RESET_MECANUM_MOTORS: &str = "ResetMecanumMotors";
    pub const GET_SONAR_DISTANCE: &str = "GetSonarDistance";
    pub const GET_BATTERY_VOLTAGE: &str = "GetBatteryVoltage";
    pub const STOP_ALL_MOTORS: &str = "StopAllMotors";
}

/// One method per remote procedure of the mobile manipulator.
pub struct RobotClient {
    transport: Box<dyn RpcTransport>,
}

impl RobotClient {
    pub fn new(transport: Box<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Move the end effector to `(x, y, z)` cm with the given orientation
    /// (degrees) over `speed_ms` milliseconds.
    #[allow(clippy::too_many_arguments)]
    pub fn arm_move_ik(
        &self,
        x: f64,
        y: f64,
        z: f64,
        pitch: f64,
        roll: f64,
        yaw: f64,
        speed_ms: u32,
    ) -> Result<Value, RpcError> {
        self.transport.invoke(
            methods::ARM_MOVE_IK,
            &[
                json!(x),
                json!(y),
                json!(z),
                json!(pitch),
                json!(roll),
                json!(yaw),
                json!(speed_ms),
            ],
        )
    }

    pub fn set_gripper_open(&self) -> Result<Value, RpcError> {
        self.transport.invoke(methods::SET_GRIPPER_OPEN, &[])
    }

    pub fn set_gripper_close(&self) -> Result<Value, RpcError> {
        self.transport.invoke(methods::SET_GRIPPER_CLOSE, &[])
    }

    /// Set the gripper opening in percent (0 = closed, 100 = open).
    pub fn set_gripper_position(&self, position: u8, use_time_ms: u32) -> Result<Value, RpcError> {
        self.transport.invoke(
            methods::SET_GRIPPER_POSITION,
            &[json!(position), json!(use_time_ms)],
        )
    }

    pub fn gripper_position(&self) -> Result<u8, RpcError> {
        let value = self.transport.invoke(methods::GET_GRIPPER_POSITION, &[])?;
        value
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| unexpected(methods::GET_GRIPPER_POSITION, &value))
    }

    /// Polar base velocity: speed in mm/s, heading in degrees, yaw rate in deg/s.
    pub fn set_mecanum_velocity(
        &self,
        velocity: f64,
        direction: f64,
        angular_rate: f64,
    ) -> Result<Value, RpcError> {
        self.transport.invoke(
            methods::SET_MECANUM_VELOCITY,
            &[json!(velocity), json!(direction), json!(angular_rate)],
        )
    }

    /// Stop all base motors.
    pub fn reset_mecanum_motors(&self) -> Result<Value, RpcError> {
        self.transport.invoke(methods::RESET_MECANUM_MOTORS, &[])
    }

    /// Ultrasonic range in centimetres.
    pub fn sonar_distance(&self) -> Result<f64, RpcError> {
        let value = self.transport.invoke(methods::GET_SONAR_DISTANCE, &[])?;
        value
            .as_f64()
            .ok_or_else(|| unexpected(methods::GET_SONAR_DISTANCE, &value))
    }

    /// Battery voltage in millivolts.
    pub fn battery_voltage(&self) -> Result<u32, RpcError> {
        let value = self.transport.invoke(methods::GET_BATTERY_VOLTAGE, &[])?;
        value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| unexpected(methods::GET_BATTERY_VOLTAGE, &value))
    }

    /// Emergency stop for every motor on the robot.
    pub fn stop_all_motors(&self) -> Result<Value, RpcError> {
        self.transport.invoke(methods::STOP_ALL_MOTORS, &[])
    }
}

fn unexpected(method: &str, value: &Value) -> RpcError {
    RpcError::InvalidResponse(format!("{method} returned unexpected payload {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

    struct CannedTransport {
        log: Log,
        reply: Value,
    }

    impl RpcTransport for CannedTransport {
        fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
            self.log
                .lock()
                .unwrap()
                .push((method.to_string(), params.to_vec()));
            Ok(self.reply.clone())
        }
    }

    fn client(reply: Value) -> (RobotClient, Log) {
        let log: Log = Arc::default();
        let transport = CannedTransport {
            log: Arc::clone(&log),
            reply,
        };
        (RobotClient::new(Box::new(transport)), log)
    }

    #[test]
    fn arm_move_ik_sends_seven_ordered_params() {
        let (robot, log) = client(Value::Null);
        robot.arm_move_ik(1.0, 6.0, 18.0, 0.0, -90.0, 90.0, 1500).unwrap();
        let calls = log.lock().unwrap();
        assert_eq!(calls[0].0, "ArmMoveIk");
        assert_eq!(
            calls[0].1,
            vec![
                json!(1.0),
                json!(6.0),
                json!(18.0),
                json!(0.0),
                json!(-90.0),
                json!(90.0),
                json!(1500)
            ]
        );
    }

    #[test]
    fn mecanum_velocity_sends_polar_params() {
        let (robot, log) = client(Value::Null);
        robot.set_mecanum_velocity(50.0, 90.0, -10.0).unwrap();
        robot.reset_mecanum_motors().unwrap();
        let calls = log.lock().unwrap();
        assert_eq!(calls[0].0, "SetMecanumVelocity");
        assert_eq!(calls[0].1, vec![json!(50.0), json!(90.0), json!(-10.0)]);
        assert_eq!(calls[1].0, "ResetMecanumMotors");
        assert!(calls[1].1.is_empty());
    }

    #[test]
    fn sonar_distance_parses_number() {
        let (robot, _) = client(json!(23.5));
        assert!((robot.sonar_distance().unwrap() - 23.5).abs() < f64::EPSILON);
    }

    #[test]
    fn battery_voltage_rejects_non_numeric_payload() {
        let (robot, _) = client(json!("low"));
        assert!(matches!(
            robot.battery_voltage(),
            Err(RpcError::InvalidResponse(_))
        ));
    }

    #[test]
    fn gripper_position_rejects_out_of_range_payload() {
        let (robot, _) = client(json!(300));
        assert!(robot.gripper_position().is_err());
        let (robot, _) = client(json!(40));
        assert_eq!(robot.gripper_position().unwrap(), 40);
    }
}
