//! `pickservo-hal` – hardware boundary of the pickservo stack.
//!
//! Everything that talks to the robot or its camera lives behind a trait in
//! this crate, so the policy and the control loop can be exercised against
//! the in-process simulation without touching real hardware.
//!
//! # Modules
//!
//! - [`camera`] – [`Camera`][camera::Camera] trait and [`CameraFrame`][camera::CameraFrame].
//! - [`rpc`] – [`RpcTransport`][rpc::RpcTransport]: one synchronous remote
//!   call per invocation, typed errors.
//! - [`jsonrpc`] – [`JsonRpcClient`][jsonrpc::JsonRpcClient]: JSON-RPC 2.0
//!   over HTTP for the actuator service.
//! - [`robot`] – [`RobotClient`][robot::RobotClient]: one typed method per
//!   remote procedure.
//! - [`clock`] – [`Sleeper`][clock::Sleeper]: the blocking-wait seam used by
//!   timed base motions and the loop's observation delay.
//! - [`sim`] – [`SimWorld`][sim::SimWorld]: a small kinematic scene with a
//!   simulated camera, actuator service and clock.

pub mod camera;
pub mod clock;
pub mod jsonrpc;
pub mod robot;
pub mod rpc;
pub mod sim;

pub use camera::{Camera, CameraFrame};
pub use clock::{Sleeper, ThreadSleeper};
pub use jsonrpc::JsonRpcClient;
pub use robot::RobotClient;
pub use rpc::RpcTransport;
