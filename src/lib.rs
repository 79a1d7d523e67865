pub mod actuators;
pub mod bridge;
pub mod config;
pub mod control;
pub mod devices;
pub mod drive;
pub mod input;
pub mod messages;
pub mod pose;
pub mod runtime;
pub mod sim;
pub mod telemetry;
