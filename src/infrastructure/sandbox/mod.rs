//! Sandbox executors

pub mod command;

pub use command::CommandSandbox;
