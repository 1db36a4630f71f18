pub mod agent;
pub mod agent_runner;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod gate;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod state;
pub mod types;

pub use error::{Result, VeriflowError};
