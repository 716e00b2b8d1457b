pub mod archive;
pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod flowmind_config;
pub mod guard;
pub mod notify;
pub mod orchestrator;
pub mod station;
pub mod store;

pub use errors::{DispatchError, exit_code_for};
