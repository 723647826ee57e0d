//! Root of the `livedit-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the host or the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod config_loader;
mod correction_map;
mod debug_run;
mod edit_session;
mod error;
mod orchestrator;
mod read_only;
pub mod services;

pub use config::CONFIG_TOML_FILE;
pub use config::Config;
pub use config::ConfigToml;
pub use config::FaultsToml;
pub use config::MemoizationToml;
pub use error::LifecycleError;
pub use error::Result;
pub use livedit_protocol as protocol;
pub use livedit_utils_single_flight::ComputeError;
pub use orchestrator::EditSessionSummary;
pub use orchestrator::LifecycleState;
pub use orchestrator::SessionOrchestrator;
