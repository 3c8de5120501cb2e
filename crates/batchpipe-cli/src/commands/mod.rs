//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod check_outputs;
pub mod dry_run;
pub mod models;
pub mod report;
pub mod resume;
pub mod run;
pub mod status;
pub mod submit;
