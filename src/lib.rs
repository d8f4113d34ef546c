pub mod core;
pub mod distribution;
pub mod domain;
pub mod hosting;
pub mod issuance;

pub use crate::core::commands::run;
pub use crate::core::config::{Cli, Config};
pub use crate::core::error::PipelineError;
pub use crate::issuance::flow::{InstallReport, PipelineOutcome};
