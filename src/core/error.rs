use thiserror::Error;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIGURATION: u8 = 2;
pub const EXIT_AUTHENTICATION: u8 = 3;
pub const EXIT_VALIDATION_FAILED: u8 = 4;

/// Fatal pipeline errors. Failing domain validation is not one of them: it is
/// reported through `PipelineOutcome::ValidationFailed`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error(
        "WebFaction API username, password, and/or servername are incorrect. Login failed: {0}"
    )]
    Authentication(String),
    #[error("ACME account registration failed: {0}")]
    Registration(String),
    #[error("certificate issuance failed: {0}")]
    Issuance(String),
    #[error("certificate installation failed: {0}")]
    Installation(String),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Configuration(_) => EXIT_CONFIGURATION,
            PipelineError::Authentication(_) => EXIT_AUTHENTICATION,
            PipelineError::Registration(_)
            | PipelineError::Issuance(_)
            | PipelineError::Installation(_) => EXIT_FAILURE,
        }
    }
}
