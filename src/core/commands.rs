use log::info;

use crate::core::config::{ChallengeMode, Config};
use crate::core::error::PipelineError;
use crate::hosting::webfaction::WebfactionApi;
use crate::issuance::acme_workflow::AcmeAuthority;
use crate::issuance::challenge::{ChallengePublisher, ManualPublisher, WebrootPublisher};
use crate::issuance::flow::{PipelineOutcome, run_pipeline};
use crate::issuance::polling::ThreadSleeper;

/// Builds the production backends for `config` and runs the pipeline once.
pub fn run(config: &Config) -> Result<PipelineOutcome, PipelineError> {
    let publisher: Box<dyn ChallengePublisher> = match &config.challenge_mode {
        ChallengeMode::Webroot(roots) => Box::new(WebrootPublisher::new(roots.clone())),
        ChallengeMode::Manual => Box::new(ManualPublisher::new()),
    };
    let mut authority = AcmeAuthority::new(
        config.directory_url.clone(),
        config.account_credentials.clone(),
        config.poll_policy,
    )
    .map_err(|e| PipelineError::Configuration(e.to_string()))?;
    let mut hosting = WebfactionApi::new();

    info!(
        "[run] issuing {} from {} into certificate {}",
        config.domains, config.directory_url, config.cert_name
    );
    run_pipeline(
        config,
        &mut authority,
        &mut hosting,
        publisher.as_ref(),
        &ThreadSleeper,
    )
}
