//! End-to-end issuance run.
//!
//! Stages run strictly in order and each one only if the previous succeeded:
//! hosting login check, account registration, domain validation, certificate
//! request, optional local export, installation.

use log::{info, warn};

use crate::core::config::Config;
use crate::core::error::PipelineError;
use crate::core::types::{CertificateSummary, DomainList};
use crate::distribution::export::{ExportedFile, export_pem_bundle};
use crate::domain::normalize_domain_for_display;
use crate::hosting::installer::{CertificateInstaller, InstallAction};
use crate::hosting::{HostingApi, HostingError};
use crate::issuance::acme::register_account;
use crate::issuance::challenge::ChallengePublisher;
use crate::issuance::issuer::Authority;
use crate::issuance::polling::Sleeper;
use crate::issuance::requester::CertificateRequester;
use crate::issuance::validator::{ChallengeValidator, ValidationReport};

#[derive(Debug)]
pub struct InstallReport {
    pub cert_name: String,
    pub domains: DomainList,
    pub action: InstallAction,
    /// `None` when the issued leaf could not be parsed for display.
    pub summary: Option<CertificateSummary>,
    pub exported: Vec<ExportedFile>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Installed(InstallReport),
    /// At least one domain failed validation; nothing was issued or installed.
    ValidationFailed(ValidationReport),
}

pub fn run_pipeline(
    config: &Config,
    authority: &mut dyn Authority,
    hosting: &mut dyn HostingApi,
    publisher: &dyn ChallengePublisher,
    sleeper: &dyn Sleeper,
) -> Result<PipelineOutcome, PipelineError> {
    check_hosting_login(config, hosting)?;

    register_account(authority, &config.contact_email)?;

    info!(
        "[flow] validating {} domain(s) via {}: {}",
        config.domains.len(),
        publisher.id(),
        config.domains
    );
    let validator = ChallengeValidator::new(publisher, config.poll_policy, sleeper);
    let report = validator.validate(&config.domains, authority);
    if !report.is_valid() {
        for outcome in report.failed() {
            warn!("[flow] validation failed for {}", outcome.describe());
        }
        return Ok(PipelineOutcome::ValidationFailed(report));
    }

    let bundle = CertificateRequester::new(config.key_spec).issue(&config.domains, authority)?;

    let summary = match CertificateSummary::from_pem(&bundle.certificate_pem) {
        Ok(summary) => {
            let names: Vec<String> = summary
                .sans
                .iter()
                .map(|san| normalize_domain_for_display(san))
                .collect();
            info!(
                "[flow] issued certificate serial {} by {} for [{}], valid until {}",
                summary.serial,
                summary.issuer,
                names.join(", "),
                summary.not_after.to_rfc3339()
            );
            Some(summary)
        }
        Err(err) => {
            warn!("[flow] could not summarize issued certificate: {err:#}");
            None
        }
    };

    let exported = match &config.export_dir {
        Some(dir) => export_pem_bundle(&bundle, dir, &config.cert_name)
            .map_err(|e| PipelineError::Installation(format!("local export failed: {e:#}")))?,
        None => Vec::new(),
    };

    let action = CertificateInstaller::new(&config.credentials).install(
        hosting,
        &config.cert_name,
        &bundle,
    )?;

    Ok(PipelineOutcome::Installed(InstallReport {
        cert_name: config.cert_name.clone(),
        domains: config.domains.clone(),
        action,
        summary,
        exported,
    }))
}

/// Rejected hosting credentials end the run before the authority is contacted.
fn check_hosting_login(config: &Config, hosting: &mut dyn HostingApi) -> Result<(), PipelineError> {
    hosting.login(&config.credentials).map_err(|err| match err {
        HostingError::Authentication(message) => PipelineError::Authentication(message),
        other => PipelineError::Installation(format!("hosting API login check failed: {other}")),
    })
}
