//! Domain ownership validation.
//!
//! Every requested domain is taken through authorization, HTTP-01 proof
//! publication, a verification request and bounded polling. A failure on one
//! domain is recorded and the next domain is still attempted, so a run always
//! reports the state of the whole domain list.

use log::{info, warn};

use crate::core::types::{AuthorizationStatus, ChallengeKind, DomainList, IssuanceChallenge};
use crate::issuance::challenge::ChallengePublisher;
use crate::issuance::issuer::Authority;
use crate::issuance::polling::{PollOutcome, PollPolicy, Sleeper, poll_until};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainStatus {
    Valid,
    /// The authorization reached a terminal state other than valid.
    Invalid(AuthorizationStatus),
    TimedOut { attempts: u32 },
    /// A protocol, network or publication error ended this domain's attempt.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainOutcome {
    pub domain: String,
    pub status: DomainStatus,
}

impl DomainOutcome {
    pub fn is_valid(&self) -> bool {
        self.status == DomainStatus::Valid
    }

    pub fn describe(&self) -> String {
        match &self.status {
            DomainStatus::Valid => format!("{}: valid", self.domain),
            DomainStatus::Invalid(status) => {
                format!("{}: authorization is {status}", self.domain)
            }
            DomainStatus::TimedOut { attempts } => format!(
                "{}: still pending after {attempts} poll attempt(s)",
                self.domain
            ),
            DomainStatus::Error(message) => format!("{}: {message}", self.domain),
        }
    }
}

/// Per-domain results of one validation pass, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub outcomes: Vec<DomainOutcome>,
}

impl ValidationReport {
    /// True iff every requested domain reached "valid".
    pub fn is_valid(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(DomainOutcome::is_valid)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DomainOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_valid())
    }
}

pub struct ChallengeValidator<'a> {
    publisher: &'a dyn ChallengePublisher,
    policy: PollPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> ChallengeValidator<'a> {
    pub fn new(
        publisher: &'a dyn ChallengePublisher,
        policy: PollPolicy,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            publisher,
            policy,
            sleeper,
        }
    }

    pub fn validate(&self, domains: &DomainList, authority: &mut dyn Authority) -> ValidationReport {
        if let Err(err) = authority.begin_order(domains) {
            warn!("[validate] could not open an order for {domains}: {err}");
            let message = format!("order could not be created: {err}");
            return ValidationReport {
                outcomes: domains
                    .iter()
                    .map(|domain| DomainOutcome {
                        domain: domain.clone(),
                        status: DomainStatus::Error(message.clone()),
                    })
                    .collect(),
            };
        }

        let mut outcomes = Vec::with_capacity(domains.len());
        for domain in domains {
            let status = self.validate_domain(domain, authority);
            let outcome = DomainOutcome {
                domain: domain.clone(),
                status,
            };
            if outcome.is_valid() {
                info!("[validate] {}", outcome.describe());
            } else {
                warn!("[validate] {}", outcome.describe());
            }
            outcomes.push(outcome);
        }

        ValidationReport { outcomes }
    }

    fn validate_domain(&self, domain: &str, authority: &mut dyn Authority) -> DomainStatus {
        let authorization = match authority.authorization(domain) {
            Ok(authorization) => authorization,
            Err(err) => return DomainStatus::Error(format!("authorization request failed: {err}")),
        };

        match authorization.status {
            AuthorizationStatus::Valid => {
                info!("[validate] {domain}: authority reused an existing valid authorization");
                return DomainStatus::Valid;
            }
            AuthorizationStatus::Pending => {}
            other => return DomainStatus::Invalid(other),
        }

        let Some(challenge) = authorization
            .challenge
            .filter(|challenge| challenge.kind == ChallengeKind::Http01)
        else {
            return DomainStatus::Error("authority offered no http-01 challenge".to_string());
        };

        let instruction = match self.publisher.publish(&challenge) {
            Ok(instruction) => instruction,
            Err(err) => return DomainStatus::Error(format!("could not publish proof: {err:#}")),
        };
        info!(
            "[validate] {domain}: proof published via {} at {}",
            instruction.publisher, instruction.url
        );

        let status = self.verify(domain, &challenge, authority);

        if let Err(err) = self.publisher.cleanup(&challenge) {
            warn!("[validate] {domain}: failed to remove published proof: {err:#}");
        }
        status
    }

    fn verify(
        &self,
        domain: &str,
        challenge: &IssuanceChallenge,
        authority: &mut dyn Authority,
    ) -> DomainStatus {
        if let Err(err) = authority.request_verification(challenge) {
            return DomainStatus::Error(format!("verification request failed: {err}"));
        }

        let label = format!("authorization for {domain}");
        let polled = poll_until(&self.policy, self.sleeper, &label, |_| {
            authority
                .authorization_status(domain)
                .map(|status| status.is_terminal().then_some(status))
        });

        match polled {
            Ok(PollOutcome::Ready {
                value: AuthorizationStatus::Valid,
                ..
            }) => DomainStatus::Valid,
            Ok(PollOutcome::Ready { value, .. }) => DomainStatus::Invalid(value),
            Ok(PollOutcome::Exhausted { attempts }) => DomainStatus::TimedOut { attempts },
            Err(err) => DomainStatus::Error(format!("polling failed: {err}")),
        }
    }
}
