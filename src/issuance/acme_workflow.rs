//! instant-acme backed `Authority`.
//!
//! instant-acme is async; the pipeline is not. Each call is driven to
//! completion on a private current-thread runtime owned by the authority.

use std::{
    fs,
    path::{Path, PathBuf},
};

use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus as AcmeAuthorizationStatus, ChallengeType,
    Identifier, NewAccount, NewOrder, Order, OrderStatus,
};
use log::{debug, info, warn};
use tokio::runtime::Runtime;

use crate::core::types::{
    AuthorizationStatus, ChallengeKind, DomainList, IssuanceChallenge, PendingAuthorization,
    Registration,
};
use crate::distribution::export::write_secure_file;
use crate::issuance::issuer::{Authority, AuthorityError};
use crate::issuance::polling::{PollOutcome, PollPolicy, Sleeper, ThreadSleeper, poll_until};

pub const LETSENCRYPT_PRODUCTION_DIRECTORY: &str =
    "https://acme-v02.api.letsencrypt.org/directory";
pub const LETSENCRYPT_STAGING_DIRECTORY: &str =
    "https://acme-staging-v02.api.letsencrypt.org/directory";

pub struct AcmeAuthority {
    runtime: Runtime,
    directory_url: String,
    credentials_path: Option<PathBuf>,
    account: Option<Account>,
    order: Option<Order>,
    poll_policy: PollPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl AcmeAuthority {
    pub fn new(
        directory_url: impl Into<String>,
        credentials_path: Option<PathBuf>,
        poll_policy: PollPolicy,
    ) -> Result<Self, AuthorityError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AuthorityError::InvalidConfig(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            runtime,
            directory_url: directory_url.into(),
            credentials_path,
            account: None,
            order: None,
            poll_policy,
            sleeper: Box::new(ThreadSleeper),
        })
    }

    fn load_credentials(path: &Path) -> Result<Option<AccountCredentials>, AuthorityError> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path).map_err(|e| {
            AuthorityError::InvalidConfig(format!(
                "failed to read account credentials {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&json).map(Some).map_err(|e| {
            AuthorityError::InvalidConfig(format!(
                "failed to parse account credentials {}: {e}",
                path.display()
            ))
        })
    }

    fn save_credentials(path: &Path, credentials: &AccountCredentials) -> Result<(), AuthorityError> {
        let json = serde_json::to_string_pretty(credentials).map_err(|e| {
            AuthorityError::Operation(format!("failed to serialize account credentials: {e}"))
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AuthorityError::Operation(format!(
                    "failed to create credentials directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let temp_path = path.with_extension("tmp");
        if let Err(err) = write_secure_file(&temp_path, json.as_bytes()) {
            let _ = fs::remove_file(&temp_path);
            return Err(AuthorityError::Operation(format!("{err:#}")));
        }
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AuthorityError::Operation(format!(
                "failed to move account credentials into place at {}: {e}",
                path.display()
            ))
        })
    }
}

fn map_status(status: AcmeAuthorizationStatus) -> AuthorizationStatus {
    match status {
        AcmeAuthorizationStatus::Pending => AuthorizationStatus::Pending,
        AcmeAuthorizationStatus::Valid => AuthorizationStatus::Valid,
        AcmeAuthorizationStatus::Invalid => AuthorizationStatus::Invalid,
        AcmeAuthorizationStatus::Revoked => AuthorizationStatus::Revoked,
        AcmeAuthorizationStatus::Expired => AuthorizationStatus::Expired,
        #[allow(unreachable_patterns)]
        _ => AuthorizationStatus::Deactivated,
    }
}

fn operation_error(context: &str, err: instant_acme::Error) -> AuthorityError {
    AuthorityError::Operation(format!("{context}: {err}"))
}

impl Authority for AcmeAuthority {
    fn register(&mut self, contact_email: &str) -> Result<Registration, AuthorityError> {
        let contact = format!("mailto:{contact_email}");

        if let Some(path) = self.credentials_path.as_deref()
            && let Some(credentials) = Self::load_credentials(path)?
        {
            // Not re-checked with the authority: a deactivated account fails at the order.
            info!("[acme] loading account credentials from {}", path.display());
            let account = self
                .runtime
                .block_on(Account::from_credentials(credentials))
                .map_err(|e| operation_error("failed to restore account", e))?;
            debug!("[acme] restored account {}", account.id());
            self.account = Some(account);
            return Ok(Registration {
                contact: vec![contact],
                terms_of_service_agreed: true,
                created: false,
            });
        }

        // instant-acme generates the account key itself (ECDSA P-256); it cannot be sized.
        info!("[acme] creating account at {}", self.directory_url);
        let contact_refs = [contact.as_str()];
        let new_account = NewAccount {
            contact: &contact_refs,
            terms_of_service_agreed: true,
            only_return_existing: false,
        };
        let (account, credentials) = self
            .runtime
            .block_on(Account::create(&new_account, &self.directory_url, None))
            .map_err(|e| match e {
                instant_acme::Error::Api(problem) => AuthorityError::Rejected(problem.to_string()),
                other => AuthorityError::Unavailable(other.to_string()),
            })?;
        debug!("[acme] account url {}", account.id());

        if let Some(path) = self.credentials_path.as_deref() {
            Self::save_credentials(path, &credentials)?;
            info!("[acme] saved account credentials to {}", path.display());
        }
        self.account = Some(account);

        Ok(Registration {
            contact: vec![contact],
            terms_of_service_agreed: true,
            created: true,
        })
    }

    /// ACME v2 records agreement in the newAccount request itself; this only
    /// confirms the registration carries it.
    fn agree_terms(&mut self, registration: &Registration) -> Result<(), AuthorityError> {
        if self.account.is_none() {
            return Err(AuthorityError::NotRegistered("agreeing to terms"));
        }
        if !registration.terms_of_service_agreed {
            return Err(AuthorityError::Rejected(
                "account does not record terms of service agreement".to_string(),
            ));
        }
        Ok(())
    }

    fn begin_order(&mut self, domains: &DomainList) -> Result<(), AuthorityError> {
        let account = self
            .account
            .as_ref()
            .ok_or(AuthorityError::NotRegistered("ordering"))?;
        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|domain| Identifier::Dns(domain.clone()))
            .collect();
        let order = self
            .runtime
            .block_on(account.new_order(&NewOrder {
                identifiers: &identifiers,
            }))
            .map_err(|e| operation_error("failed to create order", e))?;
        info!("[acme] opened order {} for {domains}", order.url());
        self.order = Some(order);
        Ok(())
    }

    fn authorization(&mut self, domain: &str) -> Result<PendingAuthorization, AuthorityError> {
        let Self { runtime, order, .. } = self;
        let order = order.as_mut().ok_or(AuthorityError::NoOrder("authorizing"))?;
        let authorizations = runtime
            .block_on(order.authorizations())
            .map_err(|e| operation_error("failed to fetch authorizations", e))?;

        let authz = authorizations
            .into_iter()
            .find(|authz| {
                let Identifier::Dns(name) = &authz.identifier;
                name.eq_ignore_ascii_case(domain)
            })
            .ok_or_else(|| {
                AuthorityError::Operation(format!("order has no authorization for {domain}"))
            })?;

        let challenge = authz
            .challenges
            .iter()
            .find(|c| c.r#type == ChallengeType::Http01)
            .map(|c| IssuanceChallenge {
                domain: domain.to_string(),
                token: c.token.clone(),
                key_authorization: order.key_authorization(c).as_str().to_string(),
                url: c.url.clone(),
                kind: ChallengeKind::Http01,
            });

        Ok(PendingAuthorization {
            domain: domain.to_string(),
            status: map_status(authz.status),
            challenge,
        })
    }

    fn request_verification(
        &mut self,
        challenge: &IssuanceChallenge,
    ) -> Result<(), AuthorityError> {
        let Self { runtime, order, .. } = self;
        let order = order.as_mut().ok_or(AuthorityError::NoOrder("verifying"))?;
        runtime
            .block_on(order.set_challenge_ready(&challenge.url))
            .map_err(|e| operation_error("failed to mark challenge ready", e))?;
        debug!("[acme] challenge for {} marked ready", challenge.domain);
        Ok(())
    }

    fn authorization_status(
        &mut self,
        domain: &str,
    ) -> Result<AuthorizationStatus, AuthorityError> {
        let Self { runtime, order, .. } = self;
        let order = order
            .as_mut()
            .ok_or(AuthorityError::NoOrder("polling authorizations"))?;
        let authorizations = runtime
            .block_on(order.authorizations())
            .map_err(|e| operation_error("failed to poll authorization", e))?;
        authorizations
            .into_iter()
            .find(|authz| {
                let Identifier::Dns(name) = &authz.identifier;
                name.eq_ignore_ascii_case(domain)
            })
            .map(|authz| map_status(authz.status))
            .ok_or_else(|| {
                AuthorityError::Operation(format!("order has no authorization for {domain}"))
            })
    }

    fn issue(&mut self, csr_der: &[u8]) -> Result<String, AuthorityError> {
        let Self {
            runtime,
            order,
            poll_policy,
            sleeper,
            ..
        } = self;
        let order = order.as_mut().ok_or(AuthorityError::NoOrder("issuing"))?;

        let ready = poll_until(poll_policy, &**sleeper, "order readiness", |_| {
            let state = runtime
                .block_on(order.refresh())
                .map_err(|e| operation_error("failed to refresh order", e))?;
            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => Ok(Some(state.status)),
                OrderStatus::Invalid => Err(AuthorityError::Rejected(
                    state
                        .error
                        .as_ref()
                        .map(|problem| problem.to_string())
                        .unwrap_or_else(|| "order became invalid".to_string()),
                )),
                OrderStatus::Pending | OrderStatus::Processing => Ok(None),
            }
        })?;
        let status = match ready {
            PollOutcome::Ready { value, .. } => value,
            PollOutcome::Exhausted { attempts } => {
                return Err(AuthorityError::Operation(format!(
                    "order not ready after {attempts} attempt(s)"
                )));
            }
        };

        if status == OrderStatus::Ready {
            runtime
                .block_on(order.finalize(csr_der))
                .map_err(|e| match e {
                    instant_acme::Error::Api(problem) => {
                        AuthorityError::Rejected(problem.to_string())
                    }
                    other => operation_error("failed to finalize order", other),
                })?;
            info!("[acme] order finalized, waiting for certificate");
        } else {
            warn!("[acme] order already valid; downloading existing certificate");
        }

        let downloaded = poll_until(poll_policy, &**sleeper, "certificate download", |_| {
            runtime
                .block_on(order.certificate())
                .map_err(|e| operation_error("failed to download certificate", e))
        })?;
        match downloaded {
            PollOutcome::Ready { value, .. } => Ok(value),
            PollOutcome::Exhausted { attempts } => Err(AuthorityError::Operation(format!(
                "certificate not available after {attempts} attempt(s)"
            ))),
        }
    }
}
