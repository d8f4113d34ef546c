use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use clap::Parser;
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

use letsencrypt_webfaction::core::types::{
    AuthorizationStatus, ChallengeKind, DomainList, IssuanceChallenge, PendingAuthorization,
    Registration,
};
use letsencrypt_webfaction::hosting::{
    CertificateResource, CertificateUpload, HostingApi, HostingCredentials, HostingError,
};
use letsencrypt_webfaction::issuance::challenge::{
    ChallengeInstruction, ChallengePublisher, instruction_for,
};
use letsencrypt_webfaction::issuance::issuer::{Authority, AuthorityError};
use letsencrypt_webfaction::issuance::polling::Sleeper;
use letsencrypt_webfaction::{Cli, Config};

/// Parses a config the way the binary would, with fast test defaults.
pub fn config(domains: &str, extra: &[&str]) -> Config {
    let mut args = vec![
        "letsencrypt_webfaction",
        "--letsencrypt-account-email",
        "ops@example.com",
        "--domains",
        domains,
        "--username",
        "alice",
        "--password",
        "secret",
        "--servername",
        "Web500",
        "--cert-name",
        "site",
        "--key-type",
        "ecdsa",
        "--poll-attempts",
        "3",
    ];
    args.extend_from_slice(extra);
    Config::from_cli(&Cli::try_parse_from(args).expect("cli parses")).expect("valid config")
}

/// Mints a leaf for `domains` signed by a throwaway CA; returns leaf + CA PEM.
pub fn issued_chain(domains: &[String]) -> String {
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("ca params");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_key = KeyPair::generate().expect("ca key");
    let ca = ca_params.self_signed(&ca_key).expect("ca cert");

    let leaf_params = CertificateParams::new(domains.to_vec()).expect("leaf params");
    let leaf_key = KeyPair::generate().expect("leaf key");
    let leaf = leaf_params
        .signed_by(&leaf_key, &ca, &ca_key)
        .expect("leaf cert");
    format!("{}{}", leaf.pem(), ca.pem())
}

pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: RefCell<Vec<String>>,
}

impl ChallengePublisher for RecordingPublisher {
    fn id(&self) -> &'static str {
        "recording"
    }

    fn publish(&self, challenge: &IssuanceChallenge) -> anyhow::Result<ChallengeInstruction> {
        self.published.borrow_mut().push(challenge.domain.clone());
        Ok(instruction_for(self.id(), challenge))
    }
}

/// In-memory authority. Each domain answers status polls from its script,
/// repeating the last entry once exhausted.
#[derive(Default)]
pub struct FakeAuthority {
    pub existing_account: bool,
    pub reject_issue: bool,
    pub scripts: HashMap<String, Vec<AuthorizationStatus>>,
    pub calls: Vec<String>,
    pub polls: HashMap<String, usize>,
    pub order: Option<Vec<String>>,
    pub tokens: usize,
}

impl FakeAuthority {
    pub fn with_script(mut self, domain: &str, statuses: &[AuthorizationStatus]) -> Self {
        self.scripts.insert(domain.to_string(), statuses.to_vec());
        self
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }
}

impl Authority for FakeAuthority {
    fn register(&mut self, contact_email: &str) -> Result<Registration, AuthorityError> {
        self.calls.push("register".into());
        Ok(Registration {
            contact: vec![format!("mailto:{contact_email}")],
            terms_of_service_agreed: true,
            created: !self.existing_account,
        })
    }

    fn agree_terms(&mut self, _registration: &Registration) -> Result<(), AuthorityError> {
        self.calls.push("agree_terms".into());
        Ok(())
    }

    fn begin_order(&mut self, domains: &DomainList) -> Result<(), AuthorityError> {
        self.calls.push("begin_order".into());
        self.order = Some(domains.as_slice().to_vec());
        Ok(())
    }

    fn authorization(&mut self, domain: &str) -> Result<PendingAuthorization, AuthorityError> {
        self.calls.push("authorization".into());
        self.tokens += 1;
        Ok(PendingAuthorization {
            domain: domain.to_string(),
            status: AuthorizationStatus::Pending,
            challenge: Some(IssuanceChallenge {
                domain: domain.to_string(),
                token: format!("token{}", self.tokens),
                key_authorization: format!("token{}.thumbprint", self.tokens),
                url: format!("https://acme.test/chall/{}", self.tokens),
                kind: ChallengeKind::Http01,
            }),
        })
    }

    fn request_verification(
        &mut self,
        _challenge: &IssuanceChallenge,
    ) -> Result<(), AuthorityError> {
        self.calls.push("request_verification".into());
        Ok(())
    }

    fn authorization_status(
        &mut self,
        domain: &str,
    ) -> Result<AuthorizationStatus, AuthorityError> {
        self.calls.push("authorization_status".into());
        let polls = self.polls.entry(domain.to_string()).or_default();
        *polls += 1;
        let script = self
            .scripts
            .get(domain)
            .ok_or_else(|| AuthorityError::Operation(format!("no script for {domain}")))?;
        Ok(script[(*polls - 1).min(script.len() - 1)])
    }

    fn issue(&mut self, csr_der: &[u8]) -> Result<String, AuthorityError> {
        self.calls.push("issue".into());
        assert!(!csr_der.is_empty());
        if self.reject_issue {
            return Err(AuthorityError::Rejected("badCSR".into()));
        }
        let domains = self.order.clone().ok_or(AuthorityError::NoOrder("issuing"))?;
        Ok(issued_chain(&domains))
    }
}

#[derive(Default)]
pub struct MemoryHosting {
    pub reject_login: bool,
    pub logged_in: bool,
    pub certificates: BTreeMap<String, (String, String, String)>,
    pub calls: Vec<&'static str>,
}

impl HostingApi for MemoryHosting {
    fn login(&mut self, _credentials: &HostingCredentials) -> Result<(), HostingError> {
        self.calls.push("login");
        if self.reject_login {
            return Err(HostingError::Authentication("fault 1: LoginError".into()));
        }
        self.logged_in = true;
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.logged_in
    }

    fn list_certificates(&mut self) -> Result<Vec<CertificateResource>, HostingError> {
        self.calls.push("list_certificates");
        Ok(self
            .certificates
            .keys()
            .map(|name| CertificateResource {
                id: None,
                name: name.clone(),
                domains: None,
                expiry_date: None,
            })
            .collect())
    }

    fn create_certificate(&mut self, upload: &CertificateUpload<'_>) -> Result<(), HostingError> {
        self.calls.push("create_certificate");
        self.store(upload);
        Ok(())
    }

    fn update_certificate(&mut self, upload: &CertificateUpload<'_>) -> Result<(), HostingError> {
        self.calls.push("update_certificate");
        self.store(upload);
        Ok(())
    }
}

impl MemoryHosting {
    fn store(&mut self, upload: &CertificateUpload<'_>) {
        self.certificates.insert(
            upload.name.to_string(),
            (
                upload.certificate.to_string(),
                upload.private_key.to_string(),
                upload.intermediates.to_string(),
            ),
        );
    }
}
