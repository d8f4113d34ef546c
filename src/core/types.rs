use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;
use zeroize::Zeroizing;

/// Ordered, non-empty, deduplicated list of requested hostnames.
/// The first entry is the certificate's common name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainList(Vec<String>);

impl DomainList {
    /// Returns `None` when `domains` is empty. Repeated entries are dropped,
    /// keeping the first occurrence. Entries are expected to be normalized
    /// already (see `domain::normalize_domain_list`).
    pub fn new(domains: Vec<String>) -> Option<Self> {
        let mut unique: Vec<String> = Vec::with_capacity(domains.len());
        for domain in domains {
            if !unique.contains(&domain) {
                unique.push(domain);
            }
        }
        if unique.is_empty() {
            None
        } else {
            Some(Self(unique))
        }
    }

    pub fn common_name(&self) -> &str {
        &self.0[0]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a DomainList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for DomainList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Account record returned by the authority for the run's account key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub contact: Vec<String>,
    pub terms_of_service_agreed: bool,
    /// False when the authority returned an account that already existed for the key.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Expired,
    Revoked,
    Deactivated,
}

impl AuthorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationStatus::Pending => "pending",
            AuthorizationStatus::Valid => "valid",
            AuthorizationStatus::Invalid => "invalid",
            AuthorizationStatus::Expired => "expired",
            AuthorizationStatus::Revoked => "revoked",
            AuthorizationStatus::Deactivated => "deactivated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthorizationStatus::Pending)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Http01,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceChallenge {
    pub domain: String,
    pub token: String,
    /// Proof content: the token joined with the account key thumbprint.
    pub key_authorization: String,
    pub url: String,
    pub kind: ChallengeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub domain: String,
    pub status: AuthorizationStatus,
    /// The HTTP-01 challenge, if the authority offered one.
    pub challenge: Option<IssuanceChallenge>,
}

/// Issued certificate material ready for installation.
pub struct CertificateBundle {
    pub certificate_pem: String,
    /// Intermediate certificates, concatenated PEM. Empty when the authority sent none.
    pub chain_pem: String,
    pub private_key_pem: Zeroizing<String>,
}

impl CertificateBundle {
    pub fn fullchain_pem(&self) -> String {
        format!("{}{}", self.certificate_pem, self.chain_pem)
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate_pem", &self.certificate_pem)
            .field("chain_pem", &self.chain_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Details of an issued leaf certificate, used for logging and the final report.
#[derive(Debug, Clone)]
pub struct CertificateSummary {
    pub serial: String,
    pub issuer: String,
    pub sans: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SHA-256 over the DER encoding, hex encoded.
    pub fingerprint: String,
}

impl CertificateSummary {
    pub fn from_pem(certificate_pem: &str) -> Result<Self> {
        let (_, pem_block) = parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| anyhow!("failed to parse issued certificate PEM: {e}"))?;
        let cert = pem_block
            .parse_x509()
            .map_err(|e| anyhow!("failed to parse issued certificate: {e}"))?;

        let not_before = Utc
            .timestamp_opt(cert.validity().not_before.timestamp(), 0)
            .single()
            .ok_or_else(|| anyhow!("certificate notBefore is out of range"))?;
        let not_after = Utc
            .timestamp_opt(cert.validity().not_after.timestamp(), 0)
            .single()
            .ok_or_else(|| anyhow!("certificate notAfter is out of range"))?;

        let sans = match cert.subject_alternative_name() {
            Ok(Some(ext)) => ext
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let fingerprint = {
            let mut hasher = Sha256::new();
            hasher.update(&pem_block.contents);
            hex::encode(hasher.finalize())
        };

        Ok(Self {
            serial: cert.raw_serial_as_string(),
            issuer: cert.issuer().to_string(),
            sans,
            not_before,
            not_after,
            fingerprint,
        })
    }
}
