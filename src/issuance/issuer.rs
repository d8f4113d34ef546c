use thiserror::Error;

use crate::core::types::{
    AuthorizationStatus, DomainList, IssuanceChallenge, PendingAuthorization, Registration,
};

/// Operations the pipeline needs from an ACME-style certificate authority.
///
/// Implementations keep the account and the open order between calls; the
/// pipeline drives them strictly in sequence from a single thread.
pub trait Authority {
    /// Registers the account key, returning the existing registration if the
    /// key is already known to the authority.
    fn register(&mut self, contact_email: &str) -> Result<Registration, AuthorityError>;
    fn agree_terms(&mut self, registration: &Registration) -> Result<(), AuthorityError>;
    /// Opens the order whose authorizations `authorization` will look up.
    fn begin_order(&mut self, domains: &DomainList) -> Result<(), AuthorityError>;
    fn authorization(&mut self, domain: &str) -> Result<PendingAuthorization, AuthorityError>;
    /// Tells the authority the proof is published and it may check the challenge.
    fn request_verification(&mut self, challenge: &IssuanceChallenge)
    -> Result<(), AuthorityError>;
    fn authorization_status(&mut self, domain: &str)
    -> Result<AuthorizationStatus, AuthorityError>;
    /// Submits the DER-encoded CSR and returns the issued PEM chain, leaf first.
    fn issue(&mut self, csr_der: &[u8]) -> Result<String, AuthorityError>;
}

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("authority unavailable: {0}")]
    Unavailable(String),
    #[error("authority configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("no account registered; register before {0}")]
    NotRegistered(&'static str),
    #[error("no order open; begin an order before {0}")]
    NoOrder(&'static str),
    #[error("authority rejected the request: {0}")]
    Rejected(String),
    #[error("authority operation failed: {0}")]
    Operation(String),
}
