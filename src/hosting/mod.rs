//! Hosting control-plane access: the `HostingApi` seam, the WebFaction
//! XML-RPC client behind it and the installer that drives it.

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

pub mod http;
pub mod installer;
pub mod webfaction;
pub mod xmlrpc;

pub const DEFAULT_API_URL: &str = "https://api.webfaction.com/";

/// Account used to authenticate against the hosting API.
#[derive(Clone)]
pub struct HostingCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
    pub server_name: String,
    pub api_url: String,
}

impl fmt::Debug for HostingCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostingCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_name", &self.server_name)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// A certificate resource as listed by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResource {
    pub id: Option<i64>,
    pub name: String,
    pub domains: Option<String>,
    pub expiry_date: Option<String>,
}

/// Certificate material to create or overwrite under `name`.
#[derive(Clone, Copy)]
pub struct CertificateUpload<'a> {
    pub name: &'a str,
    pub certificate: &'a str,
    pub private_key: &'a str,
    pub intermediates: &'a str,
}

impl fmt::Debug for CertificateUpload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateUpload")
            .field("name", &self.name)
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .field("intermediates_len", &self.intermediates.len())
            .finish()
    }
}

pub trait HostingApi {
    /// Opens a session. Rejected credentials are `HostingError::Authentication`.
    fn login(&mut self, credentials: &HostingCredentials) -> Result<(), HostingError>;
    fn is_authenticated(&self) -> bool;
    fn list_certificates(&mut self) -> Result<Vec<CertificateResource>, HostingError>;
    fn create_certificate(&mut self, upload: &CertificateUpload<'_>) -> Result<(), HostingError>;
    fn update_certificate(&mut self, upload: &CertificateUpload<'_>) -> Result<(), HostingError>;
}

#[derive(Error, Debug)]
pub enum HostingError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("not logged in; call login first")]
    NotLoggedIn,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("API fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("API error: {0}")]
    Api(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed API response: {0}")]
    Malformed(String),
}

impl HostingError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, HostingError::Authentication(_))
    }
}
