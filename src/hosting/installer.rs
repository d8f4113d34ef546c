use log::info;

use crate::core::error::PipelineError;
use crate::core::types::CertificateBundle;

use super::{CertificateUpload, HostingApi, HostingCredentials};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    Created,
    Updated,
}

impl InstallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallAction::Created => "created",
            InstallAction::Updated => "updated",
        }
    }
}

/// Publishes issued certificates under a fixed name.
pub struct CertificateInstaller<'a> {
    credentials: &'a HostingCredentials,
}

impl<'a> CertificateInstaller<'a> {
    pub fn new(credentials: &'a HostingCredentials) -> Self {
        Self { credentials }
    }

    /// Creates the named certificate, or overwrites it in place when it
    /// already exists, so repeated runs never leave duplicates behind.
    pub fn install(
        &self,
        api: &mut dyn HostingApi,
        name: &str,
        bundle: &CertificateBundle,
    ) -> Result<InstallAction, PipelineError> {
        if !api.is_authenticated() {
            api.login(self.credentials)
                .map_err(|e| PipelineError::Installation(e.to_string()))?;
        }

        let existing = api
            .list_certificates()
            .map_err(|e| PipelineError::Installation(e.to_string()))?;
        let upload = CertificateUpload {
            name,
            certificate: &bundle.certificate_pem,
            private_key: &bundle.private_key_pem,
            intermediates: &bundle.chain_pem,
        };

        let action = if existing.iter().any(|cert| cert.name == name) {
            info!("[install] updating existing certificate {name}");
            api.update_certificate(&upload)
                .map_err(|e| PipelineError::Installation(e.to_string()))?;
            InstallAction::Updated
        } else {
            info!("[install] creating certificate {name}");
            api.create_certificate(&upload)
                .map_err(|e| PipelineError::Installation(e.to_string()))?;
            InstallAction::Created
        };

        info!("[install] certificate {name} {}", action.as_str());
        Ok(action)
    }
}
