use anyhow::{Result, anyhow};
use log::info;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use zeroize::Zeroizing;

use crate::core::error::PipelineError;
use crate::core::types::{CertificateBundle, DomainList};
use crate::distribution::export::split_certificate_chain;
use crate::issuance::acme::{KeySpec, generate_private_key};
use crate::issuance::issuer::Authority;

/// Builds a DER-encoded CSR whose SANs are exactly `domains`, in order, and
/// whose common name is the first domain.
pub fn build_csr(domains: &DomainList, private_key_pem: &str) -> Result<Vec<u8>> {
    let mut params = CertificateParams::new(domains.as_slice().to_vec())
        .map_err(|e| anyhow!("invalid certificate subject names: {e}"))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, domains.common_name());
    params.distinguished_name = dn;

    let key_pair = KeyPair::from_pem(private_key_pem)
        .map_err(|e| anyhow!("failed to load certificate key: {e}"))?;
    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| anyhow!("failed to build CSR: {e}"))?;
    Ok(csr.der().to_vec())
}

pub struct CertificateRequester {
    key_spec: KeySpec,
}

impl CertificateRequester {
    pub fn new(key_spec: KeySpec) -> Self {
        Self { key_spec }
    }

    /// Generates the certificate key, submits one CSR and returns the issued bundle.
    /// Any failure, including rejection by the authority, is final.
    pub fn issue(
        &self,
        domains: &DomainList,
        authority: &mut dyn Authority,
    ) -> Result<CertificateBundle, PipelineError> {
        info!(
            "[issue] requesting certificate for {domains} with a {} key",
            self.key_spec.describe()
        );
        let private_key_pem: Zeroizing<String> = generate_private_key(&self.key_spec)
            .map_err(|e| PipelineError::Issuance(format!("{e:#}")))?;
        let csr = build_csr(domains, &private_key_pem)
            .map_err(|e| PipelineError::Issuance(format!("{e:#}")))?;

        let chain_pem = authority
            .issue(&csr)
            .map_err(|e| PipelineError::Issuance(e.to_string()))?;
        let (certificate_pem, intermediates_pem) = split_certificate_chain(&chain_pem)
            .map_err(|e| PipelineError::Issuance(format!("authority returned an unusable chain: {e:#}")))?;

        Ok(CertificateBundle {
            certificate_pem,
            chain_pem: intermediates_pem,
            private_key_pem,
        })
    }
}
