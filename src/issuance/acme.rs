use anyhow::{Result, anyhow};
use log::info;
use openssl::{
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::PKey,
    rsa::Rsa,
};
use zeroize::Zeroizing;

use crate::core::error::PipelineError;
use crate::core::types::Registration;
use crate::issuance::issuer::Authority;

pub const DEFAULT_RSA_KEY_SIZE: u32 = 4096;

/// Algorithm and size of the certificate's private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Rsa(u32),
    EcdsaP256,
    EcdsaP384,
}

impl Default for KeySpec {
    fn default() -> Self {
        KeySpec::Rsa(DEFAULT_RSA_KEY_SIZE)
    }
}

impl KeySpec {
    /// Resolves `--key-type` / `--key-size` into a key spec.
    /// RSA accepts 2048, 3072 or 4096 bits; ECDSA accepts 256 or 384 (curve size).
    pub fn from_options(key_type: &str, key_size: Option<u32>) -> Result<Self> {
        match key_type.trim().to_ascii_lowercase().as_str() {
            "rsa" => {
                let size = key_size.unwrap_or(DEFAULT_RSA_KEY_SIZE);
                if !matches!(size, 2048 | 3072 | 4096) {
                    return Err(anyhow!(
                        "Unsupported RSA key size {size}. Allowed: 2048, 3072, 4096"
                    ));
                }
                Ok(KeySpec::Rsa(size))
            }
            "ecdsa" | "ec" => match key_size.unwrap_or(256) {
                256 => Ok(KeySpec::EcdsaP256),
                384 => Ok(KeySpec::EcdsaP384),
                other => Err(anyhow!(
                    "Unsupported ECDSA key size {other}. Allowed: 256, 384"
                )),
            },
            other => Err(anyhow!(
                "Unsupported key type {other:?}. Allowed: rsa, ecdsa"
            )),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            KeySpec::Rsa(bits) => format!("RSA {bits}"),
            KeySpec::EcdsaP256 => "ECDSA P-256".to_string(),
            KeySpec::EcdsaP384 => "ECDSA P-384".to_string(),
        }
    }
}

/// Generates a certificate private key and returns it as PKCS#8 PEM.
pub fn generate_private_key(spec: &KeySpec) -> Result<Zeroizing<String>> {
    let key = match spec {
        KeySpec::Rsa(bits) => {
            let rsa = Rsa::generate(*bits)
                .map_err(|e| anyhow!("failed to generate RSA key: {e}"))?;
            PKey::from_rsa(rsa).map_err(|e| anyhow!("failed to wrap RSA key: {e}"))?
        }
        KeySpec::EcdsaP256 | KeySpec::EcdsaP384 => {
            let nid = if *spec == KeySpec::EcdsaP256 {
                Nid::X9_62_PRIME256V1
            } else {
                Nid::SECP384R1
            };
            let group = EcGroup::from_curve_name(nid)
                .map_err(|e| anyhow!("failed to load EC curve: {e}"))?;
            let ec = EcKey::generate(&group)
                .map_err(|e| anyhow!("failed to generate EC key: {e}"))?;
            PKey::from_ec_key(ec).map_err(|e| anyhow!("failed to wrap EC key: {e}"))?
        }
    };

    let key_pem = Zeroizing::new(
        key.private_key_to_pem_pkcs8()
            .map_err(|e| anyhow!("failed to serialize private key: {e}"))?,
    );

    String::from_utf8(key_pem.to_vec())
        .map(Zeroizing::new)
        .map_err(|_| anyhow!("private key PEM contained invalid UTF-8"))
}

/// Registers the run's account key and records terms agreement.
///
/// An account that already exists for the key is a success. Terms agreement
/// is invoked exactly once on the returned registration. Nothing is retried.
pub fn register_account(
    authority: &mut dyn Authority,
    contact_email: &str,
) -> Result<Registration, PipelineError> {
    let registration = authority
        .register(contact_email)
        .map_err(|e| PipelineError::Registration(e.to_string()))?;

    if registration.created {
        info!("[acme] registered new account for {contact_email}");
    } else {
        info!("[acme] using existing account for {contact_email}");
    }

    authority
        .agree_terms(&registration)
        .map_err(|e| PipelineError::Registration(e.to_string()))?;
    info!("[acme] terms of service agreed");

    Ok(registration)
}
