use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::info;
use pem::Pem;

use crate::core::types::CertificateBundle;

#[cfg(not(unix))]
use log::warn;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

const CERT_FILENAME: &str = "cert.pem";
const CHAIN_FILENAME: &str = "chain.pem";
const FULLCHAIN_FILENAME: &str = "fullchain.pem";
const PRIVKEY_FILENAME: &str = "privkey.pem";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub label: &'static str,
    pub path: PathBuf,
}

/// Writes the bundle to `<destination_dir>/<folder_name>/`, replacing files
/// from earlier runs. `chain.pem` is only written when intermediates exist.
pub fn export_pem_bundle(
    bundle: &CertificateBundle,
    destination_dir: &Path,
    folder_name: &str,
) -> Result<Vec<ExportedFile>> {
    validate_folder_name(folder_name)?;
    let output_dir = destination_dir.join(folder_name);
    fs::create_dir_all(&output_dir).with_context(|| {
        format!(
            "failed to create export directory at {}",
            output_dir.display()
        )
    })?;

    let mut targets: Vec<(&'static str, &str, String)> = vec![(
        "cert",
        CERT_FILENAME,
        bundle.certificate_pem.clone(),
    )];
    if !bundle.chain_pem.is_empty() {
        targets.push(("chain", CHAIN_FILENAME, bundle.chain_pem.clone()));
    } else {
        remove_stale(&output_dir.join(CHAIN_FILENAME))?;
    }
    targets.push(("fullchain", FULLCHAIN_FILENAME, bundle.fullchain_pem()));

    let mut files = Vec::with_capacity(targets.len() + 1);
    for (label, filename, content) in targets {
        let path = output_dir.join(filename);
        write_secure_file(&path, content.as_bytes())?;
        files.push(ExportedFile { label, path });
    }

    let key_path = output_dir.join(PRIVKEY_FILENAME);
    write_secure_file(&key_path, bundle.private_key_pem.as_bytes())?;
    files.push(ExportedFile {
        label: "privkey",
        path: key_path,
    });

    info!(
        "[export] wrote {} file(s) to {}",
        files.len(),
        output_dir.display()
    );
    Ok(files)
}

/// Splits a PEM chain into the leaf and the concatenated intermediates.
/// The intermediates string is empty when the chain holds a single certificate.
pub(crate) fn split_certificate_chain(chain_pem: &str) -> Result<(String, String)> {
    let blocks = pem::parse_many(chain_pem)
        .map_err(|err| anyhow!("failed to parse certificate chain PEM: {err}"))?;
    let cert_blocks: Vec<Pem> = blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .collect();

    if cert_blocks.is_empty() {
        return Err(anyhow!("no certificate PEM blocks found"));
    }

    let mut encoded = cert_blocks.iter().map(pem::encode);
    let leaf = encoded
        .next()
        .ok_or_else(|| anyhow!("no certificate PEM blocks found"))?;
    let chain_only: String = encoded.collect();
    Ok((leaf, chain_only))
}

pub(crate) fn validate_folder_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("folder name cannot be empty"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(anyhow!("folder name must be a single path segment")),
    }
}

/// Creates or truncates `path` with owner-only permissions.
pub(crate) fn write_secure_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    ensure_permissions(path)?;
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove stale {}", path.display())),
    }
}

fn ensure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let desired = fs::Permissions::from_mode(0o600);
        let metadata = fs::metadata(path)?;
        let current = metadata.permissions();
        if current.mode() & 0o777 != 0o600 {
            fs::set_permissions(path, desired).with_context(|| {
                format!(
                    "failed to set restrictive permissions on {}",
                    path.display()
                )
            })?;
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = fs::metadata(path) {
            warn!(
                "[export] warning: unable to confirm permissions for {}: {}",
                path.display(),
                err
            );
        }
    }
    Ok(())
}
