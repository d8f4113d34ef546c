use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};

use crate::core::types::IssuanceChallenge;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Directory, relative to a webroot, the authority fetches HTTP-01 proofs from.
pub const ACME_CHALLENGE_DIR: &str = ".well-known/acme-challenge";

/// Where a proof has to be reachable and what it must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeInstruction {
    pub publisher: String,
    pub domain: String,
    /// Request path, e.g. `/.well-known/acme-challenge/<token>`.
    pub path: String,
    pub url: String,
    pub content: String,
}

pub trait ChallengePublisher {
    fn id(&self) -> &'static str;
    fn publish(&self, challenge: &IssuanceChallenge) -> Result<ChallengeInstruction>;
    fn cleanup(&self, _challenge: &IssuanceChallenge) -> Result<()> {
        Ok(())
    }
}

pub fn challenge_path(token: &str) -> String {
    format!("/{ACME_CHALLENGE_DIR}/{token}")
}

pub fn instruction_for(publisher: &str, challenge: &IssuanceChallenge) -> ChallengeInstruction {
    let path = challenge_path(&challenge.token);
    ChallengeInstruction {
        publisher: publisher.to_string(),
        domain: challenge.domain.clone(),
        url: format!("http://{}{}", challenge.domain, path),
        path,
        content: challenge.key_authorization.clone(),
    }
}

/// Tokens are base64url; anything else could escape the challenge directory.
fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow!("challenge token is empty"));
    }
    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!("challenge token {token:?} is not base64url"));
    }
    Ok(())
}

/// Writes proofs into one or more directories served by the user's web server.
pub struct WebrootPublisher {
    roots: Vec<PathBuf>,
}

impl WebrootPublisher {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn proof_file(root: &Path, token: &str) -> PathBuf {
        root.join(ACME_CHALLENGE_DIR).join(token)
    }
}

impl ChallengePublisher for WebrootPublisher {
    fn id(&self) -> &'static str {
        "webroot"
    }

    fn publish(&self, challenge: &IssuanceChallenge) -> Result<ChallengeInstruction> {
        validate_token(&challenge.token)?;
        if self.roots.is_empty() {
            return Err(anyhow!("no webroot directories configured"));
        }
        for root in &self.roots {
            let dir = root.join(ACME_CHALLENGE_DIR);
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let file_path = Self::proof_file(root, &challenge.token);
            write_proof_file(&file_path, challenge.key_authorization.as_bytes())?;
            debug!(
                "[challenge] wrote proof for {} to {}",
                challenge.domain,
                file_path.display()
            );
        }
        Ok(instruction_for(self.id(), challenge))
    }

    fn cleanup(&self, challenge: &IssuanceChallenge) -> Result<()> {
        validate_token(&challenge.token)?;
        let mut errors = Vec::new();
        for root in &self.roots {
            let file_path = Self::proof_file(root, &challenge.token);
            match fs::remove_file(&file_path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => errors.push(format!("{}: {err}", file_path.display())),
            }
        }
        if !errors.is_empty() {
            return Err(anyhow!(
                "failed to remove {} proof file(s): {}",
                errors.len(),
                errors.join(", ")
            ));
        }
        Ok(())
    }
}

/// The web server must be able to read the proof, so it is written 0644.
fn write_proof_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(0o644);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open proof file {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    #[cfg(unix)]
    {
        // The umask may have narrowed the creation mode.
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).with_context(|| {
            format!("failed to make {} readable by the web server", path.display())
        })?;
    }
    Ok(())
}

/// Prints where the proof must be published; the user serves it themselves.
pub struct ManualPublisher;

impl ManualPublisher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ManualPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengePublisher for ManualPublisher {
    fn id(&self) -> &'static str {
        "manual"
    }

    fn publish(&self, challenge: &IssuanceChallenge) -> Result<ChallengeInstruction> {
        validate_token(&challenge.token)?;
        let instruction = instruction_for(self.id(), challenge);
        info!(
            "[challenge] no webroot configured for {}; publish the proof manually",
            challenge.domain
        );
        println!(
            "Serve the following content at {}\n  path:    {}\n  content: {}",
            instruction.url, instruction.path, instruction.content
        );
        Ok(instruction)
    }
}
