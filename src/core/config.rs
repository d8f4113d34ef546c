use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use zeroize::Zeroizing;

use crate::core::error::PipelineError;
use crate::core::types::DomainList;
use crate::domain::normalize_domain_list;
use crate::hosting::{DEFAULT_API_URL, HostingCredentials};
use crate::issuance::acme::KeySpec;
use crate::issuance::acme_workflow::LETSENCRYPT_PRODUCTION_DIRECTORY;
use crate::issuance::polling::{Backoff, DEFAULT_POLL_ATTEMPTS, PollPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PollBackoff {
    Fixed,
    Exponential,
}

#[derive(Parser, Debug)]
#[command(name = "letsencrypt_webfaction")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Contact address for the Let's Encrypt account
    #[arg(long, env = "LETSENCRYPT_WEBFACTION_ACCOUNT_EMAIL")]
    pub letsencrypt_account_email: Option<String>,

    /// Domains to include, comma-separated or repeated; the first is the common name
    #[arg(long, value_delimiter = ',', env = "LETSENCRYPT_WEBFACTION_DOMAINS")]
    pub domains: Vec<String>,

    /// Directories served for the domains; proofs are written there. Omit to publish manually
    #[arg(long, value_delimiter = ',', env = "LETSENCRYPT_WEBFACTION_PUBLIC")]
    pub public: Vec<PathBuf>,

    /// WebFaction API username
    #[arg(long, env = "WEBFACTION_USERNAME")]
    pub username: Option<String>,

    /// WebFaction API password
    #[arg(long, env = "WEBFACTION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// WebFaction server name, e.g. Web500
    #[arg(long, env = "WEBFACTION_SERVERNAME")]
    pub servername: Option<String>,

    /// Name of the certificate in the WebFaction control panel (default: first domain with '.' replaced by '_')
    #[arg(long, env = "LETSENCRYPT_WEBFACTION_CERT_NAME")]
    pub cert_name: Option<String>,

    /// Certificate key type
    #[arg(long, default_value = "rsa", env = "LETSENCRYPT_WEBFACTION_KEY_TYPE")]
    pub key_type: String,

    /// Certificate key size in bits (RSA: 2048, 3072, 4096; ECDSA: 256, 384)
    #[arg(long, env = "LETSENCRYPT_WEBFACTION_KEY_SIZE")]
    pub key_size: Option<u32>,

    /// ACME directory URL
    #[arg(long, default_value = LETSENCRYPT_PRODUCTION_DIRECTORY, env = "LETSENCRYPT_WEBFACTION_ENDPOINT")]
    pub endpoint: String,

    /// WebFaction XML-RPC endpoint
    #[arg(long, default_value = DEFAULT_API_URL, env = "LETSENCRYPT_WEBFACTION_API_URL")]
    pub api_url: String,

    /// JSON file holding ACME account credentials; created on first use
    #[arg(long, env = "LETSENCRYPT_WEBFACTION_ACCOUNT_CREDENTIALS")]
    pub account_credentials: Option<PathBuf>,

    /// Authorization polls per domain before giving up
    #[arg(long, default_value_t = DEFAULT_POLL_ATTEMPTS, env = "LETSENCRYPT_WEBFACTION_POLL_ATTEMPTS")]
    pub poll_attempts: u32,

    /// Seconds between authorization polls
    #[arg(long, default_value_t = 1, env = "LETSENCRYPT_WEBFACTION_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: u64,

    /// Delay growth between polls
    #[arg(long, value_enum, default_value_t = PollBackoff::Fixed, env = "LETSENCRYPT_WEBFACTION_POLL_BACKOFF")]
    pub poll_backoff: PollBackoff,

    /// Also write cert.pem, chain.pem, fullchain.pem and privkey.pem under <DIR>/<cert-name>/
    #[arg(long, env = "LETSENCRYPT_WEBFACTION_EXPORT_DIR")]
    pub export_dir: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,
}

/// How HTTP-01 proofs reach the web server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeMode {
    Webroot(Vec<PathBuf>),
    /// Print the proof and let the user serve it.
    Manual,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub contact_email: String,
    pub domains: DomainList,
    pub challenge_mode: ChallengeMode,
    pub credentials: HostingCredentials,
    pub cert_name: String,
    pub key_spec: KeySpec,
    pub directory_url: String,
    pub account_credentials: Option<PathBuf>,
    pub poll_policy: PollPolicy,
    pub export_dir: Option<PathBuf>,
}

impl Config {
    /// Validates every option; nothing here touches the network.
    pub fn from_cli(cli: &Cli) -> Result<Self, PipelineError> {
        let mut errors: Vec<String> = Vec::new();

        let contact_email = match required(&cli.letsencrypt_account_email, "letsencrypt-account-email") {
            Ok(email) if is_plausible_email(&email) => Some(email),
            Ok(email) => {
                errors.push(format!("{email:?} is not a valid email address"));
                None
            }
            Err(err) => {
                errors.push(err);
                None
            }
        };

        let domains = if cli.domains.iter().all(|d| d.trim().is_empty()) {
            errors.push("--domains is required".to_string());
            None
        } else {
            match normalize_domain_list(&cli.domains) {
                Ok(domains) => Some(domains),
                Err(err) => {
                    errors.push(format!("{err:#}"));
                    None
                }
            }
        };

        let challenge_mode = if cli.public.is_empty() {
            ChallengeMode::Manual
        } else {
            for root in &cli.public {
                if !root.is_dir() {
                    errors.push(format!("public directory {} does not exist", root.display()));
                }
            }
            ChallengeMode::Webroot(cli.public.clone())
        };

        let username = collect(required(&cli.username, "username"), &mut errors);
        let password = collect(required_secret(&cli.password, "password"), &mut errors);
        let server_name = collect(required(&cli.servername, "servername"), &mut errors);

        for (flag, url) in [("endpoint", &cli.endpoint), ("api-url", &cli.api_url)] {
            if let Err(err) = validate_url(url) {
                errors.push(format!("--{flag}: {err}"));
            }
        }

        let key_spec = collect(
            KeySpec::from_options(&cli.key_type, cli.key_size).map_err(|e| e.to_string()),
            &mut errors,
        );

        if cli.poll_attempts == 0 {
            errors.push("--poll-attempts must be at least 1".to_string());
        }

        let cert_name = match (&cli.cert_name, &domains) {
            (Some(name), _) => {
                let name = name.trim().to_string();
                if is_valid_cert_name(&name) {
                    Some(name)
                } else {
                    errors.push(format!(
                        "certificate name {name:?} may only contain letters, digits, '_' and '-'"
                    ));
                    None
                }
            }
            (None, Some(domains)) => Some(default_cert_name(domains.common_name())),
            (None, None) => None,
        };

        if !errors.is_empty() {
            return Err(PipelineError::Configuration(errors.join("; ")));
        }

        match (contact_email, domains, username, password, server_name, key_spec, cert_name) {
            (
                Some(contact_email),
                Some(domains),
                Some(username),
                Some(password),
                Some(server_name),
                Some(key_spec),
                Some(cert_name),
            ) => Ok(Config {
                contact_email,
                domains,
                challenge_mode,
                credentials: HostingCredentials {
                    username,
                    password: Zeroizing::new(password),
                    server_name,
                    api_url: cli.api_url.trim().to_string(),
                },
                cert_name,
                key_spec,
                directory_url: cli.endpoint.trim().to_string(),
                account_credentials: cli.account_credentials.clone(),
                poll_policy: PollPolicy {
                    max_attempts: cli.poll_attempts,
                    interval: Duration::from_secs(cli.poll_interval_secs),
                    backoff: match cli.poll_backoff {
                        PollBackoff::Fixed => Backoff::Fixed,
                        PollBackoff::Exponential => Backoff::Exponential,
                    },
                },
                export_dir: cli.export_dir.clone(),
            }),
            _ => Err(PipelineError::Configuration(
                "incomplete configuration".to_string(),
            )),
        }
    }
}

fn required(value: &Option<String>, flag: &str) -> Result<String, String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("--{flag} is required"))
}

/// Like `required`, but keeps surrounding whitespace: it may be part of the secret.
fn required_secret(value: &Option<String>, flag: &str) -> Result<String, String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("--{flag} is required"))
}

fn collect<T>(result: Result<T, String>, errors: &mut Vec<String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn validate_url(url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|e| format!("invalid URL {url:?}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported URL scheme {other:?}")),
    }
}

fn is_valid_cert_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn default_cert_name(common_name: &str) -> String {
    common_name.replace('.', "_")
}
