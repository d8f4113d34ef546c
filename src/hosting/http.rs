use std::sync::OnceLock;
use std::time::Duration;

use log::warn;
use reqwest::StatusCode;
use reqwest::blocking::Client;

use super::HostingError;

const TIMEOUT_ENV: &str = "LETSENCRYPT_WEBFACTION_HTTP_TIMEOUT_SECS";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub struct HttpClient;

impl HttpClient {
    pub fn shared() -> &'static Client {
        static CLIENT: OnceLock<Client> = OnceLock::new();
        CLIENT.get_or_init(|| {
            let timeout = resolve_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref());
            reqwest::blocking::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("letsencrypt-webfaction/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|err| {
                    warn!("[hosting-http] failed to build shared client: {err}");
                    reqwest::blocking::Client::new()
                })
        })
    }
}

fn resolve_timeout(raw: Option<&str>) -> Duration {
    let timeout = raw
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout == 0 {
        warn!("[hosting-http] invalid timeout value; using default");
        return Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    }
    Duration::from_secs(timeout)
}

pub fn status_error(status: StatusCode, body: Option<String>) -> HostingError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return HostingError::Authentication(format!("hosting API returned {status}"));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return HostingError::RateLimited;
    }
    match body.filter(|body| !body.trim().is_empty()) {
        Some(body) => HostingError::Api(format!("{status}: {body}")),
        None => HostingError::Api(status.to_string()),
    }
}
