use anyhow::{Result, anyhow};

use crate::core::types::DomainList;

pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }
    if trimmed.starts_with("*.") {
        return Err(anyhow!(
            "wildcard domain {trimmed} cannot be validated with an HTTP-01 challenge"
        ));
    }
    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|err| anyhow!("invalid domain name {trimmed}: {err}"))?;
    if !ascii.contains('.') {
        return Err(anyhow!("domain name {trimmed} must be fully qualified"));
    }
    Ok(ascii.to_lowercase())
}

/// Normalizes the requested domains, keeping the caller's order and dropping
/// repeats so the first entry stays the certificate's common name.
pub fn normalize_domain_list<S: AsRef<str>>(raw: &[S]) -> Result<DomainList> {
    let mut normalized: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let entry = entry.as_ref();
        if entry.trim().is_empty() {
            continue;
        }
        normalized.push(normalize_domain(entry)?);
    }

    DomainList::new(normalized).ok_or_else(|| anyhow!("at least one domain is required"))
}

pub fn normalize_domain_for_display(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('.');
    let (unicode, _) = idna::domain_to_unicode(trimmed);
    unicode.to_lowercase()
}
