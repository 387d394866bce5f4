//! Input checks that run before any store call.

use std::net::Ipv4Addr;

use super::{BrowserError, BrowserResult};

const BUCKET_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=63;

fn invalid_bucket(name: &str, reason: &str) -> BrowserError {
    BrowserError::Validation(format!("Invalid bucket name `{name}`: {reason}"))
}

/// S3 bucket naming rules:
/// - 3 to 63 characters
/// - lowercase letters, digits, dots and hyphens
/// - starts and ends with a letter or digit
/// - no `..`, `.-` or `-.`
/// - not an IPv4 address
pub fn ensure_bucket_name(name: &str) -> BrowserResult<()> {
    if !BUCKET_NAME_LEN.contains(&name.len()) {
        return Err(invalid_bucket(name, "must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid_bucket(
            name,
            "only lowercase letters, digits, dots and hyphens are allowed",
        ));
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().next_back()) {
        return Err(invalid_bucket(
            name,
            "must start and end with a lowercase letter or digit",
        ));
    }
    if ["..", ".-", "-."].iter().any(|bad| name.contains(bad)) {
        return Err(invalid_bucket(
            name,
            "must not contain adjacent dots or dot-hyphen pairs",
        ));
    }
    if looks_like_ipv4(name) {
        return Err(invalid_bucket(name, "must not be formatted as an IP address"));
    }
    Ok(())
}

fn looks_like_ipv4(name: &str) -> bool {
    name.split('.').count() == 4 && name.parse::<Ipv4Addr>().is_ok()
}

pub fn ensure_bucket_present(bucket: &str) -> BrowserResult<()> {
    if bucket.trim().is_empty() {
        return Err(BrowserError::Validation("Bucket name is required".into()));
    }
    Ok(())
}

pub fn ensure_key_present(key: &str) -> BrowserResult<()> {
    if key.is_empty() {
        return Err(BrowserError::Validation("Object key is required".into()));
    }
    Ok(())
}
