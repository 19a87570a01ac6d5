//! Host name resolution and normalization.
//!
//! The host is the second component of every metric path, so its spelling matters: the same
//! machine must always end up under the same path no matter how it was named by the caller.

use sysinfo::System;
use tracing::warn;

const FALLBACK_HOST: &str = "localhost";
const DEFAULT_GROUP_ROOT: &str = "systems";

/// Supplies the name of the local host.
///
/// Consulted whenever a data point is appended without a host, or with the host set to
/// `localhost`.
pub trait HostResolver: Send + Sync {
    /// Returns the name of the local host.
    fn host_name(&self) -> String;
}

/// Resolves the local host name from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHostResolver;

impl HostResolver for SystemHostResolver {
    fn host_name(&self) -> String {
        match System::host_name().filter(|name| !name.is_empty()) {
            Some(name) => name,
            None => {
                warn!(fallback = FALLBACK_HOST, "Failed to resolve the local host name.");
                FALLBACK_HOST.to_owned()
            }
        }
    }
}

/// Always resolves to the same, fixed host name.
#[derive(Clone, Debug)]
pub struct StaticHostResolver(String);

impl StaticHostResolver {
    /// Creates a new `StaticHostResolver` that resolves to `name`.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }
}

impl HostResolver for StaticHostResolver {
    fn host_name(&self) -> String {
        self.0.clone()
    }
}

/// Returns `true` if `host` should be replaced by the name of the local host.
pub(crate) fn is_local(host: &str) -> bool {
    host.is_empty() || host.eq_ignore_ascii_case(FALLBACK_HOST)
}

/// Strips the domain from a fully-qualified host name.
///
/// A host starting with a digit is assumed to be an IP address and is returned untouched, so
/// `db1.example.com` becomes `db1` while `10.0.0.5` stays as it is.
pub fn normalize_host(host: &str) -> &str {
    if host.starts_with(|c: char| c.is_ascii_digit()) {
        return host;
    }

    host.split('.').next().unwrap_or(host)
}

/// Returns the default group for a host: `systems.` followed by the first character of the host.
///
/// Keeping only one character keeps the number of branches directly under `systems` small.
pub fn default_group(host: &str) -> String {
    match host.chars().next() {
        Some(first) => format!("{DEFAULT_GROUP_ROOT}.{first}"),
        None => DEFAULT_GROUP_ROOT.to_owned(),
    }
}
