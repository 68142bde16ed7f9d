//! Authorization scope
//!
//! A [`ScopeDefinition`] lists the domains and IP networks an audit may touch.
//! [`ScopeValidator`] answers whether a single target string falls inside it.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{ReconError, Result};

/// Immutable authorization policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeDefinition {
    domains: Vec<String>,
    ip_ranges: Vec<IpNetwork>,
}

impl ScopeDefinition {
    /// Build a scope from raw domain and CIDR strings.
    ///
    /// Domains are normalized (trimmed, lower-cased, `*.` turned into a
    /// leading-dot suffix). Empty entries are skipped. Any CIDR that does not
    /// parse fails the whole construction.
    pub fn new<D, R>(domains: &[D], ip_ranges: &[R]) -> Result<Self>
    where
        D: AsRef<str>,
        R: AsRef<str>,
    {
        let mut normalized = Vec::with_capacity(domains.len());
        for raw in domains {
            if let Some(domain) = normalize_domain(raw.as_ref())? {
                if !normalized.contains(&domain) {
                    normalized.push(domain);
                }
            }
        }

        let mut networks = Vec::with_capacity(ip_ranges.len());
        for raw in ip_ranges {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let network: IpNetwork = raw
                .parse()
                .map_err(|e: ipnetwork::IpNetworkError| ReconError::invalid_scope(raw, e.to_string()))?;
            networks.push(network);
        }

        Ok(Self {
            domains: normalized,
            ip_ranges: networks,
        })
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn ip_ranges(&self) -> &[IpNetwork] {
        &self.ip_ranges
    }

    /// True when nothing at all is authorized
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.ip_ranges.is_empty()
    }
}

fn normalize_domain(raw: &str) -> Result<Option<String>> {
    let mut domain = raw.trim().to_lowercase();
    if domain.is_empty() {
        return Ok(None);
    }
    if let Some(rest) = domain.strip_prefix("*.") {
        domain = format!(".{}", rest);
    }
    if domain == "." || domain.contains(char::is_whitespace) || domain.contains('/') {
        return Err(ReconError::invalid_scope(raw, "not a domain or domain suffix"));
    }
    Ok(Some(domain))
}

/// Decides whether targets are authorized under a [`ScopeDefinition`]
#[derive(Debug, Clone)]
pub struct ScopeValidator {
    scope: ScopeDefinition,
}

impl ScopeValidator {
    pub fn new(scope: ScopeDefinition) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &ScopeDefinition {
        &self.scope
    }

    /// Check a host, IP or URL against the scope.
    ///
    /// IP literals are only checked against the networks; everything else
    /// only against the domains. Suffix entries always start with `.`, so a
    /// suffix match is anchored on a label boundary.
    pub fn validate(&self, target: &str) -> bool {
        let host = bare_host(target);
        if host.is_empty() {
            return false;
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.scope.ip_ranges.iter().any(|network| network.contains(ip));
        }

        self.scope.domains.iter().any(|domain| {
            *domain == host || (domain.starts_with('.') && host.ends_with(domain.as_str()))
        })
    }
}

/// Reduce a target to its host part.
///
/// Strips scheme, userinfo, path, query, fragment and port. Bracketed IPv6
/// literals lose their brackets; unbracketed IPv6 literals are kept intact.
pub fn bare_host(target: &str) -> String {
    let target = target.trim();
    let rest = match target.split_once("//") {
        Some((_, rest)) => rest,
        None => target,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = match authority.rsplit_once('@') {
        Some((_, host)) => host,
        None => authority,
    };

    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        match authority.split_once(':') {
            Some((host, port))
                if !port.contains(':') && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) =>
            {
                host
            }
            _ => authority,
        }
    };

    host.trim_end_matches('.').to_lowercase()
}
