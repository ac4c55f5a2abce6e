//! Skin URL validation
//!
//! MineSkin downloads the image itself, so there is no DNS lookup here. We only
//! reject URLs it can never fetch and enforce the optional prefix allow-list.

use crate::config::RestrictSkinUrlsConfig;
use crate::error::{AppError, AppResult, MineSkinError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Check if an IPv4 address is private or reserved
fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        // Shared address space (100.64.0.0/10)
        || (octets[0] == 100 && (64..=127).contains(&octets[1]))
}

/// Check if an IPv6 address is private or reserved
fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }

    let segments = ip.segments();
    // Link-local (fe80::/10)
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // Unique local (fc00::/7)
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }

    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&ipv4);
    }

    false
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

/// Quick syntactic check used to tell skin URLs apart from player names
pub fn looks_like_url(input: &str) -> bool {
    let lower = input.trim().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Validate a skin image URL before handing it to MineSkin
///
/// Rejections are reported as [`MineSkinError::InvalidSource`] so players see
/// the same message they would get from MineSkin itself.
pub fn validate_skin_url(url_str: &str, restrict: &RestrictSkinUrlsConfig) -> AppResult<Url> {
    let url_str = url_str.trim();
    let url = Url::parse(url_str).map_err(|e| {
        tracing::debug!("Rejected skin URL '{}': {}", url_str, e);
        AppError::MineSkin(MineSkinError::InvalidSource)
    })?;

    match url.scheme() {
        "https" | "http" => {}
        _ => return Err(MineSkinError::InvalidSource.into()),
    }

    match url.host() {
        None => return Err(MineSkinError::InvalidSource.into()),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local") {
                return Err(MineSkinError::InvalidSource.into());
            }
        }
        Some(Host::Ipv4(ip)) => {
            if is_private_ip(&IpAddr::V4(ip)) {
                return Err(MineSkinError::InvalidSource.into());
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_private_ip(&IpAddr::V6(ip)) {
                return Err(MineSkinError::InvalidSource.into());
            }
        }
    }

    if restrict.enabled
        && !restrict
            .allowed_prefixes
            .iter()
            .any(|prefix| url_str.starts_with(prefix.as_str()))
    {
        tracing::debug!("Skin URL '{}' is not on the allow-list", url_str);
        return Err(MineSkinError::InvalidSource.into());
    }

    Ok(url)
}
