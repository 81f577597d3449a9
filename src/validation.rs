//! Input validation and sanitization
//!
//! Forward names end up inside iptables comments, pf anchor names, Windows
//! firewall rule names and one `sh -c` pipeline, so everything that reaches a
//! backend is checked here first.

use crate::error::{NetmgrError, NetmgrResult};
use std::net::IpAddr;

/// Maximum length for forward names
const MAX_FORWARD_NAME_LEN: usize = 64;

/// Maximum length for service names used in place of a port number
const MAX_SERVICE_NAME_LEN: usize = 32;

/// Maximum length for error output carried into log lines
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Validate a forward name
///
/// Names must be alphanumeric with optional dashes, dots and underscores.
pub fn validate_forward_name(name: &str) -> NetmgrResult<()> {
    if name.is_empty() {
        return Err(NetmgrError::InvalidParameter(
            "Forward name cannot be empty".to_string()
        ));
    }

    if name.len() > MAX_FORWARD_NAME_LEN {
        return Err(NetmgrError::InvalidParameter(
            format!("Forward name too long (max {} characters)", MAX_FORWARD_NAME_LEN)
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(NetmgrError::InvalidParameter(
                format!("Invalid forward name '{}': contains invalid character '{}'", name, c)
            ));
        }
    }

    // Could be interpreted as an option by the backend tools
    if name.starts_with('-') {
        return Err(NetmgrError::InvalidParameter(
            "Forward name cannot start with dash".to_string()
        ));
    }

    Ok(())
}

/// Validate a port given either numerically or as a service name (`http`, `ssh`)
pub fn validate_port(port: &str) -> NetmgrResult<()> {
    if port.is_empty() {
        return Err(NetmgrError::InvalidParameter(
            "Port cannot be empty".to_string()
        ));
    }

    if port.chars().all(|c| c.is_ascii_digit()) {
        return match port.parse::<u16>() {
            Ok(0) | Err(_) => Err(NetmgrError::InvalidParameter(
                format!("Port out of range (1-65535): {}", port)
            )),
            Ok(_) => Ok(()),
        };
    }

    if port.len() > MAX_SERVICE_NAME_LEN {
        return Err(NetmgrError::InvalidParameter(
            format!("Service name too long: {}", port)
        ));
    }

    let valid_service = port.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !port.starts_with('-')
        && port.chars().any(|c| c.is_ascii_alphabetic());

    if !valid_service {
        return Err(NetmgrError::InvalidParameter(
            format!("Invalid port or service name: {}", port)
        ));
    }

    Ok(())
}

/// Validate IP address
pub fn validate_ip_address(addr: &str) -> NetmgrResult<IpAddr> {
    addr.parse::<IpAddr>()
        .map_err(|_| NetmgrError::InvalidParameter(
            format!("Invalid IP address: {}", addr)
        ))
}

/// Validate a forward destination (IP address or hostname)
pub fn validate_hostname(host: &str) -> NetmgrResult<()> {
    if host.is_empty() {
        return Err(NetmgrError::InvalidParameter(
            "Hostname cannot be empty".to_string()
        ));
    }

    if host.len() > 253 {
        return Err(NetmgrError::InvalidParameter(
            "Hostname too long".to_string()
        ));
    }

    if validate_ip_address(host).is_ok() {
        return Ok(());
    }

    for c in host.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '.' {
            return Err(NetmgrError::InvalidParameter(
                format!("Invalid hostname character: {}", c)
            ));
        }
    }

    if host.starts_with('-') || host.starts_with('.') ||
       host.ends_with('-') || host.ends_with('.') {
        return Err(NetmgrError::InvalidParameter(
            "Invalid hostname format".to_string()
        ));
    }

    Ok(())
}

/// Truncate captured tool output before it goes into a log line or error
pub fn sanitize_error_message(stderr: &str) -> String {
    let trimmed = stderr.trim();

    if trimmed.len() <= MAX_ERROR_MESSAGE_LEN {
        return trimmed.to_string();
    }

    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }

    let mut sanitized = trimmed[..end].to_string();
    sanitized.push_str("... (truncated)");
    sanitized
}
