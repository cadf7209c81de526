//! Free-text server id normalization.
//!
//! Users type either a registry id (`server-10-0-0-38`) or the address it
//! was derived from (`10.0.0.38`). These functions map between the two
//! spellings once, at the input boundary; the lifecycle manager itself only
//! does exact-match lookups.

use std::net::IpAddr;

/// Prefix of ids derived from an address.
pub const ID_PREFIX: &str = "server-";

/// Normalize user input into a registry id.
///
/// IP addresses become `server-` followed by the address with `.` and `:`
/// replaced by `-`. Anything else is returned trimmed and otherwise
/// unchanged.
///
/// ```
/// use server_manager::normalize::normalize_id;
///
/// assert_eq!(normalize_id("10.0.0.38"), "server-10-0-0-38");
/// assert_eq!(normalize_id(" server-10-0-0-38 "), "server-10-0-0-38");
/// assert_eq!(normalize_id("web"), "web");
/// ```
pub fn normalize_id(input: &str) -> String {
    let input = input.trim();
    match input.parse::<IpAddr>() {
        Ok(addr) => id_for_address(&addr),
        Err(_) => input.to_string(),
    }
}

/// Registry id for an address.
pub fn id_for_address(addr: &IpAddr) -> String {
    let flat: String = addr
        .to_string()
        .chars()
        .map(|c| if c == '.' || c == ':' { '-' } else { c })
        .collect();
    format!("{}{}", ID_PREFIX, flat)
}

/// Recover the IPv4 address an id was derived from, if it was.
///
/// ```
/// use server_manager::normalize::address_from_id;
///
/// assert_eq!(address_from_id("server-10-0-0-38").as_deref(), Some("10.0.0.38"));
/// assert_eq!(address_from_id("web"), None);
/// ```
pub fn address_from_id(id: &str) -> Option<String> {
    let rest = id.strip_prefix(ID_PREFIX)?;
    let octets: Vec<&str> = rest.split('-').collect();
    if octets.len() != 4 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
        return None;
    }
    Some(octets.join("."))
}

/// Ids to try, in order, for a piece of user input.
///
/// The normalized form comes first; the raw trimmed input follows when it
/// differs, so a registry that stores an address verbatim still resolves.
pub fn lookup_candidates(input: &str) -> Vec<String> {
    let raw = input.trim().to_string();
    let normalized = normalize_id(&raw);
    if normalized == raw {
        vec![normalized]
    } else {
        vec![normalized, raw]
    }
}
