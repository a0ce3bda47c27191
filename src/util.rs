use std::net::Ipv4Addr;

/// Header carrying the agent's identity on registration and ingestion
pub const SERVICE_ID_HEADER: &str = "service-id";

const HUB_PORT: &str = "WATCHTOWER_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(HUB_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const HUB_ADDR: &str = "WATCHTOWER_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> Ipv4Addr {
    let addr_from_env = std::env::var(HUB_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

/// Validate an agent identity taken from a header value
///
/// Identities are opaque, but must be non-blank and free of control characters.
pub fn parse_service_id(raw: Option<&str>) -> Option<String> {
    let id = raw?.trim();
    if id.is_empty() || id.chars().any(char::is_control) {
        return None;
    }
    Some(id.to_string())
}
