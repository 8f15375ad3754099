//! Engine endpoint parsing.

use nodefleet_core::EngineError;

/// Port assumed when an endpoint omits one.
pub const DEFAULT_ENGINE_PORT: u16 = 2375;

/// A plain-HTTP engine endpoint, reduced to `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    authority: String,
}

impl Endpoint {
    /// Parse `tcp://host:port`, `http://host:port` or `host:port`.
    ///
    /// TLS and unix socket endpoints are rejected.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let invalid = |why: &str| EngineError::InvalidEndpoint(format!("{raw}: {why}"));

        let trimmed = raw.trim();
        let rest = match trimmed.split_once("://") {
            Some(("tcp" | "http", rest)) => rest,
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme {scheme}"))),
            None => trimmed,
        };
        let authority = rest.trim_end_matches('/');
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }
        if authority.contains('/') {
            return Err(invalid("unexpected path"));
        }

        let authority = match authority.rsplit_once(':') {
            // Bracketed IPv6 without a port ends in ']'.
            Some((host, port)) if !port.ends_with(']') => {
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                port.parse::<u16>()
                    .map_err(|_| invalid(&format!("invalid port {port}")))?;
                authority.to_string()
            }
            _ => format!("{authority}:{DEFAULT_ENGINE_PORT}"),
        };
        Ok(Self { authority })
    }

    /// `host:port`, as used for connecting and for the `Host` header.
    pub fn authority(&self) -> &str {
        &self.authority
    }
}
