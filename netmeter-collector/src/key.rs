//! Aggregation keys.
//!
//! A key identifies the bucket that same-key snapshots are merged into.
//! Equality is value based, so two producers reporting the same remote
//! address end up in the same bucket.
//!
//! `key_id` is injective over valid keys of one type: two different keys
//! never render to the same id, so one metric name always means one bucket.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use netmeter_common::{Error, Result};

/// Behavior shared by every aggregation key.
pub trait MetricKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Check that the key can be encoded into a metric name.
    fn validate(&self) -> Result<()>;

    /// Stable string identity of the key, embedded in emitted metric names.
    fn key_id(&self) -> String;
}

/// A network socket address: an inet host and port, or a domain socket path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketAddress {
    host: String,
    /// `None` for domain sockets, where `host` holds the path.
    port: Option<u16>,
}

impl SocketAddress {
    /// Create an inet socket address.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let addr = Self {
            host: host.into(),
            port: Some(port),
        };
        addr.validate()?;
        Ok(addr)
    }

    /// Create a domain socket address from a filesystem path.
    pub fn domain(path: impl Into<String>) -> Result<Self> {
        let addr = Self {
            host: path.into(),
            port: None,
        };
        addr.validate()?;
        Ok(addr)
    }

    /// Parse `host:port`, accepting bracketed IPv6 hosts (`[::1]:8080`).
    pub fn parse(s: &str) -> Result<Self> {
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            rest.split_once("]:")
                .ok_or_else(|| Error::invalid_key(format!("Malformed IPv6 address: '{}'", s)))?
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| Error::invalid_key(format!("Missing port in address: '{}'", s)))?
        };

        let port = port
            .parse::<u16>()
            .map_err(|e| Error::invalid_key(format!("Invalid port in '{}': {}", s, e)))?;

        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_domain_socket(&self) -> bool {
        self.port.is_none()
    }

    /// Same address with the host replaced, keeping the port.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: self.port,
        }
    }
}

impl MetricKey for SocketAddress {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::invalid_key("Socket address host must not be empty"));
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(Error::invalid_key(format!(
                "Socket address host contains whitespace: '{}'",
                self.host
            )));
        }
        match self.port {
            // Brackets are reserved for rendering IPv6 hosts.
            Some(_) if self.host.contains(['[', ']']) => Err(Error::invalid_key(format!(
                "Socket address host must not contain brackets: '{}'",
                self.host
            ))),
            // Every inet id contains ':', so paths must not.
            None if self.host.contains(':') => Err(Error::invalid_key(format!(
                "Domain socket path must not contain ':': '{}'",
                self.host
            ))),
            _ => Ok(()),
        }
    }

    fn key_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}", self.host, port),
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

impl From<std::net::SocketAddr> for SocketAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: Some(addr.port()),
        }
    }
}

/// Identity of a worker or connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pool_type: String,
    name: String,
}

impl PoolKey {
    pub fn new(pool_type: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let key = Self {
            pool_type: pool_type.into(),
            name: name.into(),
        };
        key.validate()?;
        Ok(key)
    }

    pub fn pool_type(&self) -> &str {
        &self.pool_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MetricKey for PoolKey {
    fn validate(&self) -> Result<()> {
        if self.pool_type.trim().is_empty() || self.name.trim().is_empty() {
            return Err(Error::invalid_key(format!(
                "Pool type and name must not be empty (type: '{}', name: '{}')",
                self.pool_type, self.name
            )));
        }
        // The id splits at the first '.', so only the name may contain one.
        if self.pool_type.contains('.') {
            return Err(Error::invalid_key(format!(
                "Pool type must not contain '.': '{}'",
                self.pool_type
            )));
        }
        Ok(())
    }

    fn key_id(&self) -> String {
        format!("{}.{}", self.pool_type, self.name)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_id())
    }
}
