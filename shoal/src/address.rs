//! Cluster member addresses
//!
//! Addresses are given as `"host:port"` strings, either one at a time or as
//! an ordered list. Parsing happens once, before any I/O, and the resulting
//! order is the order nodes are tracked in for the lifetime of a handle.

use crate::error::{Result, ShoalError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of a single replica-set member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterAddress {
    pub host: String,
    pub port: u16,
}

impl ClusterAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `"host:port"` string.
    ///
    /// The string must contain exactly one `:` and the part after it must be
    /// an unsigned integer that fits a port number.
    pub fn parse(address: &str) -> Result<Self> {
        let mut parts = address.split(':');
        let (host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) => (host, port),
            (_, None, _) => return Err(ShoalError::address(address, "missing ':' separator")),
            _ => return Err(ShoalError::address(address, "more than one ':' separator")),
        };

        if host.is_empty() {
            return Err(ShoalError::address(address, "empty host"));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| ShoalError::address(address, format!("invalid port: {}", e)))?;

        Ok(Self::new(host, port))
    }
}

impl FromStr for ClusterAddress {
    type Err = ShoalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ClusterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Seed list handed to `connect`: a single address or an ordered sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seeds {
    One(String),
    Many(Vec<String>),
}

impl Seeds {
    /// Parse every seed, preserving order. Fails on the first bad entry.
    pub fn parse(&self) -> Result<Vec<ClusterAddress>> {
        match self {
            Seeds::One(address) => Ok(vec![ClusterAddress::parse(address)?]),
            Seeds::Many(addresses) => addresses
                .iter()
                .map(|a| ClusterAddress::parse(a))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Seeds::One(_) => false,
            Seeds::Many(addresses) => addresses.is_empty(),
        }
    }
}

impl Default for Seeds {
    fn default() -> Self {
        Seeds::Many(Vec::new())
    }
}

impl From<&str> for Seeds {
    fn from(address: &str) -> Self {
        Seeds::One(address.to_string())
    }
}

impl From<String> for Seeds {
    fn from(address: String) -> Self {
        Seeds::One(address)
    }
}

impl From<Vec<String>> for Seeds {
    fn from(addresses: Vec<String>) -> Self {
        Seeds::Many(addresses)
    }
}

impl From<Vec<&str>> for Seeds {
    fn from(addresses: Vec<&str>) -> Self {
        Seeds::Many(addresses.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Seeds {
    fn from(addresses: &[&str]) -> Self {
        Seeds::Many(addresses.iter().map(|a| a.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Seeds {
    fn from(addresses: [&str; N]) -> Self {
        Seeds::Many(addresses.iter().map(|a| a.to_string()).collect())
    }
}
