//! Trusted-subnet origin filtering.

use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Result, VigilError};

/// Header carrying the client's declared origin address.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// RPC metadata key for the declared origin address.
pub const REAL_IP_METADATA: &str = "x-real-ip";

/// A CIDR block that requests must originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    net: IpNet,
}

impl TrustedSubnet {
    /// Parse an optional subnet setting; empty means the check is disabled.
    pub fn parse_optional(raw: &str) -> Result<Option<Self>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.net.contains(&ip)
    }

    /// Check a declared origin. Missing or malformed origins are rejected.
    pub fn check(&self, origin: Option<&str>) -> Result<IpAddr> {
        let raw = origin.map(str::trim).unwrap_or_default();
        let ip: IpAddr = raw
            .parse()
            .map_err(|_| VigilError::InvalidOrigin { origin: raw.to_string() })?;
        if self.contains(ip) {
            Ok(ip)
        } else {
            Err(VigilError::UntrustedOrigin { origin: ip.to_string() })
        }
    }
}

impl FromStr for TrustedSubnet {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        let net = IpNet::from_str(s.trim()).map_err(|e| VigilError::InvalidConfig {
            reason: format!("trusted subnet {:?}: {}", s, e),
        })?;
        Ok(Self { net })
    }
}

impl std::fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.net.fmt(f)
    }
}
