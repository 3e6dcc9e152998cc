use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Central coordinator that other nodes register with
    Portal,
    /// Regular media server instance
    #[default]
    Instance,
    /// Auxiliary service (e.g. a vision or transcoding worker)
    Service,
}

impl NodeRole {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Portal => "portal",
            Self::Instance => "instance",
            Self::Service => "service",
        }
    }

    /// Returns true for roles that join a Portal
    #[must_use]
    pub const fn can_join(self) -> bool {
        !matches!(self, Self::Portal)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown node role: {:?}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for NodeRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portal" => Ok(Self::Portal),
            "instance" | "app" => Ok(Self::Instance),
            "service" => Ok(Self::Service),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
