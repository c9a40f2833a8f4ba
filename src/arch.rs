//! The target environments and slice roles a package can be compiled for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A target environment a slice is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Client,
    Server,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::Client, Arch::Server];

    pub const fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The purpose a slice serves: production use, or the package's own test suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Use,
    Test,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
