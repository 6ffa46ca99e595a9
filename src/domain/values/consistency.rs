use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Read-after-write visibility the backend must honour for a search.
///
/// Forwarded verbatim; the store never downgrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    #[default]
    Strong,
    Session,
    Bounded,
    Eventually,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::Bounded => "Bounded",
            ConsistencyLevel::Eventually => "Eventually",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strong" => Ok(ConsistencyLevel::Strong),
            "session" => Ok(ConsistencyLevel::Session),
            "bounded" => Ok(ConsistencyLevel::Bounded),
            "eventually" => Ok(ConsistencyLevel::Eventually),
            _ => Err(format!("Unknown consistency level: {s}")),
        }
    }
}
