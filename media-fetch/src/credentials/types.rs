//! Core credential types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::domain::RequesterId;

/// Layer that provides credential material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialScope {
    /// Material supplied by one requester (highest priority).
    Requester { requester: RequesterId },
    /// Module-wide material shared by everyone.
    Global,
}

impl CredentialScope {
    pub fn requester(requester: RequesterId) -> Self {
        Self::Requester { requester }
    }

    /// Database representation: `global` or `requester:<id>`.
    pub fn as_db_key(&self) -> String {
        match self {
            Self::Requester { requester } => format!("requester:{requester}"),
            Self::Global => "global".to_string(),
        }
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_db_key())
    }
}

impl FromStr for CredentialScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Self::Global);
        }
        match s.strip_prefix("requester:") {
            Some(id) => Ok(Self::requester(id.parse()?)),
            None => Err(Error::validation(format!("invalid credential scope '{s}'"))),
        }
    }
}

/// Resolved credential material together with the layer it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSource {
    pub scope: CredentialScope,
    pub source_key: String,
    /// Netscape cookie jar contents.
    pub blob: String,
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("scope", &self.scope)
            .field("source_key", &self.source_key)
            .field("blob", &format_args!("<{} bytes>", self.blob.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_db_key_round_trip() {
        for scope in [
            CredentialScope::Global,
            CredentialScope::requester(RequesterId::new(99)),
        ] {
            assert_eq!(scope.as_db_key().parse::<CredentialScope>().unwrap(), scope);
        }
        assert!("team:1".parse::<CredentialScope>().is_err());
    }

    #[test]
    fn test_debug_hides_blob() {
        let source = CredentialSource {
            scope: CredentialScope::Global,
            source_key: "instagram".to_string(),
            blob: "sessionid=secret".to_string(),
        };
        let rendered = format!("{source:?}");
        assert!(!rendered.contains("secret"));
    }
}
