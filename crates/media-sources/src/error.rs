use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The locator contains a character from the disallowed set.
    #[error("locator rejected: disallowed character {0:?}")]
    SecurityRejection(char),
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
}

impl RouteError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidLocator(msg.into())
    }
}
