//! Classification of captured fetch engine error text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse class of a fetch failure, derived from the captured error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    AuthRequired,
    TooLarge,
    Unsupported,
    Transient,
    Timeout,
    Unknown,
}

/// Marker substrings, matched case-insensitively. Evaluated in order, first hit wins.
const MARKERS: &[(ErrorClassification, &[&str])] = &[
    (
        ErrorClassification::AuthRequired,
        &[
            "sign in to confirm",
            "login required",
            "log in to",
            "requires authentication",
            "use --cookies",
            "private video",
            "confirm your age",
            "age-restricted",
            "http error 401",
        ],
    ),
    (
        ErrorClassification::TooLarge,
        &[
            "larger than max-filesize",
            "file is larger than",
            "max-filesize",
            "http error 413",
            "too large",
        ],
    ),
    (
        ErrorClassification::Unsupported,
        &[
            "unsupported url",
            "no video formats found",
            "no suitable extractor",
            "is not a valid url",
            "not available in your country",
            "this video is unavailable",
        ],
    ),
    (
        ErrorClassification::Timeout,
        &["timed out", "timeout"],
    ),
    (
        ErrorClassification::Transient,
        &[
            "http error 429",
            "too many requests",
            "rate-limit",
            "rate limit",
            "http error 403",
            "http error 5",
            "temporarily unavailable",
            "connection reset",
            "unable to download webpage",
            "unable to download video data",
            "incomplete read",
            "fragment",
            "requested format is not available",
            "conversion failed",
        ],
    ),
];

impl ErrorClassification {
    pub fn classify(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        MARKERS
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
            .map(|(class, _)| *class)
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::TooLarge => "too_large",
            Self::Unsupported => "unsupported",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Short text shown to the requester.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication required to download this content.",
            Self::TooLarge => "The file is too large to send.",
            Self::Unsupported => "This content is not available or not supported.",
            Self::Transient => "The source is temporarily unavailable. Please try again later.",
            Self::Timeout => "The download took too long and was cancelled.",
            Self::Unknown => "The download failed.",
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_markers() {
        let cases = [
            (
                "ERROR: [youtube] abc: Sign in to confirm you're not a bot. Use --cookies-from-browser",
                ErrorClassification::AuthRequired,
            ),
            (
                "ERROR: File is larger than max-filesize (73400320 bytes > 52428800 bytes). Aborting.",
                ErrorClassification::TooLarge,
            ),
            (
                "ERROR: Unsupported URL: https://example.com",
                ErrorClassification::Unsupported,
            ),
            (
                "ERROR: unable to download video data: HTTP Error 429: Too Many Requests",
                ErrorClassification::Transient,
            ),
            ("ERROR: Read timed out.", ErrorClassification::Timeout),
            ("ERROR: something odd", ErrorClassification::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(ErrorClassification::classify(text), expected, "{text}");
        }
    }

    #[test]
    fn test_auth_wins_over_transient() {
        // 403 alone is transient, but an explicit login hint takes precedence.
        let text = "ERROR: HTTP Error 403: Forbidden. This content requires authentication";
        assert_eq!(
            ErrorClassification::classify(text),
            ErrorClassification::AuthRequired
        );
    }
}
