//! Resource locator validation and canonicalization.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RouteError;

/// Characters that are never accepted in a locator.
///
/// Whitespace and control characters are rejected as well, see [`is_disallowed`].
/// `&` is absent on purpose: query strings need it and the fetch engine is
/// spawned with an argument vector, never through a shell.
pub const DISALLOWED_CHARS: &[char] = &[';', '|', '`', '$', '<', '>', '\\', '"', '\'', '{', '}'];

#[inline]
pub fn is_disallowed(c: char) -> bool {
    DISALLOWED_CHARS.contains(&c) || c.is_whitespace() || c.is_control()
}

/// A validated, canonical resource locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Validate and canonicalize a raw locator.
    ///
    /// The character check runs first and unconditionally, on the raw text,
    /// before the URL is parsed or matched against any source.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if let Some(c) = raw.chars().find(|c| is_disallowed(*c)) {
            return Err(RouteError::SecurityRejection(c));
        }

        if raw.is_empty() {
            return Err(RouteError::invalid("locator cannot be empty"));
        }

        let mut url = Url::parse(raw).map_err(|e| RouteError::invalid(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RouteError::invalid(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(RouteError::invalid(format!("{raw}: missing host")));
        }

        url.set_fragment(None);

        Ok(Self(Self::canonical_string(&url)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host without a leading `www.`.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }

    /// Non-empty path segments of the locator.
    pub fn path_segments(&self) -> Vec<String> {
        Url::parse(&self.0)
            .ok()
            .map(|u| {
                u.path_segments()
                    .map(|segs| {
                        segs.filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn canonical_string(url: &Url) -> String {
        let s = url.to_string();
        if url.query().is_none() {
            s.trim_end_matches('/').to_string()
        } else {
            s
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonicalization() {
        let locator = Locator::parse("https://WWW.YouTube.com/watch?v=abc#t=10").unwrap();
        assert_eq!(locator.as_str(), "https://www.youtube.com/watch?v=abc");

        let locator = Locator::parse("https://soundcloud.com/artist/track/").unwrap();
        assert_eq!(locator.as_str(), "https://soundcloud.com/artist/track");
    }

    #[test]
    fn test_rejects_shell_metacharacters() {
        for raw in [
            "https://youtube.com/watch?v=a;rm -rf",
            "https://youtube.com/watch?v=$(id)",
            "https://youtube.com/watch?v=`id`",
            "https://youtube.com/watch?v=a|b",
            "https://youtube.com/watch?v=a b",
        ] {
            assert!(
                matches!(Locator::parse(raw), Err(RouteError::SecurityRejection(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_ampersand_in_query_is_allowed() {
        let locator = Locator::parse("https://www.youtube.com/watch?v=abc&t=42").unwrap();
        assert!(locator.as_str().contains("&t=42"));
    }

    #[test]
    fn test_invalid_scheme_and_empty() {
        assert!(matches!(
            Locator::parse("ftp://example.com/file"),
            Err(RouteError::InvalidLocator(_))
        ));
        assert!(matches!(
            Locator::parse(""),
            Err(RouteError::InvalidLocator(_))
        ));
        assert!(matches!(
            Locator::parse("not a url"),
            Err(RouteError::SecurityRejection(' '))
        ));
    }

    #[test]
    fn test_host_and_segments() {
        let locator = Locator::parse("https://www.vk.com/audio/123_456").unwrap();
        assert_eq!(locator.host().as_deref(), Some("vk.com"));
        assert_eq!(locator.path_segments(), vec!["audio", "123_456"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_disallowed_character_always_rejected(
            prefix in "[a-zA-Z0-9/=?.-]{0,20}",
            suffix in "[a-zA-Z0-9/=?.-]{0,20}",
            idx in 0usize..DISALLOWED_CHARS.len(),
        ) {
            let bad = DISALLOWED_CHARS[idx];
            let raw = format!("https://www.youtube.com/watch?v={prefix}{bad}{suffix}");
            prop_assert_eq!(Locator::parse(&raw), Err(RouteError::SecurityRejection(bad)));
        }
    }
}
