//! Ordered source rule table.
//!
//! Rules are evaluated top to bottom and the first match wins. The order is
//! part of the contract: `music.youtube.com` must be tried before the general
//! YouTube rule, which would otherwise swallow it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RouteError;
use crate::locator::Locator;
use crate::profile::FetchOverrides;

static YOUTUBE_MUSIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://music\.youtube\.com/").unwrap());

static YOUTUBE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?:(?:www|m)\.)?(?:youtube\.com/(?:watch\?|shorts/|live/|embed/)|youtu\.be/[\w-]+)",
    )
    .unwrap()
});

static TIKTOK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:(?:www|m|vm|vt)\.)?tiktok\.com/").unwrap());

static INSTAGRAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?instagram\.com/(?:[\w.]+/)?(?:p|reels?|tv|stories)/").unwrap()
});

static TWITTER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:(?:www|mobile)\.)?(?:twitter|x)\.com/\w+/status/\d+").unwrap()
});

static SOUNDCLOUD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:(?:www|m|on)\.)?soundcloud\.com/").unwrap());

static VK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:(?:www|m)\.)?(?:vk\.com|vk\.ru|vkvideo\.ru)/").unwrap()
});

static REDDIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:(?:(?:www|old|new)\.)?reddit\.com/r/\w+/comments/|redd\.it/)")
        .unwrap()
});

static PINTEREST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:(?:[a-z]{2,3}|www)\.)?(?:pinterest\.[a-z.]+/pin/|pin\.it/)").unwrap()
});

static VIMEO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|player\.)?vimeo\.com/(?:video/)?\d+").unwrap()
});

/// A known media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    YouTubeMusic,
    YouTube,
    TikTok,
    Instagram,
    Twitter,
    SoundCloud,
    Vk,
    Reddit,
    Pinterest,
    Vimeo,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTubeMusic => "youtube_music",
            Self::YouTube => "youtube",
            Self::TikTok => "tiktok",
            Self::Instagram => "instagram",
            Self::Twitter => "twitter",
            Self::SoundCloud => "soundcloud",
            Self::Vk => "vk",
            Self::Reddit => "reddit",
            Self::Pinterest => "pinterest",
            Self::Vimeo => "vimeo",
        }
    }

    /// Key under which credential material for this source is stored.
    ///
    /// YouTube Music shares the account of YouTube.
    pub fn credential_key(&self) -> &'static str {
        match self {
            Self::YouTubeMusic => Self::YouTube.as_str(),
            other => other.as_str(),
        }
    }

    /// Feature-toggle key for this source and variant.
    pub fn module_key(&self, variant: SourceVariant) -> &'static str {
        match (self, variant) {
            (Self::YouTube, SourceVariant::AudioOnly) => "youtube_audio",
            (Self::Vk, SourceVariant::General) => "vk_video",
            (Self::Vk, SourceVariant::AudioOnly) => "vk_audio",
            (other, _) => other.as_str(),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        RULES
            .iter()
            .map(|rule| rule.source)
            .find(|source| source.as_str() == key)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant of a source that serves more than one kind of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceVariant {
    #[default]
    General,
    AudioOnly,
}

impl SourceVariant {
    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }
}

/// How a rule picks its variant once the pattern matched.
#[derive(Debug, Clone, Copy)]
enum VariantRule {
    Fixed(SourceVariant),
    /// Audio-only when the first path segment starts with one of the prefixes.
    AudioByPathSegment(&'static [&'static str]),
    /// Audio-only when the overrides explicitly ask for audio extraction.
    AudioByOverride,
}

impl VariantRule {
    fn resolve(&self, locator: &Locator, overrides: &FetchOverrides) -> SourceVariant {
        match self {
            Self::Fixed(variant) => *variant,
            Self::AudioByPathSegment(prefixes) => {
                let audio = locator
                    .path_segments()
                    .first()
                    .is_some_and(|seg| prefixes.iter().any(|p| seg.starts_with(p)));
                if audio {
                    SourceVariant::AudioOnly
                } else {
                    SourceVariant::General
                }
            }
            Self::AudioByOverride => {
                if overrides.requests_audio_only() {
                    SourceVariant::AudioOnly
                } else {
                    SourceVariant::General
                }
            }
        }
    }
}

struct SourceRule {
    regex: &'static LazyLock<Regex>,
    source: SourceKind,
    variant: VariantRule,
}

macro_rules! source_rules {
    ( $( $regex:path => $source:expr, $variant:expr );+ $(;)? ) => {
        &[
            $(
                SourceRule {
                    regex: &$regex,
                    source: $source,
                    variant: $variant,
                },
            )+
        ]
    };
}

// Priority order, first match wins.
static RULES: &[SourceRule] = source_rules![
    YOUTUBE_MUSIC_REGEX => SourceKind::YouTubeMusic, VariantRule::Fixed(SourceVariant::AudioOnly);
    YOUTUBE_REGEX => SourceKind::YouTube, VariantRule::AudioByOverride;
    TIKTOK_REGEX => SourceKind::TikTok, VariantRule::Fixed(SourceVariant::General);
    INSTAGRAM_REGEX => SourceKind::Instagram, VariantRule::Fixed(SourceVariant::General);
    TWITTER_REGEX => SourceKind::Twitter, VariantRule::Fixed(SourceVariant::General);
    SOUNDCLOUD_REGEX => SourceKind::SoundCloud, VariantRule::Fixed(SourceVariant::AudioOnly);
    VK_REGEX => SourceKind::Vk, VariantRule::AudioByPathSegment(&["audio", "music"]);
    REDDIT_REGEX => SourceKind::Reddit, VariantRule::Fixed(SourceVariant::General);
    PINTEREST_REGEX => SourceKind::Pinterest, VariantRule::Fixed(SourceVariant::General);
    VIMEO_REGEX => SourceKind::Vimeo, VariantRule::Fixed(SourceVariant::General);
];

/// Result of matching a locator against the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMatch {
    pub source: SourceKind,
    pub variant: SourceVariant,
    pub module_key: &'static str,
}

/// Match a validated locator against the ordered rule table.
pub fn match_source(
    locator: &Locator,
    overrides: &FetchOverrides,
) -> Result<SourceMatch, RouteError> {
    let rule = RULES
        .iter()
        .find(|rule| rule.regex.is_match(locator.as_str()))
        .ok_or_else(|| RouteError::UnsupportedSource(locator.to_string()))?;

    let variant = rule.variant.resolve(locator, overrides);
    let module_key = rule.source.module_key(variant);
    debug!(source = %rule.source, ?variant, module_key, "Matched source rule");

    Ok(SourceMatch {
        source: rule.source,
        variant,
        module_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::DISALLOWED_CHARS;
    use crate::profile::PostProcessor;
    use proptest::prelude::*;

    fn matched(raw: &str) -> Result<SourceMatch, RouteError> {
        let locator = Locator::parse(raw)?;
        match_source(&locator, &FetchOverrides::default())
    }

    #[test]
    fn test_known_sources() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", SourceKind::YouTube),
            ("https://youtu.be/dQw4w9WgXcQ", SourceKind::YouTube),
            ("https://www.youtube.com/shorts/abc123", SourceKind::YouTube),
            ("https://music.youtube.com/watch?v=abc", SourceKind::YouTubeMusic),
            ("https://www.tiktok.com/@user/video/7300000000000000000", SourceKind::TikTok),
            ("https://vm.tiktok.com/ZMabc", SourceKind::TikTok),
            ("https://www.instagram.com/reel/Cabc123/", SourceKind::Instagram),
            ("https://x.com/someone/status/1234567890", SourceKind::Twitter),
            ("https://twitter.com/someone/status/1234567890", SourceKind::Twitter),
            ("https://soundcloud.com/artist/track", SourceKind::SoundCloud),
            ("https://vk.com/video-123_456", SourceKind::Vk),
            ("https://www.reddit.com/r/rust/comments/abc/title", SourceKind::Reddit),
            ("https://www.pinterest.com/pin/123456/", SourceKind::Pinterest),
            ("https://pin.it/abc", SourceKind::Pinterest),
            ("https://vimeo.com/123456", SourceKind::Vimeo),
        ];

        for (raw, expected) in cases {
            let m = matched(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(m.source, expected, "{raw}");
        }
    }

    #[test]
    fn test_youtube_music_wins_over_youtube() {
        let m = matched("https://music.youtube.com/watch?v=abc").unwrap();
        assert_eq!(m.source, SourceKind::YouTubeMusic);
        assert_eq!(m.variant, SourceVariant::AudioOnly);
        assert_eq!(m.module_key, "youtube_music");
        assert_eq!(m.source.credential_key(), "youtube");
    }

    #[test]
    fn test_unsupported_source() {
        assert!(matches!(
            matched("https://example.com/video.mp4"),
            Err(RouteError::UnsupportedSource(_))
        ));
        // Channel pages are not media.
        assert!(matches!(
            matched("https://www.youtube.com/@channel"),
            Err(RouteError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn test_vk_variant_by_path_segment() {
        let video = matched("https://vk.com/video-123_456").unwrap();
        assert_eq!(video.variant, SourceVariant::General);
        assert_eq!(video.module_key, "vk_video");

        let audio = matched("https://vk.com/audio-2001_123").unwrap();
        assert_eq!(audio.variant, SourceVariant::AudioOnly);
        assert_eq!(audio.module_key, "vk_audio");

        let music = matched("https://vk.com/music/playlist/1_2").unwrap();
        assert_eq!(music.variant, SourceVariant::AudioOnly);
    }

    #[test]
    fn test_youtube_variant_by_override() {
        let locator = Locator::parse("https://www.youtube.com/watch?v=abc").unwrap();

        let general = match_source(&locator, &FetchOverrides::default()).unwrap();
        assert_eq!(general.module_key, "youtube");

        let overrides = FetchOverrides {
            post_processors: Some(vec![PostProcessor::ExtractAudio {
                codec: "mp3".to_string(),
                quality: "0".to_string(),
            }]),
            ..Default::default()
        };
        let audio = match_source(&locator, &overrides).unwrap();
        assert_eq!(audio.variant, SourceVariant::AudioOnly);
        assert_eq!(audio.module_key, "youtube_audio");
    }

    #[test]
    fn test_source_kind_round_trip_by_key() {
        for rule in RULES {
            assert_eq!(SourceKind::from_key(rule.source.as_str()), Some(rule.source));
        }
        assert_eq!(SourceKind::from_key("myspace"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_rejection_precedes_matching(
            id in "[a-zA-Z0-9_-]{1,16}",
            idx in 0usize..DISALLOWED_CHARS.len(),
        ) {
            let good = format!("https://www.youtube.com/watch?v={id}");
            prop_assert!(matched(&good).is_ok());

            let bad_char = DISALLOWED_CHARS[idx];
            let bad = format!("{good}{bad_char}");
            prop_assert_eq!(matched(&bad), Err(RouteError::SecurityRejection(bad_char)));
        }
    }
}
