use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Media kind requested by a caller.
///
/// `Auto` lets the source decide: audio-only sources resolve to `Audio`,
/// everything else to `Video`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Photo,
    #[default]
    Auto,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Photo => "photo",
            Self::Auto => "auto",
        }
    }

    /// Resolve `Auto` against the source's natural kind.
    pub fn resolve(self, audio_only_source: bool) -> Self {
        match self {
            Self::Auto if audio_only_source => Self::Audio,
            Self::Auto => Self::Video,
            other => other,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "photo" => Ok(Self::Photo),
            "auto" | "" => Ok(Self::Auto),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_str() {
        assert_eq!("video".parse::<MediaKind>(), Ok(MediaKind::Video));
        assert_eq!("AUDIO".parse::<MediaKind>(), Ok(MediaKind::Audio));
        assert_eq!("".parse::<MediaKind>(), Ok(MediaKind::Auto));
        assert!("gif".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_resolve_auto() {
        assert_eq!(MediaKind::Auto.resolve(true), MediaKind::Audio);
        assert_eq!(MediaKind::Auto.resolve(false), MediaKind::Video);
        assert_eq!(MediaKind::Photo.resolve(true), MediaKind::Photo);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&MediaKind::Photo).unwrap();
        assert_eq!(json, "\"photo\"");
    }
}
