//! Fetch option sets and per-source strategy profiles.
//!
//! A [`StrategyProfile`] is an ordered list of [`FetchOptions`], one per
//! attempt, from the richest configuration to the most conservative one.
//! Profiles are never mutated: overrides and degradation produce new values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;
use crate::source::{SourceKind, SourceVariant};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const RICH_OUTPUT_TEMPLATE: &str = "%(title).80s [%(id)s].%(ext)s";
const SAFE_OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";
const SAFE_TRIM_FILE_NAME: u32 = 40;

/// A post-processing step applied by the fetch engine after download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostProcessor {
    ExtractAudio { codec: String, quality: String },
    RemuxVideo { container: String },
    ConvertThumbnail { format: String },
    EmbedThumbnail,
    EmbedMetadata,
}

impl PostProcessor {
    fn extract_audio() -> Self {
        Self::ExtractAudio {
            codec: "mp3".to_string(),
            quality: "0".to_string(),
        }
    }
}

/// One attempt's worth of fetch engine options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Format selector handed to the engine.
    pub format: String,
    pub merge_output_format: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub post_processors: Vec<PostProcessor>,
    pub write_thumbnail: bool,
    pub embed_metadata: bool,
    /// ASCII-only, shell-safe file names.
    pub restrict_filenames: bool,
    pub trim_file_name: Option<u32>,
    pub output_template: String,
    /// Upper bound in bytes, `None` lets the engine's configured limit apply.
    pub max_filesize: Option<u64>,
}

impl FetchOptions {
    /// Best quality, thumbnail, full metadata and preferred container.
    pub fn rich(source: SourceKind, kind: MediaKind) -> Self {
        let (format, merge_output_format, post_processors) = match kind {
            MediaKind::Audio => (
                "ba/b".to_string(),
                None,
                vec![
                    PostProcessor::extract_audio(),
                    PostProcessor::ConvertThumbnail {
                        format: "jpg".to_string(),
                    },
                    PostProcessor::EmbedThumbnail,
                    PostProcessor::EmbedMetadata,
                ],
            ),
            MediaKind::Photo => ("best".to_string(), None, Vec::new()),
            MediaKind::Video | MediaKind::Auto => (
                "bv*+ba/b".to_string(),
                Some("mp4".to_string()),
                vec![
                    PostProcessor::RemuxVideo {
                        container: "mp4".to_string(),
                    },
                    PostProcessor::EmbedMetadata,
                ],
            ),
        };

        Self {
            format,
            merge_output_format,
            headers: source_headers(source),
            post_processors,
            write_thumbnail: kind != MediaKind::Photo,
            embed_metadata: kind != MediaKind::Photo,
            restrict_filenames: false,
            trim_file_name: None,
            output_template: RICH_OUTPUT_TEMPLATE.to_string(),
            max_filesize: None,
        }
    }

    /// Conservative variant of `self`.
    ///
    /// Drops the thumbnail, switches to ASCII-safe short names and keeps only
    /// the post-processing required to produce `kind`.
    pub fn simplified(&self, kind: MediaKind) -> Self {
        let post_processors = self
            .post_processors
            .iter()
            .filter(|pp| match pp {
                PostProcessor::ExtractAudio { .. } => kind == MediaKind::Audio,
                _ => false,
            })
            .cloned()
            .collect();

        let format = match kind {
            // Single-file formats avoid container/codec merge failures.
            MediaKind::Video | MediaKind::Auto => "b[ext=mp4]/bv*[ext=mp4]+ba[ext=m4a]/b".to_string(),
            _ => self.format.clone(),
        };

        Self {
            format,
            merge_output_format: self.merge_output_format.clone(),
            headers: self.headers.clone(),
            post_processors,
            write_thumbnail: false,
            embed_metadata: false,
            restrict_filenames: true,
            trim_file_name: Some(SAFE_TRIM_FILE_NAME),
            output_template: SAFE_OUTPUT_TEMPLATE.to_string(),
            max_filesize: self.max_filesize,
        }
    }

    /// Lower quality constraint used after a "too large" failure.
    pub fn degraded(&self, kind: MediaKind) -> Self {
        let format = match kind {
            MediaKind::Audio => "ba[abr<=128]/wa/ba".to_string(),
            MediaKind::Photo => self.format.clone(),
            MediaKind::Video | MediaKind::Auto => {
                "bv*[height<=480]+ba/b[height<=480]/worst".to_string()
            }
        };
        Self {
            format,
            ..self.clone()
        }
    }

    pub fn with_overrides(&self, overrides: &FetchOverrides) -> Self {
        let mut headers = self.headers.clone();
        headers.extend(overrides.headers.clone());

        Self {
            format: overrides
                .format
                .clone()
                .unwrap_or_else(|| self.format.clone()),
            headers,
            post_processors: overrides
                .post_processors
                .clone()
                .unwrap_or_else(|| self.post_processors.clone()),
            ..self.clone()
        }
    }
}

fn source_headers(source: SourceKind) -> BTreeMap<String, String> {
    let referer = match source {
        SourceKind::TikTok => Some("https://www.tiktok.com/"),
        SourceKind::Instagram => Some("https://www.instagram.com/"),
        SourceKind::Pinterest => Some("https://www.pinterest.com/"),
        _ => None,
    };

    let mut headers = BTreeMap::new();
    if let Some(referer) = referer {
        headers.insert("Referer".to_string(), referer.to_string());
        headers.insert("User-Agent".to_string(), BROWSER_USER_AGENT.to_string());
    }
    headers
}

/// Caller-supplied option overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOverrides {
    pub format: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub post_processors: Option<Vec<PostProcessor>>,
}

impl FetchOverrides {
    /// Whether the overrides explicitly ask for audio extraction.
    pub fn requests_audio_only(&self) -> bool {
        self.post_processors.as_ref().is_some_and(|pps| {
            pps.iter()
                .any(|pp| matches!(pp, PostProcessor::ExtractAudio { .. }))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.format.is_none() && self.headers.is_empty() && self.post_processors.is_none()
    }
}

/// Ordered attempt list for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyProfile {
    source: SourceKind,
    variant: SourceVariant,
    kind: MediaKind,
    attempts: Vec<FetchOptions>,
}

impl StrategyProfile {
    /// Build the profile for `source`. `kind` is resolved against the variant,
    /// so `Auto` on an audio-only variant becomes `Audio`.
    pub fn for_source(source: SourceKind, variant: SourceVariant, kind: MediaKind) -> Self {
        let kind = kind.resolve(variant.is_audio_only());
        Self::from_base(source, variant, kind, FetchOptions::rich(source, kind))
    }

    fn from_base(
        source: SourceKind,
        variant: SourceVariant,
        kind: MediaKind,
        base: FetchOptions,
    ) -> Self {
        let simplified = base.simplified(kind);
        Self {
            source,
            variant,
            kind,
            attempts: vec![base, simplified],
        }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn variant(&self) -> SourceVariant {
        self.variant
    }

    /// Resolved media kind, never `Auto`.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn attempts(&self) -> &[FetchOptions] {
        &self.attempts
    }

    /// Apply overrides to the rich attempt and derive the rest from it.
    pub fn with_overrides(&self, overrides: &FetchOverrides) -> Self {
        if overrides.is_empty() {
            return self.clone();
        }
        Self::from_base(
            self.source,
            self.variant,
            self.kind,
            self.attempts[0].with_overrides(overrides),
        )
    }

    /// Same attempt sequence under a lower quality constraint.
    pub fn degraded(&self) -> Self {
        let attempts = self
            .attempts
            .iter()
            .map(|options| options.degraded(self.kind))
            .collect();
        Self {
            attempts,
            ..self.clone()
        }
    }

    /// Copy of the profile with every attempt capped at `bytes`.
    pub fn with_max_filesize(&self, bytes: u64) -> Self {
        let attempts = self
            .attempts
            .iter()
            .map(|options| FetchOptions {
                max_filesize: Some(options.max_filesize.map_or(bytes, |cur| cur.min(bytes))),
                ..options.clone()
            })
            .collect();
        Self {
            attempts,
            ..self.clone()
        }
    }
}
