//! Source router.
//!
//! Validates a locator, matches it against the ordered source rules and
//! checks the matched module's toggle. Nothing is selected before the
//! locator passes validation.

mod toggle;

use std::sync::Arc;

use media_sources::{
    FetchOverrides, Locator, MediaKind, SourceKind, SourceVariant, StrategyProfile, match_source,
};
use tracing::{debug, instrument};

use crate::{Error, Result};

pub use toggle::{InMemoryToggleStore, ToggleStore};

/// Routing decision for one locator.
#[derive(Debug, Clone)]
pub struct Route {
    pub locator: Locator,
    pub source: SourceKind,
    pub variant: SourceVariant,
    pub module_key: &'static str,
    pub strategy: StrategyProfile,
}

pub struct SourceRouter {
    toggles: Arc<dyn ToggleStore>,
}

impl SourceRouter {
    pub fn new(toggles: Arc<dyn ToggleStore>) -> Self {
        Self { toggles }
    }

    pub fn toggles(&self) -> &Arc<dyn ToggleStore> {
        &self.toggles
    }

    /// Character check and canonicalization only.
    pub fn validate(&self, raw: &str) -> Result<Locator> {
        Ok(Locator::parse(raw)?)
    }

    pub async fn route(&self, raw: &str, kind: MediaKind, overrides: &FetchOverrides) -> Result<Route> {
        let locator = self.validate(raw)?;
        self.route_locator(locator, kind, overrides).await
    }

    /// Route an already validated locator.
    #[instrument(skip(self, overrides), fields(locator = %locator))]
    pub async fn route_locator(
        &self,
        locator: Locator,
        kind: MediaKind,
        overrides: &FetchOverrides,
    ) -> Result<Route> {
        let matched = match_source(&locator, overrides)?;

        if !self.toggles.get(matched.module_key).await? {
            debug!(module = matched.module_key, "Module disabled");
            return Err(Error::ModuleDisabled(matched.module_key.to_string()));
        }

        let strategy = StrategyProfile::for_source(matched.source, matched.variant, kind)
            .with_overrides(overrides);

        Ok(Route {
            locator,
            source: matched.source,
            variant: matched.variant,
            module_key: matched.module_key,
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sources::{PostProcessor, RouteError};

    fn router() -> (SourceRouter, Arc<InMemoryToggleStore>) {
        let toggles = Arc::new(InMemoryToggleStore::new());
        (SourceRouter::new(toggles.clone()), toggles)
    }

    #[tokio::test]
    async fn test_routes_enabled_module() {
        let (router, _) = router();
        let route = router
            .route("https://youtu.be/abc#t=10", MediaKind::Auto, &FetchOverrides::default())
            .await
            .unwrap();
        assert_eq!(route.source, SourceKind::YouTube);
        assert_eq!(route.module_key, "youtube");
        assert_eq!(route.strategy.kind(), MediaKind::Video);
        assert_eq!(route.strategy.attempts().len(), 2);
        assert_eq!(route.locator.as_str(), "https://youtu.be/abc");
    }

    #[tokio::test]
    async fn test_disabled_module_is_rejected_after_match() {
        let (router, toggles) = router();
        toggles.set("youtube_music", false).await.unwrap();

        let err = router
            .route("https://music.youtube.com/watch?v=abc", MediaKind::Auto, &FetchOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModuleDisabled(ref key) if key == "youtube_music"));

        // The general variant has its own flag.
        assert!(
            router
                .route("https://www.youtube.com/watch?v=abc", MediaKind::Auto, &FetchOverrides::default())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_security_rejection_precedes_toggle_and_match() {
        let (router, toggles) = router();
        toggles.set("youtube", false).await.unwrap();

        let err = router
            .route("https://youtu.be/abc;rm", MediaKind::Video, &FetchOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Route(RouteError::SecurityRejection(';'))));
    }

    #[tokio::test]
    async fn test_unsupported_source() {
        let (router, _) = router();
        let err = router
            .route("https://example.com/video", MediaKind::Video, &FetchOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Route(RouteError::UnsupportedSource(_))));
    }

    #[tokio::test]
    async fn test_audio_override_selects_audio_variant() {
        let (router, _) = router();
        let overrides = FetchOverrides {
            post_processors: Some(vec![PostProcessor::ExtractAudio {
                codec: "mp3".to_string(),
                quality: "0".to_string(),
            }]),
            ..Default::default()
        };
        let route = router
            .route("https://www.youtube.com/watch?v=abc", MediaKind::Auto, &overrides)
            .await
            .unwrap();
        assert_eq!(route.variant, SourceVariant::AudioOnly);
        assert_eq!(route.module_key, "youtube_audio");
        assert_eq!(route.strategy.kind(), MediaKind::Audio);
    }
}
