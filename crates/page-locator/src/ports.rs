use async_trait::async_trait;
use serde_json::Value;

use crate::errors::LocatorError;
use crate::types::{ElementDescriptor, ElementHandle, VideoState};

/// Read-only access to the observed page.
///
/// Every method is a point-in-time read; implementations must never block on
/// page readiness. A page that is mid-navigation returns
/// [`LocatorError::PageUnavailable`] and the caller decides whether to retry.
#[async_trait]
pub trait PagePort: Send + Sync {
    /// Whether a media player is mounted on the page at all.
    async fn player_present(&self) -> bool;

    /// Whether the current route is one that can carry media
    /// (non-media routes short-circuit the whole detection pass).
    async fn is_media_route(&self) -> bool;

    /// The page URL, if navigation has settled.
    async fn page_url(&self) -> Result<Option<String>, LocatorError>;

    /// The player's structured configuration blob (debug identifiers live
    /// here when the player exposes them).
    async fn player_config(&self) -> Result<Option<Value>, LocatorError>;

    /// Free-text debug output emitted by the player.
    async fn debug_text(&self) -> Result<Option<String>, LocatorError>;

    /// The player's structured initial-response payload.
    async fn initial_response(&self) -> Result<Option<Value>, LocatorError>;

    /// Page-level metadata (meta tags, embedded JSON-LD).
    async fn page_metadata(&self) -> Result<Option<Value>, LocatorError>;

    /// All visible text on the page, flattened.
    async fn visible_text(&self) -> Result<Option<String>, LocatorError>;

    /// Resolve a semantic descriptor to zero-or-one live element.
    async fn query(
        &self,
        descriptor: ElementDescriptor,
    ) -> Result<Option<ElementHandle>, LocatorError>;

    /// Playback state of the host video element, if one is mounted.
    async fn video_state(&self) -> Result<Option<VideoState>, LocatorError>;
}
