//! Core types for the locator seam

use serde::{Deserialize, Serialize};

/// Semantic descriptor of a page element the detection layer cares about.
///
/// The mapping from descriptor to concrete page structure lives entirely
/// behind the [`crate::PagePort`] implementation; callers only name the
/// role an element plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementDescriptor {
    /// The skip-ad control
    SkipButton,

    /// Countdown text adjacent to the skip control ("Skip in 4")
    SkipCountdownText,

    /// The container wrapping the rendered ad creative
    AdContainer,

    /// Free text rendered inside the ad overlay (advertiser line, CTA)
    AdOverlayText,

    /// The ad progress indicator
    AdProgressBar,

    /// Total-duration label on the progress bar
    ProgressTotalLabel,

    /// Marker only present on confirmed non-skippable ads
    NonSkippableMarker,

    /// The host video element itself
    VideoElement,
}

impl ElementDescriptor {
    pub fn name(&self) -> &'static str {
        match self {
            ElementDescriptor::SkipButton => "skip-button",
            ElementDescriptor::SkipCountdownText => "skip-countdown-text",
            ElementDescriptor::AdContainer => "ad-container",
            ElementDescriptor::AdOverlayText => "ad-overlay-text",
            ElementDescriptor::AdProgressBar => "ad-progress-bar",
            ElementDescriptor::ProgressTotalLabel => "progress-total-label",
            ElementDescriptor::NonSkippableMarker => "non-skippable-marker",
            ElementDescriptor::VideoElement => "video-element",
        }
    }
}

/// A live reference to a located element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Opaque node reference assigned by the port backend
    pub node_id: u64,

    /// Whether the element is currently rendered and visible
    pub visible: bool,

    /// Visible text content, when the backend exposes it
    pub text: Option<String>,
}

impl ElementHandle {
    pub fn new(node_id: u64, visible: bool, text: Option<String>) -> Self {
        Self {
            node_id,
            visible,
            text,
        }
    }
}

/// Playback state of the host video element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoState {
    /// Elapsed playback time, seconds
    pub current_time_s: f64,

    /// Total duration reported by the element, seconds (0 when unknown)
    pub duration_s: f64,

    /// Whether playback has reached the end
    pub ended: bool,
}

impl VideoState {
    pub fn has_reliable_duration(&self) -> bool {
        self.duration_s.is_finite() && self.duration_s > 0.0
    }
}
