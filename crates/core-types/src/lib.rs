use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one observed page instance (a browser tab).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the video currently loaded in the observed player.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an advertisement rendered by the player.
///
/// The player emits placeholder values ("null", empty string) while an ad
/// slot exists but no creative is loaded; those never count as a live ad.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AdId(pub String);

impl AdId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.is_empty() || self.0 == "null" || self.0 == "undefined"
    }
}

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Temporal position of an ad within its host video.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AdPosition {
    #[serde(rename = "pre_roll")]
    PreRoll,
    #[serde(rename = "mid_roll")]
    MidRoll,
    #[serde(rename = "post_roll")]
    PostRoll,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AdPosition {
    pub fn name(&self) -> &'static str {
        match self {
            AdPosition::PreRoll => "pre_roll",
            AdPosition::MidRoll => "mid_roll",
            AdPosition::PostRoll => "post_roll",
            AdPosition::Unknown => "unknown",
        }
    }
}

/// Ad format classification derived from skippability and duration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AdType {
    #[serde(rename = "skippable")]
    Skippable,
    #[serde(rename = "bumper")]
    Bumper,
    #[serde(rename = "non_skippable_short")]
    NonSkippableShort,
    #[serde(rename = "non_skippable_medium")]
    NonSkippableMedium,
    #[serde(rename = "non_skippable_long")]
    NonSkippableLong,
    #[serde(rename = "non_skippable")]
    NonSkippable,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Which estimation strategy produced the duration value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DurationSource {
    #[serde(rename = "real-tracking")]
    RealTracking,
    #[serde(rename = "video-element")]
    VideoElement,
    #[serde(rename = "progress-total")]
    ProgressTotal,
    #[serde(rename = "skip-calculation")]
    SkipCalculation,
    #[serde(rename = "dom-text")]
    DomText,
    #[serde(rename = "progress-bar")]
    ProgressBar,
    #[serde(rename = "skip-inference")]
    SkipInference,
    #[serde(rename = "estimation")]
    Estimation,
    #[serde(rename = "none")]
    None,
}

/// Per-cycle description of the currently active ad.
///
/// Recomputed on every detection pass while an ad is active and attached to
/// the Observation Event sent downstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdDescriptor {
    #[serde(rename = "type")]
    pub ad_type: AdType,
    #[serde(rename = "isSkippable")]
    pub is_skippable: bool,
    #[serde(rename = "duration")]
    pub duration_s: u32,
    #[serde(rename = "durationDetected")]
    pub duration_detected: bool,
    #[serde(rename = "durationSource")]
    pub duration_source: DurationSource,
    pub position: AdPosition,
}

impl Default for AdDescriptor {
    fn default() -> Self {
        Self {
            ad_type: AdType::Unknown,
            is_skippable: false,
            duration_s: 0,
            duration_detected: false,
            duration_source: DurationSource::None,
            position: AdPosition::Unknown,
        }
    }
}
