//! Wire message shapes.
//!
//! Field and tag names follow the external wire contract exactly
//! (`"OBSERVATION"`, `"GET_ADS_24H"`, camelCase payload fields), so these
//! types serialize byte-compatible with the consuming processes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use adwatch_core_types::{AdDescriptor, AdId, VideoId};

/// Full derived state sent one-way from the observer to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "videoId")]
    pub video_id: Option<VideoId>,
    #[serde(rename = "adId")]
    pub ad_id: Option<AdId>,
    #[serde(rename = "adActive")]
    pub ad_active: bool,
    #[serde(rename = "adDescriptor")]
    pub ad_descriptor: Option<AdDescriptor>,
    #[serde(rename = "debugText")]
    pub debug_text: String,
    #[serde(rename = "debugInfo")]
    pub debug_info: Value,
}

impl Observation {
    /// The cleared record emitted when the page carries no media.
    pub fn empty() -> Self {
        Self {
            video_id: None,
            ad_id: None,
            ad_active: false,
            ad_descriptor: None,
            debug_text: String::new(),
            debug_info: Value::Null,
        }
    }
}

/// Messages sent from the page-embedded observer to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObserverMessage {
    #[serde(rename = "OBSERVATION")]
    Observation(Observation),

    /// Advisory backup signal; primary truth is the observation's
    /// `adActive` transition.
    #[serde(rename = "AD_STARTED")]
    AdStarted {
        #[serde(rename = "adId")]
        ad_id: AdId,
    },

    #[serde(rename = "AD_ENDED")]
    AdEnded,

    #[serde(rename = "PAGE_CLOSED")]
    PageClosed,
}

/// Requests issued by the presentation process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiRequest {
    #[serde(rename = "GET_STATE")]
    GetState,

    #[serde(rename = "GET_ADS_24H")]
    GetAds24h,

    #[serde(rename = "GET_VIDEOS_24H")]
    GetVideos24h,

    #[serde(rename = "RESET_COUNTERS")]
    ResetCounters,
}

/// Per-tab state returned for `GET_STATE`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(rename = "debugText")]
    pub debug_text: String,
    #[serde(rename = "debugInfo")]
    pub debug_info: Value,
    #[serde(rename = "adActive")]
    pub ad_active: bool,
    #[serde(rename = "currentAdId")]
    pub current_ad_id: Option<AdId>,
    #[serde(rename = "currentVideoId")]
    pub current_video_id: Option<VideoId>,
    #[serde(rename = "adDescriptor")]
    pub ad_descriptor: Option<AdDescriptor>,
}

/// Responses to [`UiRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UiResponse {
    State(StateSnapshot),
    Count { count: usize },
    Reset { success: bool },
}

/// Fire-and-forget notifications pushed to the presentation process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorNotice {
    #[serde(rename = "AD_COUNT_UPDATED")]
    AdCountUpdated { count: usize },

    #[serde(rename = "VIDEO_COUNT_UPDATED")]
    VideoCountUpdated { count: usize },
}
