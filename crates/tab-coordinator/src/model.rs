//! Per-tab state records.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;
use tracing::debug;

use adwatch_core_types::{AdDescriptor, AdId, VideoId};
use watch_protocol::{Observation, StateSnapshot};

/// The coordinator's record for one observed page instance.
///
/// Mutated in place on every applied transition; deleted when the page
/// closes or the staleness sweep reclaims it.
#[derive(Clone, Debug, Default)]
pub struct TabRecord {
    pub debug_text: String,
    pub debug_info: Value,
    pub ad_active: bool,
    pub current_ad_id: Option<AdId>,
    pub current_video_id: Option<VideoId>,
    pub ad_descriptor: Option<AdDescriptor>,
    pub last_update: i64,
}

impl TabRecord {
    pub fn from_observation(observation: &Observation, now_ms: i64) -> Self {
        Self {
            debug_text: observation.debug_text.clone(),
            debug_info: observation.debug_info.clone(),
            ad_active: observation.ad_active,
            current_ad_id: observation.ad_id.clone(),
            current_video_id: observation.video_id.clone(),
            ad_descriptor: observation.ad_descriptor.clone(),
            last_update: now_ms,
        }
    }

    /// Hash over the content-bearing fields; `last_update` is excluded so a
    /// re-observation of identical state is not a transition.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.debug_text.hash(&mut hasher);
        self.ad_active.hash(&mut hasher);
        self.current_ad_id.hash(&mut hasher);
        self.current_video_id.hash(&mut hasher);
        match serde_json::to_string(&(&self.debug_info, &self.ad_descriptor)) {
            Ok(encoded) => encoded.hash(&mut hasher),
            Err(err) => debug!(error = %err, "unhashable diagnostic payload, ignoring it"),
        }
        hasher.finish()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            debug_text: self.debug_text.clone(),
            debug_info: self.debug_info.clone(),
            ad_active: self.ad_active,
            current_ad_id: self.current_ad_id.clone(),
            current_video_id: self.current_video_id.clone(),
            ad_descriptor: self.ad_descriptor.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation(video: &str, ad: Option<&str>) -> Observation {
        Observation {
            video_id: Some(VideoId::new(video)),
            ad_id: ad.map(AdId::new),
            ad_active: ad.is_some(),
            ad_descriptor: None,
            debug_text: format!("vid={video}"),
            debug_info: json!({"source": "test"}),
        }
    }

    #[test]
    fn identical_content_hashes_equal_across_timestamps() {
        let a = TabRecord::from_observation(&observation("vid-1", None), 1_000);
        let b = TabRecord::from_observation(&observation("vid-1", None), 9_000);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn changed_content_hashes_differ() {
        let a = TabRecord::from_observation(&observation("vid-1", None), 1_000);
        let b = TabRecord::from_observation(&observation("vid-1", Some("ad-1")), 1_000);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn snapshot_mirrors_the_record() {
        let record = TabRecord::from_observation(&observation("vid-1", Some("ad-1")), 1_000);
        let snapshot = record.snapshot();
        assert!(snapshot.ad_active);
        assert_eq!(snapshot.current_video_id, Some(VideoId::new("vid-1")));
        assert_eq!(snapshot.current_ad_id, Some(AdId::new("ad-1")));
    }
}
