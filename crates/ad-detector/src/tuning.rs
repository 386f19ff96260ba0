//! Empirically tuned detection constants.
//!
//! The skip-inference buckets and the post-roll thresholds were observed on
//! the targeted page layout, not derived; they are carried as configuration
//! rather than hard invariants.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorTuning {
    /// Fixed sampling interval for the detection loop.
    pub poll_interval_ms: u64,

    /// Bounded retries while required inputs race page load.
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,

    /// Minimum inter-send interval enforced by the outbound gate.
    pub min_send_interval_ms: u64,

    /// A video-element duration above this cannot plausibly be an ad.
    pub max_plausible_ad_duration_s: f64,

    /// Short skip countdowns round up to the nearest of these, seconds.
    pub skip_inference_buckets: Vec<u32>,

    /// Pre-roll window: `time <= max(duration * fraction, floor)`.
    pub pre_roll_fraction: f64,
    pub pre_roll_floor_s: f64,

    /// Post-roll thresholds: absolute fraction of the duration, plus a
    /// redundant ratio safety margin.
    pub post_roll_fraction: f64,
    pub post_roll_ratio: f64,

    /// Post-roll floor applied when no reliable duration exists.
    pub post_roll_no_duration_floor_s: f64,

    /// Host videos shorter than this are too short to classify against.
    pub classify_min_duration_s: f64,

    /// Final duration heuristics when every other strategy abstained.
    pub fallback_duration_no_skip_s: u32,
    pub fallback_duration_with_skip_s: u32,
}

impl Default for DetectorTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            retry_attempts: 5,
            retry_backoff_ms: 200,
            min_send_interval_ms: 500,
            max_plausible_ad_duration_s: 300.0,
            skip_inference_buckets: vec![6, 15, 20],
            pre_roll_fraction: 0.05,
            pre_roll_floor_s: 10.0,
            post_roll_fraction: 0.90,
            post_roll_ratio: 0.85,
            post_roll_no_duration_floor_s: 300.0,
            classify_min_duration_s: 30.0,
            fallback_duration_no_skip_s: 6,
            fallback_duration_with_skip_s: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_constants() {
        let tuning = DetectorTuning::default();
        assert_eq!(tuning.skip_inference_buckets, vec![6, 15, 20]);
        assert_eq!(tuning.post_roll_fraction, 0.90);
        assert_eq!(tuning.post_roll_ratio, 0.85);
        assert_eq!(tuning.retry_attempts, 5);
    }

    #[test]
    fn partial_json_overrides_merge_with_defaults() {
        let tuning: DetectorTuning =
            serde_json::from_str(r#"{"poll_interval_ms": 250}"#).unwrap();
        assert_eq!(tuning.poll_interval_ms, 250);
        assert_eq!(tuning.retry_attempts, 5);
    }
}
