//! Position and type classification.

use adwatch_core_types::{AdPosition, AdType};

use crate::tuning::DetectorTuning;

/// Classify an ad's temporal position within its host video.
///
/// `reference_time_s`/`reference_duration_s` come from the Ad Sequence
/// Context while a sequence is active, so every ad of a consecutive run is
/// judged against the same host-video reference point. A non-finite or
/// non-positive duration means "no reliable duration exists".
///
/// Total: for any duration in `[min, inf)` the result is exactly one of
/// pre/mid/post; shorter (but known) durations are too short to classify.
pub fn classify(
    reference_time_s: f64,
    reference_duration_s: f64,
    has_ended: bool,
    tuning: &DetectorTuning,
) -> AdPosition {
    if !reference_duration_s.is_finite() || reference_duration_s <= 0.0 {
        // No reliable duration: only the absolute signals remain.
        if has_ended || reference_time_s >= tuning.post_roll_no_duration_floor_s {
            return AdPosition::PostRoll;
        }
        return AdPosition::Unknown;
    }

    if reference_duration_s < tuning.classify_min_duration_s {
        return AdPosition::Unknown;
    }

    let pre_roll_window = (reference_duration_s * tuning.pre_roll_fraction)
        .max(tuning.pre_roll_floor_s);
    if reference_time_s <= pre_roll_window {
        return AdPosition::PreRoll;
    }

    if has_ended
        || reference_time_s >= reference_duration_s * tuning.post_roll_fraction
        || reference_time_s / reference_duration_s > tuning.post_roll_ratio
    {
        return AdPosition::PostRoll;
    }

    AdPosition::MidRoll
}

/// Derive the ad format from skippability and duration.
///
/// `container_seen` distinguishes "an ad container was detected but nothing
/// else is known" from "nothing was detected at all".
pub fn derive_ad_type(is_skippable: bool, duration_s: u32, container_seen: bool) -> AdType {
    if is_skippable {
        return AdType::Skippable;
    }
    if duration_s > 0 {
        return match duration_s {
            0..=6 => AdType::Bumper,
            7..=15 => AdType::NonSkippableShort,
            16..=30 => AdType::NonSkippableMedium,
            _ => AdType::NonSkippableLong,
        };
    }
    if container_seen {
        AdType::NonSkippable
    } else {
        AdType::Unknown
    }
}
