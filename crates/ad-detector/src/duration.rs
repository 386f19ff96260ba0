//! Best-effort ad duration estimation.
//!
//! An explicit priority-ordered strategy list: each strategy inspects the
//! evidence gathered for the current ad and either produces an estimate with
//! its source and confidence, or abstains. The final heuristic never
//! abstains, so [`estimate_duration`] is total.

use tracing::debug;

use adwatch_core_types::DurationSource;

use crate::tuning::DetectorTuning;

/// One observed skip-countdown value and when it was read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountdownReading {
    pub at_ms: i64,
    pub seconds_remaining: u32,
}

/// Everything the strategies may consult for one ad.
#[derive(Clone, Debug, Default)]
pub struct DurationEvidence {
    /// Wall-clock ad start, when observed.
    pub ad_started_ms: Option<i64>,

    /// Wall-clock ad end, when observed.
    pub ad_ended_ms: Option<i64>,

    /// The host video element's own duration while the ad is active.
    pub video_duration_s: Option<f64>,
    pub ad_active: bool,

    /// Repeated skip-countdown readings, in observation order.
    pub countdown_readings: Vec<CountdownReading>,

    /// Ad length parsed from visible overlay text ("0:15").
    pub dom_text_seconds: Option<u32>,

    /// Total seconds exposed by the ad progress element itself.
    pub progress_value_total_s: Option<f64>,

    /// Total parsed from the progress bar's duration label.
    pub progress_label_seconds: Option<u32>,

    /// Whether a skip control was ever located for this ad.
    pub skip_control_seen: bool,
}

/// The outcome of the estimation chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DurationEstimate {
    pub seconds: u32,
    pub source: DurationSource,
    pub confidence: f64,
    pub detected: bool,

    /// Skip-inference retroactively marks the ad skippable.
    pub implies_skippable: bool,
}

impl DurationEstimate {
    fn detected(seconds: u32, source: DurationSource, confidence: f64) -> Self {
        Self {
            seconds,
            source,
            confidence,
            detected: true,
            implies_skippable: false,
        }
    }
}

type Strategy = fn(&DurationEvidence, &DetectorTuning) -> Option<DurationEstimate>;

/// (1) Live-measured wall-clock span from ad start to ad end.
fn live_span(evidence: &DurationEvidence, _tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let started = evidence.ad_started_ms?;
    let ended = evidence.ad_ended_ms?;
    let span_s = ((ended - started) as f64 / 1_000.0).round();
    if span_s < 1.0 {
        return None;
    }
    Some(DurationEstimate::detected(
        span_s as u32,
        DurationSource::RealTracking,
        0.95,
    ))
}

/// (2) The video element's duration, when small enough to plausibly be an ad.
fn video_element(evidence: &DurationEvidence, tuning: &DetectorTuning) -> Option<DurationEstimate> {
    if !evidence.ad_active {
        return None;
    }
    let duration = evidence.video_duration_s?;
    if !duration.is_finite() || duration < 1.0 || duration >= tuning.max_plausible_ad_duration_s {
        return None;
    }
    Some(DurationEstimate::detected(
        duration.round() as u32,
        DurationSource::VideoElement,
        0.85,
    ))
}

/// (3) Extrapolate the full duration from the observed countdown rate.
fn countdown_rate(evidence: &DurationEvidence, _tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let readings = &evidence.countdown_readings;
    if readings.len() < 2 {
        return None;
    }
    let first = readings.first()?;
    let last = readings.last()?;
    let elapsed_s = (last.at_ms - first.at_ms) as f64 / 1_000.0;
    let counted_down = first.seconds_remaining as f64 - last.seconds_remaining as f64;
    if elapsed_s <= 0.0 || counted_down <= 0.0 {
        return None;
    }
    let rate = counted_down / elapsed_s;
    if rate < 0.2 {
        return None;
    }
    // Countdown covers the remainder; add what played before the first read.
    let before_first_s = evidence
        .ad_started_ms
        .map(|started| ((first.at_ms - started).max(0)) as f64 / 1_000.0)
        .unwrap_or(0.0);
    let total = first.seconds_remaining as f64 / rate + before_first_s;
    Some(DurationEstimate::detected(
        total.round() as u32,
        DurationSource::SkipCalculation,
        0.7,
    ))
}

/// (4) A numeric ad length shown in visible overlay text.
fn dom_text(evidence: &DurationEvidence, _tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let seconds = evidence.dom_text_seconds.filter(|s| *s > 0)?;
    Some(DurationEstimate::detected(seconds, DurationSource::DomText, 0.6))
}

/// (5a) The progress element's own total.
fn progress_total(evidence: &DurationEvidence, _tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let total = evidence
        .progress_value_total_s
        .filter(|t| t.is_finite() && *t >= 1.0)?;
    Some(DurationEstimate::detected(
        total.round() as u32,
        DurationSource::ProgressTotal,
        0.55,
    ))
}

/// (5b) The progress bar's total-duration label.
fn progress_label(evidence: &DurationEvidence, _tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let seconds = evidence.progress_label_seconds.filter(|s| *s > 0)?;
    Some(DurationEstimate::detected(
        seconds,
        DurationSource::ProgressBar,
        0.5,
    ))
}

/// (6) Round a short skip countdown up to the nearest known ad length.
/// A countdown existing at all implies an eventual skip option.
fn skip_inference(evidence: &DurationEvidence, tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let latest = evidence.countdown_readings.last()?.seconds_remaining;
    if latest == 0 {
        return None;
    }
    let bucket = tuning
        .skip_inference_buckets
        .iter()
        .copied()
        .find(|bucket| *bucket >= latest)?;
    Some(DurationEstimate {
        seconds: bucket,
        source: DurationSource::SkipInference,
        confidence: 0.4,
        detected: false,
        implies_skippable: true,
    })
}

/// (7) Final heuristic: bumper-length if no skip control was ever found,
/// standard skippable length otherwise.
fn fallback(evidence: &DurationEvidence, tuning: &DetectorTuning) -> Option<DurationEstimate> {
    let seconds = if evidence.skip_control_seen {
        tuning.fallback_duration_with_skip_s
    } else {
        tuning.fallback_duration_no_skip_s
    };
    Some(DurationEstimate {
        seconds,
        source: DurationSource::Estimation,
        confidence: 0.2,
        detected: false,
        implies_skippable: false,
    })
}

const CHAIN: &[(&str, Strategy)] = &[
    ("live-span", live_span),
    ("video-element", video_element),
    ("countdown-rate", countdown_rate),
    ("dom-text", dom_text),
    ("progress-total", progress_total),
    ("progress-label", progress_label),
    ("skip-inference", skip_inference),
    ("fallback", fallback),
];

/// Run the strategy chain; the fallback guarantees a result.
pub fn estimate_duration(evidence: &DurationEvidence, tuning: &DetectorTuning) -> DurationEstimate {
    for (name, strategy) in CHAIN {
        if let Some(estimate) = strategy(evidence, tuning) {
            debug!(
                strategy = name,
                seconds = estimate.seconds,
                confidence = estimate.confidence,
                "duration estimated"
            );
            return estimate;
        }
    }
    // The fallback strategy never abstains.
    DurationEstimate {
        seconds: tuning.fallback_duration_no_skip_s,
        source: DurationSource::Estimation,
        confidence: 0.1,
        detected: false,
        implies_skippable: false,
    }
}
