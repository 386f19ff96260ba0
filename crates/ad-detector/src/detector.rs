//! The ad/video detection state machine.
//!
//! One `sample()` pass: short-circuit on non-media pages, resolve the
//! video/ad identifiers through the source cascades (with bounded retry
//! while the page is still loading), apply ad lifecycle transitions, rebuild
//! the ad descriptor, and offer the derived state to the outbound gate.
//! Everything page-facing is best-effort; a pass never fails, it only
//! produces less.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use adwatch_core_types::{now_ms, AdDescriptor, AdId, VideoId};
use page_locator::{soften, ElementDescriptor, ElementLocator, PagePort, VideoState};
use watch_protocol::{GateDecision, Observation, ObserverMessage, OutboundGate};

use crate::classify::{classify, derive_ad_type};
use crate::duration::{estimate_duration, CountdownReading, DurationEvidence};
use crate::sample::{resolve_ad_id, resolve_video_id, PageSample};
use crate::tuning::DetectorTuning;

/// Consecutive-ad-sequence tracking.
///
/// The host video's reference time/duration are captured once when the
/// sequence begins and held constant across every ad of the run, so all of
/// them classify against the same point in the host video.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SequenceContext {
    pub in_sequence: bool,
    pub ordinal: u32,
    pub reference_time_s: f64,
    pub reference_duration_s: f64,
}

impl SequenceContext {
    fn begin(&mut self, video: Option<VideoState>) {
        self.in_sequence = true;
        self.ordinal = 1;
        self.reference_time_s = video.map(|v| v.current_time_s).unwrap_or(0.0);
        self.reference_duration_s = video
            .filter(VideoState::has_reliable_duration)
            .map(|v| v.duration_s)
            .unwrap_or(0.0);
    }

    fn advance(&mut self) {
        self.ordinal += 1;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-ad measurement state, reset whenever a new ad begins.
#[derive(Debug)]
struct AdTracking {
    ad_id: AdId,
    started_ms: i64,
    text_signature: Option<String>,
    countdown_readings: Vec<CountdownReading>,
    dom_text_seconds: Option<u32>,
    progress_value_total_s: Option<f64>,
    progress_label_seconds: Option<u32>,
    skip_control_seen: bool,
    skip_phrase_seen: bool,
    non_skippable_marker_seen: bool,
    container_seen: bool,
}

impl AdTracking {
    fn begin(ad_id: AdId, started_ms: i64, text_signature: Option<String>) -> Self {
        Self {
            ad_id,
            started_ms,
            text_signature,
            countdown_readings: Vec::new(),
            dom_text_seconds: None,
            progress_value_total_s: None,
            progress_label_seconds: None,
            skip_control_seen: false,
            skip_phrase_seen: false,
            non_skippable_marker_seen: false,
            container_seen: false,
        }
    }
}

#[derive(Default)]
struct DetectorState {
    sequence: SequenceContext,
    tracking: Option<AdTracking>,
}

/// Derived-state key the outbound gate de-duplicates on: identifier and
/// activity changes matter, diagnostic payload churn does not.
#[derive(Clone, Debug, PartialEq)]
struct ObservationKey {
    video_id: Option<VideoId>,
    ad_id: Option<AdId>,
    ad_active: bool,
}

/// Point-in-time element observations taken while an ad is active.
#[derive(Debug, Default)]
struct AdObservations {
    skip_button_visible: bool,
    skip_countdown_text: Option<String>,
    overlay_text: Option<String>,
    progress_value_text: Option<String>,
    progress_label_text: Option<String>,
    non_skippable_marker: bool,
    container_seen: bool,
    container_text: Option<String>,
    page_text: Option<String>,
}

/// Messages produced by one sampling pass, in send order.
#[derive(Debug, Default)]
pub struct SampleOutput {
    pub messages: Vec<ObserverMessage>,
}

impl SampleOutput {
    /// The gated observation of this pass, if one was admitted.
    pub fn observation(&self) -> Option<&Observation> {
        self.messages.iter().find_map(|message| match message {
            ObserverMessage::Observation(observation) => Some(observation),
            _ => None,
        })
    }
}

pub struct Detector {
    locator: ElementLocator,
    tuning: DetectorTuning,
    gate: OutboundGate<ObservationKey>,
    state: Mutex<DetectorState>,
}

impl Detector {
    pub fn new(port: Arc<dyn PagePort>, tuning: DetectorTuning) -> Self {
        let gate = OutboundGate::new(Duration::from_millis(tuning.min_send_interval_ms));
        Self {
            locator: ElementLocator::new(port),
            tuning,
            gate,
            state: Mutex::new(DetectorState::default()),
        }
    }

    pub fn tuning(&self) -> &DetectorTuning {
        &self.tuning
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.tuning.poll_interval_ms)
    }

    /// Current sequence context (diagnostics and tests).
    pub fn sequence(&self) -> SequenceContext {
        self.state.lock().sequence.clone()
    }

    /// Page closed: drop all transient per-instance state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tracking = None;
        state.sequence.reset();
        self.gate.reset();
    }

    /// Run one detection pass.
    pub async fn sample(&self) -> SampleOutput {
        let mut output = SampleOutput::default();
        let port = self.locator.port();

        // 1. Non-media pages clear everything.
        if !port.is_media_route().await || !port.player_present().await {
            {
                let mut state = self.state.lock();
                if let Some(tracking) = state.tracking.take() {
                    self.log_final_duration(&tracking, now_ms());
                    output.messages.push(ObserverMessage::AdEnded);
                }
                state.sequence.reset();
            }
            let observation = Observation::empty();
            if self.admit(&observation) {
                output.messages.push(ObserverMessage::Observation(observation));
            }
            return output;
        }

        // 2./3. Identifier cascades, with bounded retry while the page is
        // still racing its own load.
        let mut page = PageSample::collect(port.as_ref()).await;
        let mut resolved_video = resolve_video_id(&page);
        let mut attempts = 0u32;
        while resolved_video.is_none() && attempts < self.tuning.retry_attempts {
            attempts += 1;
            sleep(Duration::from_millis(self.tuning.retry_backoff_ms)).await;
            page = PageSample::collect(port.as_ref()).await;
            resolved_video = resolve_video_id(&page);
        }
        if resolved_video.is_none() {
            debug!(attempts, "video id unresolved after bounded retries, emitting partial state");
        }

        let resolved_ad = resolve_ad_id(&page);
        let video_state = soften("video-state", port.video_state().await);
        let now = now_ms();

        // Element observations happen outside the state lock.
        let observations = if resolved_ad.is_some() {
            Some(self.observe_ad_elements().await)
        } else {
            None
        };

        let (video_id, video_source) = match resolved_video {
            Some((id, source)) => (Some(id), source),
            None => (None, "none"),
        };
        let (ad_id, ad_source) = match resolved_ad {
            Some((id, source)) => (Some(id), source),
            None => (None, "none"),
        };

        let (descriptor, ordinal, in_sequence) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            self.apply_transitions(
                state,
                ad_id.as_ref(),
                observations.as_ref(),
                video_state,
                now,
                &mut output.messages,
            );

            let sequence = state.sequence.clone();
            let descriptor = match (state.tracking.as_mut(), observations.as_ref()) {
                (Some(tracking), Some(observed)) => {
                    Some(self.describe_ad(tracking, &sequence, observed, video_state, now))
                }
                _ => None,
            };
            (descriptor, sequence.ordinal, sequence.in_sequence)
        };

        let observation = Observation {
            video_id,
            ad_id: ad_id.clone(),
            ad_active: ad_id.is_some(),
            ad_descriptor: descriptor,
            debug_text: page.debug_text.clone().unwrap_or_default(),
            debug_info: json!({
                "url": page.page_url,
                "videoSource": video_source,
                "adSource": ad_source,
                "retryAttempts": attempts,
                "inSequence": in_sequence,
                "sequenceOrdinal": ordinal,
            }),
        };
        if self.admit(&observation) {
            output.messages.push(ObserverMessage::Observation(observation));
        }
        output
    }

    fn admit(&self, observation: &Observation) -> bool {
        let key = ObservationKey {
            video_id: observation.video_id.clone(),
            ad_id: observation.ad_id.clone(),
            ad_active: observation.ad_active,
        };
        match self.gate.admit(&key) {
            GateDecision::Send => true,
            GateDecision::Duplicate => false,
            GateDecision::RateLimited => {
                // Not recorded as sent; the next poll re-derives and retries.
                debug!("observation held back by rate limit");
                false
            }
        }
    }

    /// Apply ad lifecycle transitions for this pass.
    fn apply_transitions(
        &self,
        state: &mut DetectorState,
        ad_id: Option<&AdId>,
        observations: Option<&AdObservations>,
        video_state: Option<VideoState>,
        now: i64,
        lifecycle: &mut Vec<ObserverMessage>,
    ) {
        let signature = observations.and_then(text_signature);
        match (state.tracking.take(), ad_id) {
            (None, Some(id)) => {
                self.on_ad_start(state, id.clone(), signature, video_state, now);
                lifecycle.push(ObserverMessage::AdStarted { ad_id: id.clone() });
            }
            (Some(previous), Some(id)) if previous.ad_id != *id => {
                // Back-to-back swap: the next ad of the same break.
                self.log_final_duration(&previous, now);
                lifecycle.push(ObserverMessage::AdEnded);
                self.on_ad_start(state, id.clone(), signature, video_state, now);
                lifecycle.push(ObserverMessage::AdStarted { ad_id: id.clone() });
            }
            (Some(mut tracking), Some(id)) => {
                // Same nominal id; a changed rendered-text signature means
                // the creative itself changed underneath it.
                let changed = matches!(
                    (&tracking.text_signature, &signature),
                    (Some(old), Some(new)) if old != new
                );
                if changed {
                    info!(ad = %id, "ad content changed under unchanged id, advancing sequence");
                    state.sequence.advance();
                    tracking = AdTracking::begin(id.clone(), now, signature);
                } else if tracking.text_signature.is_none() {
                    tracking.text_signature = signature;
                }
                state.tracking = Some(tracking);
            }
            (Some(previous), None) => {
                self.log_final_duration(&previous, now);
                // No further ad in the same poll: the break is over.
                state.sequence.reset();
                lifecycle.push(ObserverMessage::AdEnded);
            }
            (None, None) => {}
        }
    }

    fn on_ad_start(
        &self,
        state: &mut DetectorState,
        ad_id: AdId,
        signature: Option<String>,
        video_state: Option<VideoState>,
        now: i64,
    ) {
        if !state.sequence.in_sequence {
            state.sequence.begin(video_state);
        } else {
            state.sequence.advance();
        }
        info!(ad = %ad_id, ordinal = state.sequence.ordinal, "ad started");
        state.tracking = Some(AdTracking::begin(ad_id, now, signature));
    }

    fn log_final_duration(&self, tracking: &AdTracking, now: i64) {
        let evidence = DurationEvidence {
            ad_started_ms: Some(tracking.started_ms),
            ad_ended_ms: Some(now),
            countdown_readings: tracking.countdown_readings.clone(),
            skip_control_seen: tracking.skip_control_seen,
            ..Default::default()
        };
        let estimate = estimate_duration(&evidence, &self.tuning);
        info!(
            ad = %tracking.ad_id,
            seconds = estimate.seconds,
            source = ?estimate.source,
            "ad ended"
        );
    }

    /// Fold this pass's element observations into the tracking state and
    /// rebuild the descriptor.
    fn describe_ad(
        &self,
        tracking: &mut AdTracking,
        sequence: &SequenceContext,
        observed: &AdObservations,
        video_state: Option<VideoState>,
        now: i64,
    ) -> AdDescriptor {
        if observed.skip_button_visible {
            tracking.skip_control_seen = true;
        }
        if observed.non_skippable_marker {
            tracking.non_skippable_marker_seen = true;
        }
        if observed.container_seen {
            tracking.container_seen = true;
        }
        if let Some(text) = &observed.skip_countdown_text {
            if let Some(seconds) = parse_countdown(text) {
                let novel = tracking
                    .countdown_readings
                    .last()
                    .map(|reading| reading.seconds_remaining != seconds)
                    .unwrap_or(true);
                if novel {
                    tracking.countdown_readings.push(CountdownReading {
                        at_ms: now,
                        seconds_remaining: seconds,
                    });
                }
            }
            if text_implies_skip(text) {
                tracking.skip_phrase_seen = true;
            }
        }
        if let Some(text) = &observed.page_text {
            if text_implies_skip(text) {
                tracking.skip_phrase_seen = true;
            }
        }
        if tracking.dom_text_seconds.is_none() {
            tracking.dom_text_seconds = observed
                .overlay_text
                .as_deref()
                .and_then(parse_duration_text);
        }
        if tracking.progress_value_total_s.is_none() {
            tracking.progress_value_total_s = observed
                .progress_value_text
                .as_deref()
                .and_then(|text| text.trim().parse::<f64>().ok());
        }
        if tracking.progress_label_seconds.is_none() {
            tracking.progress_label_seconds = observed
                .progress_label_text
                .as_deref()
                .and_then(parse_duration_text);
        }

        let evidence = DurationEvidence {
            ad_started_ms: Some(tracking.started_ms),
            ad_ended_ms: None,
            video_duration_s: video_state.map(|v| v.duration_s),
            ad_active: true,
            countdown_readings: tracking.countdown_readings.clone(),
            dom_text_seconds: tracking.dom_text_seconds,
            progress_value_total_s: tracking.progress_value_total_s,
            progress_label_seconds: tracking.progress_label_seconds,
            skip_control_seen: tracking.skip_control_seen,
        };
        let estimate = estimate_duration(&evidence, &self.tuning);

        // Direct evidence decides the type; a bare countdown only implies an
        // eventual skip option, which upgrades the flag but not the format.
        let direct_skip_evidence = tracking.skip_control_seen || tracking.skip_phrase_seen;
        let is_skippable = direct_skip_evidence
            || !tracking.countdown_readings.is_empty()
            || estimate.implies_skippable;
        if is_skippable && tracking.non_skippable_marker_seen {
            warn!(
                ad = %tracking.ad_id,
                "contradictory skippability signals, trusting skip evidence"
            );
        }

        let has_ended = video_state.map(|v| v.ended).unwrap_or(false);
        let (reference_time, reference_duration) = if sequence.in_sequence {
            (sequence.reference_time_s, sequence.reference_duration_s)
        } else {
            video_state
                .map(|v| (v.current_time_s, v.duration_s))
                .unwrap_or((0.0, 0.0))
        };
        let position = classify(reference_time, reference_duration, has_ended, &self.tuning);

        AdDescriptor {
            ad_type: derive_ad_type(direct_skip_evidence, estimate.seconds, tracking.container_seen),
            is_skippable,
            duration_s: estimate.seconds,
            duration_detected: estimate.detected,
            duration_source: estimate.source,
            position,
        }
    }

    async fn observe_ad_elements(&self) -> AdObservations {
        let skip_button = self
            .locator
            .locate_visible(ElementDescriptor::SkipButton)
            .await;
        let container = self.locator.locate(ElementDescriptor::AdContainer).await;
        AdObservations {
            skip_button_visible: skip_button.is_some(),
            skip_countdown_text: self
                .locator
                .text_of(ElementDescriptor::SkipCountdownText)
                .await,
            overlay_text: self.locator.text_of(ElementDescriptor::AdOverlayText).await,
            progress_value_text: self.locator.text_of(ElementDescriptor::AdProgressBar).await,
            progress_label_text: self
                .locator
                .text_of(ElementDescriptor::ProgressTotalLabel)
                .await,
            non_skippable_marker: self
                .locator
                .locate(ElementDescriptor::NonSkippableMarker)
                .await
                .is_some(),
            container_text: container.as_ref().and_then(|handle| handle.text.clone()),
            container_seen: container.is_some(),
            page_text: soften("visible-text", self.locator.port().visible_text().await),
        }
    }
}

/// Rendered-text signature used to spot a creative swap under one ad id.
fn text_signature(observed: &AdObservations) -> Option<String> {
    observed
        .overlay_text
        .clone()
        .or_else(|| observed.container_text.clone())
}

/// First small integer in skip-adjacent text ("Skip in 4" -> 4).
fn parse_countdown(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse::<u32>().ok().filter(|n| (1..=99).contains(n))
}

/// "0:15" / "1:05" / "15" as seconds.
fn parse_duration_text(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if let Some((minutes, seconds)) = trimmed.split_once(':') {
        let minutes = minutes.trim().parse::<u32>().ok()?;
        let seconds = seconds.trim().parse::<u32>().ok()?;
        if seconds >= 60 {
            return None;
        }
        return Some(minutes * 60 + seconds);
    }
    trimmed.parse::<u32>().ok().filter(|n| *n > 0)
}

/// An explicit skip-now affordance, as opposed to a countdown phrasing.
fn text_implies_skip(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["skip ad", "skip ads", "skip this ad", "omitir", "saltar"]
        .iter()
        .any(|phrase| lower.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use adwatch_core_types::{AdPosition, AdType, DurationSource};
    use page_locator::{ElementHandle, LocatorError};

    /// Scriptable page: tests flip the scene between samples.
    #[derive(Default)]
    struct Scene {
        media: bool,
        video_id: Option<String>,
        ad_id: Option<String>,
        video: Option<VideoState>,
        skip_button: bool,
        skip_text: Option<String>,
        overlay_text: Option<String>,
    }

    #[derive(Default)]
    struct ScriptedPage {
        scene: Mutex<Scene>,
    }

    impl ScriptedPage {
        fn set(&self, scene: Scene) {
            *self.scene.lock() = scene;
        }
    }

    #[async_trait]
    impl PagePort for ScriptedPage {
        async fn player_present(&self) -> bool {
            self.scene.lock().media
        }

        async fn is_media_route(&self) -> bool {
            self.scene.lock().media
        }

        async fn page_url(&self) -> Result<Option<String>, LocatorError> {
            Ok(self
                .scene
                .lock()
                .video_id
                .as_ref()
                .map(|id| format!("https://media.example/watch?v={id}")))
        }

        async fn player_config(&self) -> Result<Option<Value>, LocatorError> {
            let scene = self.scene.lock();
            let mut config = serde_json::Map::new();
            if let Some(video) = &scene.video_id {
                config.insert("debugVideoId".into(), json!(video));
            }
            if let Some(ad) = &scene.ad_id {
                config.insert("debugAdId".into(), json!(ad));
            }
            if config.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Value::Object(config)))
            }
        }

        async fn debug_text(&self) -> Result<Option<String>, LocatorError> {
            Ok(None)
        }

        async fn initial_response(&self) -> Result<Option<Value>, LocatorError> {
            Ok(None)
        }

        async fn page_metadata(&self) -> Result<Option<Value>, LocatorError> {
            Ok(None)
        }

        async fn visible_text(&self) -> Result<Option<String>, LocatorError> {
            Ok(None)
        }

        async fn query(
            &self,
            descriptor: ElementDescriptor,
        ) -> Result<Option<ElementHandle>, LocatorError> {
            let scene = self.scene.lock();
            Ok(match descriptor {
                ElementDescriptor::SkipButton if scene.skip_button => {
                    Some(ElementHandle::new(1, true, Some("Skip Ad".into())))
                }
                ElementDescriptor::SkipCountdownText => scene
                    .skip_text
                    .clone()
                    .map(|text| ElementHandle::new(2, true, Some(text))),
                ElementDescriptor::AdContainer if scene.ad_id.is_some() => {
                    Some(ElementHandle::new(3, true, None))
                }
                ElementDescriptor::AdOverlayText => scene
                    .overlay_text
                    .clone()
                    .map(|text| ElementHandle::new(4, true, Some(text))),
                _ => None,
            })
        }

        async fn video_state(&self) -> Result<Option<VideoState>, LocatorError> {
            Ok(self.scene.lock().video)
        }
    }

    fn test_tuning() -> DetectorTuning {
        DetectorTuning {
            min_send_interval_ms: 0,
            retry_attempts: 1,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn detector(page: Arc<ScriptedPage>) -> Detector {
        Detector::new(page, test_tuning())
    }

    fn playback_scene(video: &str, t: f64, d: f64) -> Scene {
        Scene {
            media: true,
            video_id: Some(video.into()),
            video: Some(VideoState {
                current_time_s: t,
                duration_s: d,
                ended: false,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unchanged_state_is_emitted_once() {
        let page = Arc::new(ScriptedPage::default());
        page.set(playback_scene("vid-1", 5.0, 120.0));
        let detector = detector(page);

        let first = detector.sample().await;
        assert!(first.observation().is_some());

        for _ in 0..3 {
            let next = detector.sample().await;
            assert!(next.observation().is_none());
        }
    }

    #[tokio::test]
    async fn video_change_is_emitted() {
        let page = Arc::new(ScriptedPage::default());
        page.set(playback_scene("vid-1", 5.0, 120.0));
        let detector = detector(Arc::clone(&page));

        detector.sample().await;
        page.set(playback_scene("vid-2", 0.0, 90.0));
        let output = detector.sample().await;
        let observation = output.observation().unwrap();
        assert_eq!(observation.video_id.as_ref().unwrap().0, "vid-2");
        assert!(!observation.ad_active);
    }

    #[tokio::test]
    async fn non_media_page_clears_state_once() {
        let page = Arc::new(ScriptedPage::default());
        page.set(playback_scene("vid-1", 5.0, 120.0));
        let detector = detector(Arc::clone(&page));
        detector.sample().await;

        page.set(Scene::default());
        let cleared = detector.sample().await;
        let observation = cleared.observation().unwrap();
        assert!(observation.video_id.is_none());
        assert!(!observation.ad_active);

        assert!(detector.sample().await.observation().is_none());
    }

    #[tokio::test]
    async fn non_media_page_ends_an_active_ad() {
        let page = Arc::new(ScriptedPage::default());
        let mut scene = playback_scene("vid-1", 5.0, 120.0);
        scene.ad_id = Some("ad-a".into());
        page.set(scene);
        let detector = detector(Arc::clone(&page));
        detector.sample().await;
        assert!(detector.sequence().in_sequence);

        page.set(Scene::default());
        let output = detector.sample().await;
        assert!(output
            .messages
            .iter()
            .any(|message| matches!(message, ObserverMessage::AdEnded)));
        assert!(!detector.sequence().in_sequence);
    }

    #[tokio::test]
    async fn ad_start_emits_lifecycle_and_descriptor() {
        let page = Arc::new(ScriptedPage::default());
        page.set(playback_scene("vid-1", 2.0, 40.0));
        let detector = detector(Arc::clone(&page));
        detector.sample().await;

        let mut scene = playback_scene("vid-1", 2.0, 40.0);
        scene.ad_id = Some("ad-a".into());
        scene.skip_button = true;
        page.set(scene);

        let output = detector.sample().await;
        assert!(matches!(
            output.messages.first(),
            Some(ObserverMessage::AdStarted { .. })
        ));
        let observation = output.observation().unwrap();
        assert!(observation.ad_active);
        let descriptor = observation.ad_descriptor.as_ref().unwrap();
        assert_eq!(descriptor.ad_type, AdType::Skippable);
        assert!(descriptor.is_skippable);
        assert_eq!(descriptor.position, AdPosition::PreRoll);
        assert_eq!(detector.sequence().ordinal, 1);
    }

    #[tokio::test]
    async fn consecutive_ads_share_the_sequence_reference() {
        let page = Arc::new(ScriptedPage::default());
        page.set(playback_scene("vid-1", 300.0, 600.0));
        let detector = detector(Arc::clone(&page));
        detector.sample().await;

        for (ordinal, ad) in ["ad-a", "ad-b", "ad-c"].iter().enumerate() {
            let mut scene = playback_scene("vid-1", 300.0, 600.0);
            scene.ad_id = Some((*ad).into());
            if ordinal > 0 {
                // Later ads reset the visible playhead; the reference must
                // not move with it.
                scene.video = Some(VideoState {
                    current_time_s: 1.0 + ordinal as f64,
                    duration_s: 30.0,
                    ended: false,
                });
            }
            page.set(scene);

            let output = detector.sample().await;
            let observation = output.observation().unwrap();
            let descriptor = observation.ad_descriptor.as_ref().unwrap();
            assert_eq!(descriptor.position, AdPosition::MidRoll);
            assert_eq!(detector.sequence().ordinal, ordinal as u32 + 1);
            assert_eq!(detector.sequence().reference_time_s, 300.0);
            assert_eq!(detector.sequence().reference_duration_s, 600.0);
        }
    }

    #[tokio::test]
    async fn ad_end_closes_the_sequence() {
        let page = Arc::new(ScriptedPage::default());
        let mut scene = playback_scene("vid-1", 50.0, 600.0);
        scene.ad_id = Some("ad-a".into());
        page.set(scene);
        let detector = detector(Arc::clone(&page));
        detector.sample().await;
        assert!(detector.sequence().in_sequence);

        page.set(playback_scene("vid-1", 51.0, 600.0));
        let output = detector.sample().await;
        assert!(output
            .messages
            .iter()
            .any(|message| matches!(message, ObserverMessage::AdEnded)));
        let observation = output.observation().unwrap();
        assert!(!observation.ad_active);
        assert!(!detector.sequence().in_sequence);
        assert_eq!(detector.sequence().ordinal, 0);
    }

    #[tokio::test]
    async fn changed_creative_under_same_id_advances_sequence() {
        let page = Arc::new(ScriptedPage::default());
        let mut scene = playback_scene("vid-1", 50.0, 600.0);
        scene.ad_id = Some("ad-a".into());
        scene.overlay_text = Some("Brand one".into());
        page.set(scene);
        let detector = detector(Arc::clone(&page));
        detector.sample().await;
        assert_eq!(detector.sequence().ordinal, 1);

        let mut scene = playback_scene("vid-1", 50.0, 600.0);
        scene.ad_id = Some("ad-a".into());
        scene.overlay_text = Some("Brand two".into());
        page.set(scene);
        detector.sample().await;
        assert_eq!(detector.sequence().ordinal, 2);
    }

    #[tokio::test]
    async fn skip_countdown_without_live_duration_infers_bumper() {
        let page = Arc::new(ScriptedPage::default());
        let mut scene = playback_scene("vid-1", 40.0, 600.0);
        scene.ad_id = Some("ad-a".into());
        scene.skip_text = Some("Skip in 4".into());
        scene.video = Some(VideoState {
            current_time_s: 0.0,
            duration_s: 0.0,
            ended: false,
        });
        page.set(scene);
        let detector = detector(Arc::clone(&page));

        let output = detector.sample().await;
        let descriptor = output.observation().unwrap().ad_descriptor.as_ref().unwrap();
        assert_eq!(descriptor.ad_type, AdType::Bumper);
        assert_eq!(descriptor.duration_s, 6);
        assert_eq!(descriptor.duration_source, DurationSource::SkipInference);
        assert!(descriptor.is_skippable);
        assert!(!descriptor.duration_detected);
    }

    #[test]
    fn countdown_parsing() {
        assert_eq!(parse_countdown("Skip in 4"), Some(4));
        assert_eq!(parse_countdown("You can skip in 12s"), Some(12));
        assert_eq!(parse_countdown("Skip"), None);
        assert_eq!(parse_countdown("Skip in 0"), None);
    }

    #[test]
    fn duration_text_parsing() {
        assert_eq!(parse_duration_text("0:15"), Some(15));
        assert_eq!(parse_duration_text("1:05"), Some(65));
        assert_eq!(parse_duration_text("30"), Some(30));
        assert_eq!(parse_duration_text("1:75"), None);
        assert_eq!(parse_duration_text("soon"), None);
    }

    #[test]
    fn skip_phrases_exclude_countdowns() {
        assert!(text_implies_skip("Skip Ad"));
        assert!(text_implies_skip("Omitir anuncio"));
        assert!(!text_implies_skip("Skip in 4"));
    }
}
