//! The coordinator proper: transition application, counting rules,
//! query handling and memory reclamation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use adwatch_core_types::{now_ms, AdDescriptor, AdId, TabId, VideoId};
use adwatch_event_bus::WatchBus;
use watch_protocol::{CoordinatorNotice, Observation, ObserverMessage, UiRequest, UiResponse};

use crate::model::TabRecord;
use crate::store::{CounterEntry, RollingStore, StoreError, ADS_KEY, VIDEOS_KEY};
use crate::window;

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Hard cap on concurrently tracked page instances.
    pub max_tabs: usize,

    /// Records idle longer than this are reclaimed by the sweep.
    pub retention_ms: i64,

    /// Flicker guard: a repeated ad id within this span counts once.
    pub ad_dedup_window_ms: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_tabs: 64,
            retention_ms: 10 * 60 * 1_000,
            ad_dedup_window_ms: 5_000,
        }
    }
}

/// Tab-scoped coordinator. Sole writer of the rolling-window counters;
/// driven exclusively by incoming observer messages.
pub struct Coordinator {
    config: CoordinatorConfig,
    store: Arc<dyn RollingStore>,
    notices: Arc<dyn WatchBus<CoordinatorNotice>>,
    tabs: DashMap<TabId, TabRecord>,
    last_counted_video: DashMap<TabId, VideoId>,
    processing: DashMap<String, ()>,
    storage_exhausted: AtomicBool,
    transitions_applied: AtomicU64,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn RollingStore>,
        notices: Arc<dyn WatchBus<CoordinatorNotice>>,
    ) -> Self {
        Self {
            config,
            store,
            notices,
            tabs: DashMap::new(),
            last_counted_video: DashMap::new(),
            processing: DashMap::new(),
            storage_exhausted: AtomicBool::new(false),
            transitions_applied: AtomicU64::new(0),
        }
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Number of observations that actually changed a tab record.
    pub fn transitions_applied(&self) -> u64 {
        self.transitions_applied.load(Ordering::SeqCst)
    }

    /// Whether counting is currently blocked on store capacity.
    pub fn storage_exhausted(&self) -> bool {
        self.storage_exhausted.load(Ordering::SeqCst)
    }

    /// Entry point for one observer message; handled to completion before
    /// the caller feeds the next one.
    pub async fn handle_message(&self, tab: TabId, message: ObserverMessage) {
        match message {
            ObserverMessage::Observation(observation) => {
                self.handle_observation_at(&tab, &observation, now_ms()).await;
            }
            ObserverMessage::AdStarted { ad_id } => {
                // Advisory backup signal; the observation stream is the
                // counted truth.
                debug!(tab = %tab, ad = %ad_id, "advisory ad start");
            }
            ObserverMessage::AdEnded => {
                debug!(tab = %tab, "advisory ad end");
            }
            ObserverMessage::PageClosed => self.close_tab(&tab),
        }
    }

    /// Clock-explicit observation handler.
    pub async fn handle_observation_at(&self, tab: &TabId, observation: &Observation, now: i64) {
        let record = TabRecord::from_observation(observation, now);
        let previous = self
            .tabs
            .get(tab)
            .map(|existing| (existing.content_hash(), existing.ad_active, existing.current_ad_id.clone()));

        if let Some((hash, _, _)) = &previous {
            if *hash == record.content_hash() {
                // Not a transition; just keep the record fresh.
                if let Some(mut existing) = self.tabs.get_mut(tab) {
                    existing.last_update = now;
                }
                return;
            }
        }

        // A new impression: activity turned on, or the break rolled straight
        // into its next ad with no inactive gap in between.
        let new_impression = observation.ad_active
            && previous
                .as_ref()
                .map(|(_, was_active, last_ad)| {
                    !was_active || last_ad.as_ref() != observation.ad_id.as_ref()
                })
                .unwrap_or(true);
        self.tabs.insert(tab.clone(), record);
        self.transitions_applied.fetch_add(1, Ordering::SeqCst);

        if new_impression {
            if let Some(ad_id) = &observation.ad_id {
                self.count_ad(tab, ad_id, observation.ad_descriptor.as_ref(), now)
                    .await;
            }
        }

        if let Some(video_id) = &observation.video_id {
            let is_ad_id = observation
                .ad_id
                .as_ref()
                .map(|ad| ad.0 == video_id.0)
                .unwrap_or(false);
            let already_counted = self
                .last_counted_video
                .get(tab)
                .map(|last| *last == *video_id)
                .unwrap_or(false);
            if !is_ad_id && !already_counted {
                self.count_video(tab, video_id, now).await;
            }
        }
    }

    async fn count_ad(&self, tab: &TabId, ad_id: &AdId, descriptor: Option<&AdDescriptor>, now: i64) {
        if self.storage_exhausted() {
            warn!(ad = %ad_id, "ad not counted: storage exhausted");
            return;
        }
        let mut entries = match self.store.load(ADS_KEY).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "ad counter load failed");
                return;
            }
        };
        window::prune(&mut entries, now);
        if window::counted_within(&entries, &ad_id.0, self.config.ad_dedup_window_ms, now) {
            debug!(ad = %ad_id, "flicker guard suppressed a repeat count");
            return;
        }
        entries.push(match descriptor {
            Some(descriptor) => CounterEntry::with_descriptor(&ad_id.0, now, descriptor.clone()),
            None => CounterEntry::new(&ad_id.0, now),
        });
        match self.store.save(ADS_KEY, &entries).await {
            Ok(()) => {
                let count = window::raw_count(&entries, now);
                self.notices
                    .publish(tab.clone(), CoordinatorNotice::AdCountUpdated { count })
                    .await;
            }
            Err(StoreError::Exhausted) => {
                self.storage_exhausted.store(true, Ordering::SeqCst);
                warn!("ad counter write rejected: store exhausted, counting disabled");
            }
            Err(err) => warn!(error = %err, "ad counter write failed"),
        }
    }

    async fn count_video(&self, tab: &TabId, video_id: &VideoId, now: i64) {
        if self.storage_exhausted() {
            warn!(video = %video_id, "video not counted: storage exhausted");
            return;
        }
        // Two interleaved handlers may race on the same id; the first to
        // claim the guard wins.
        if self.processing.insert(video_id.0.clone(), ()).is_some() {
            debug!(video = %video_id, "count already in flight");
            return;
        }
        self.count_video_guarded(tab, video_id, now).await;
        self.processing.remove(&video_id.0);
    }

    async fn count_video_guarded(&self, tab: &TabId, video_id: &VideoId, now: i64) {
        let mut entries = match self.store.load(VIDEOS_KEY).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "video counter load failed");
                return;
            }
        };
        // The tab may have closed while the load was in flight.
        if !self.tabs.contains_key(tab) {
            debug!(tab = %tab, "tab closed mid-count, dropping it");
            return;
        }
        window::prune(&mut entries, now);
        if window::counted_within(&entries, &video_id.0, window::WINDOW_MS, now) {
            // Already represented in the window; remember it for this tab so
            // later observations of the same video stay cheap.
            self.last_counted_video.insert(tab.clone(), video_id.clone());
            return;
        }
        entries.push(CounterEntry::new(&video_id.0, now));
        match self.store.save(VIDEOS_KEY, &entries).await {
            Ok(()) => {
                self.last_counted_video.insert(tab.clone(), video_id.clone());
                let count = window::unique_count(&entries, now);
                self.notices
                    .publish(tab.clone(), CoordinatorNotice::VideoCountUpdated { count })
                    .await;
            }
            Err(StoreError::Exhausted) => {
                self.storage_exhausted.store(true, Ordering::SeqCst);
                warn!("video counter write rejected: store exhausted, counting disabled");
            }
            Err(err) => warn!(error = %err, "video counter write failed"),
        }
    }

    pub async fn handle_request(&self, tab: Option<&TabId>, request: UiRequest) -> UiResponse {
        self.handle_request_at(tab, request, now_ms()).await
    }

    /// Clock-explicit request handler.
    pub async fn handle_request_at(
        &self,
        tab: Option<&TabId>,
        request: UiRequest,
        now: i64,
    ) -> UiResponse {
        match request {
            UiRequest::GetState => {
                let record = tab
                    .and_then(|t| self.tabs.get(t).map(|r| r.value().clone()))
                    .or_else(|| {
                        // Requester has no instance of its own: answer for
                        // the most recently active one.
                        self.tabs
                            .iter()
                            .max_by_key(|entry| entry.value().last_update)
                            .map(|entry| entry.value().clone())
                    });
                UiResponse::State(record.map(|r| r.snapshot()).unwrap_or_default())
            }
            UiRequest::GetAds24h => UiResponse::Count {
                count: self.windowed_count(ADS_KEY, now, window::raw_count).await,
            },
            UiRequest::GetVideos24h => UiResponse::Count {
                count: self.windowed_count(VIDEOS_KEY, now, window::unique_count).await,
            },
            UiRequest::ResetCounters => {
                let ads = self.store.invalidate(ADS_KEY).await;
                let videos = self.store.invalidate(VIDEOS_KEY).await;
                self.last_counted_video.clear();
                self.processing.clear();
                let success = ads.is_ok() && videos.is_ok();
                if success {
                    // Reset frees capacity, so counting may resume.
                    self.storage_exhausted.store(false, Ordering::SeqCst);
                    info!("counters reset");
                } else {
                    warn!("counter reset failed to invalidate the store");
                }
                UiResponse::Reset { success }
            }
        }
    }

    /// Prune-before-read, persisting the pruned collection back.
    async fn windowed_count(
        &self,
        key: &str,
        now: i64,
        count: fn(&[CounterEntry], i64) -> usize,
    ) -> usize {
        let mut entries = match self.store.load(key).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(key, error = %err, "counter load failed");
                return 0;
            }
        };
        let before = entries.len();
        window::prune(&mut entries, now);
        if entries.len() != before {
            if let Err(err) = self.store.save(key, &entries).await {
                warn!(key, error = %err, "pruned counter write-back failed");
            }
        }
        count(&entries, now)
    }

    /// Explicit page-close notification.
    pub fn close_tab(&self, tab: &TabId) {
        if self.tabs.remove(tab).is_some() {
            debug!(tab = %tab, "tab record removed");
        }
        self.last_counted_video.remove(tab);
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(now_ms())
    }

    /// Periodic reclamation: drop stale records, then evict the
    /// least-recently-updated beyond the tab cap.
    pub fn sweep_at(&self, now: i64) -> usize {
        let stale: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|entry| now - entry.value().last_update > self.config.retention_ms)
            .map(|entry| entry.key().clone())
            .collect();
        for tab in &stale {
            self.close_tab(tab);
        }
        let mut evicted = stale.len();

        if self.tabs.len() > self.config.max_tabs {
            let mut by_age: Vec<(TabId, i64)> = self
                .tabs
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().last_update))
                .collect();
            by_age.sort_by_key(|(_, last_update)| *last_update);
            let excess = by_age.len() - self.config.max_tabs;
            for (tab, _) in by_age.into_iter().take(excess) {
                self.close_tab(&tab);
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(evicted, remaining = self.tabs.len(), "reclaimed tab records");
        }
        evicted
    }

    /// Host-reported memory pressure crossed the high-water mark: drop every
    /// in-memory tracking map. Durable counters are unaffected.
    pub fn emergency_clear(&self) {
        let dropped = self.tabs.len();
        self.tabs.clear();
        self.last_counted_video.clear();
        self.processing.clear();
        warn!(dropped, "emergency clear of all in-memory tracking state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use adwatch_event_bus::InMemoryBus;
    use watch_protocol::StateSnapshot;

    use crate::store::MemoryRollingStore;

    fn coordinator_with(
        config: CoordinatorConfig,
        store: MemoryRollingStore,
    ) -> (Coordinator, Arc<InMemoryBus<CoordinatorNotice>>) {
        let bus = InMemoryBus::new(16);
        let coordinator = Coordinator::new(config, Arc::new(store), bus.clone());
        (coordinator, bus)
    }

    fn coordinator() -> (Coordinator, Arc<InMemoryBus<CoordinatorNotice>>) {
        coordinator_with(CoordinatorConfig::default(), MemoryRollingStore::default())
    }

    fn observation(video: Option<&str>, ad: Option<&str>) -> Observation {
        Observation {
            video_id: video.map(VideoId::new),
            ad_id: ad.map(AdId::new),
            ad_active: ad.is_some(),
            ad_descriptor: None,
            debug_text: format!("vid={} ad={}", video.unwrap_or("-"), ad.unwrap_or("-")),
            debug_info: json!({}),
        }
    }

    async fn count_of(coordinator: &Coordinator, request: UiRequest, now: i64) -> usize {
        match coordinator.handle_request_at(None, request, now).await {
            UiResponse::Count { count } => count,
            other => panic!("expected a count, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn identical_observations_apply_once() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        let obs = observation(Some("vid-1"), None);

        for n in 0..4 {
            coordinator.handle_observation_at(&tab, &obs, 1_000 + n).await;
        }
        assert_eq!(coordinator.transitions_applied(), 1);

        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-2"), None), 2_000)
            .await;
        assert_eq!(coordinator.transitions_applied(), 2);
    }

    #[tokio::test]
    async fn ad_flip_counts_once_per_dedup_window() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        let base = 1_000_000;

        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), base)
            .await;
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), None), base + 1_000)
            .await;
        // Flicker: the same ad re-activates within 5 seconds.
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), base + 3_000)
            .await;
        assert_eq!(
            count_of(&coordinator, UiRequest::GetAds24h, base + 3_000).await,
            1
        );

        // Past the window the same id counts again.
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), None), base + 4_000)
            .await;
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), base + 9_000)
            .await;
        assert_eq!(
            count_of(&coordinator, UiRequest::GetAds24h, base + 9_000).await,
            2
        );
    }

    #[tokio::test]
    async fn repeated_ads_count_as_raw_impressions() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        let base = 1_000_000;

        for n in 0..3 {
            let at = base + n * 10_000;
            coordinator
                .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), at)
                .await;
            coordinator
                .handle_observation_at(&tab, &observation(Some("vid-1"), None), at + 5_000)
                .await;
        }
        assert_eq!(
            count_of(&coordinator, UiRequest::GetAds24h, base + 30_000).await,
            3
        );
    }

    #[tokio::test]
    async fn back_to_back_ads_each_count() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        let base = 1_000_000;

        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), base)
            .await;
        // The break rolls straight into the next ad; activity never drops.
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-b")), base + 2_000)
            .await;
        assert_eq!(
            count_of(&coordinator, UiRequest::GetAds24h, base + 2_000).await,
            2
        );

        // The same ad persisting across polls is still one impression.
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-2"), Some("ad-b")), base + 4_000)
            .await;
        assert_eq!(
            count_of(&coordinator, UiRequest::GetAds24h, base + 4_000).await,
            2
        );
    }

    #[tokio::test]
    async fn videos_count_unique_ids_across_tabs() {
        let (coordinator, _bus) = coordinator();
        let (tab_a, tab_b) = (TabId::new(), TabId::new());
        let base = 1_000_000;

        coordinator
            .handle_observation_at(&tab_a, &observation(Some("vid-1"), None), base)
            .await;
        coordinator
            .handle_observation_at(&tab_b, &observation(Some("vid-1"), None), base + 100)
            .await;
        coordinator
            .handle_observation_at(&tab_a, &observation(Some("vid-2"), None), base + 200)
            .await;

        assert_eq!(
            count_of(&coordinator, UiRequest::GetVideos24h, base + 300).await,
            2
        );
    }

    #[tokio::test]
    async fn an_ads_own_id_is_not_a_video() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();

        coordinator
            .handle_observation_at(&tab, &observation(Some("spot-1"), Some("spot-1")), 1_000)
            .await;
        assert_eq!(count_of(&coordinator, UiRequest::GetVideos24h, 2_000).await, 0);
        assert_eq!(count_of(&coordinator, UiRequest::GetAds24h, 2_000).await, 1);
    }

    #[tokio::test]
    async fn reset_round_trip_zeroes_both_counters() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        let base = 1_000_000;

        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), base)
            .await;
        assert!(count_of(&coordinator, UiRequest::GetAds24h, base).await > 0);

        let response = coordinator
            .handle_request_at(None, UiRequest::ResetCounters, base)
            .await;
        assert_eq!(response, UiResponse::Reset { success: true });
        assert_eq!(count_of(&coordinator, UiRequest::GetAds24h, base).await, 0);
        assert_eq!(count_of(&coordinator, UiRequest::GetVideos24h, base).await, 0);
    }

    #[tokio::test]
    async fn exhausted_store_blocks_counting_until_reset() {
        let (coordinator, _bus) =
            coordinator_with(CoordinatorConfig::default(), MemoryRollingStore::new(0));
        let tab = TabId::new();

        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), None), 1_000)
            .await;
        assert!(coordinator.storage_exhausted());

        // Record transitions still apply; only counting is blocked.
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-2"), Some("ad-a")), 2_000)
            .await;
        assert_eq!(count_of(&coordinator, UiRequest::GetAds24h, 2_000).await, 0);

        coordinator
            .handle_request_at(None, UiRequest::ResetCounters, 3_000)
            .await;
        assert!(!coordinator.storage_exhausted());
    }

    #[tokio::test]
    async fn get_state_falls_back_to_most_recent_tab() {
        let (coordinator, _bus) = coordinator();
        let (tab_a, tab_b) = (TabId::new(), TabId::new());

        coordinator
            .handle_observation_at(&tab_a, &observation(Some("vid-old"), None), 1_000)
            .await;
        coordinator
            .handle_observation_at(&tab_b, &observation(Some("vid-new"), None), 2_000)
            .await;

        let scoped = coordinator
            .handle_request_at(Some(&tab_a), UiRequest::GetState, 3_000)
            .await;
        match scoped {
            UiResponse::State(StateSnapshot {
                current_video_id, ..
            }) => assert_eq!(current_video_id, Some(VideoId::new("vid-old"))),
            other => panic!("unexpected response {other:?}"),
        }

        let fallback = coordinator
            .handle_request_at(None, UiRequest::GetState, 3_000)
            .await;
        match fallback {
            UiResponse::State(StateSnapshot {
                current_video_id, ..
            }) => assert_eq!(current_video_id, Some(VideoId::new("vid-new"))),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweep_reclaims_stale_and_excess_tabs() {
        let config = CoordinatorConfig {
            max_tabs: 2,
            retention_ms: 5_000,
            ..Default::default()
        };
        let (coordinator, _bus) = coordinator_with(config, MemoryRollingStore::default());

        for (n, at) in [1_000, 2_000, 3_000, 10_000].iter().enumerate() {
            let tab = TabId::new();
            coordinator
                .handle_observation_at(&tab, &observation(Some(&format!("vid-{n}")), None), *at)
                .await;
        }
        assert_eq!(coordinator.tab_count(), 4);

        // 12s: the three earliest are stale; the cap then holds trivially.
        let evicted = coordinator.sweep_at(12_000);
        assert_eq!(evicted, 3);
        assert_eq!(coordinator.tab_count(), 1);
    }

    #[tokio::test]
    async fn sweep_evicts_least_recently_updated_beyond_cap() {
        let config = CoordinatorConfig {
            max_tabs: 2,
            retention_ms: i64::MAX,
            ..Default::default()
        };
        let (coordinator, _bus) = coordinator_with(config, MemoryRollingStore::default());

        let tabs: Vec<TabId> = (0..4).map(|_| TabId::new()).collect();
        for (n, tab) in tabs.iter().enumerate() {
            coordinator
                .handle_observation_at(
                    tab,
                    &observation(Some(&format!("vid-{n}")), None),
                    1_000 + n as i64,
                )
                .await;
        }

        assert_eq!(coordinator.sweep_at(2_000), 2);
        assert_eq!(coordinator.tab_count(), 2);
        // The two most recently updated survive.
        let newest = coordinator
            .handle_request_at(Some(&tabs[3]), UiRequest::GetState, 2_000)
            .await;
        match newest {
            UiResponse::State(snapshot) => {
                assert_eq!(snapshot.current_video_id, Some(VideoId::new("vid-3")));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn page_close_removes_the_record() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        coordinator
            .handle_message(
                tab.clone(),
                ObserverMessage::Observation(observation(Some("vid-1"), None)),
            )
            .await;
        assert_eq!(coordinator.tab_count(), 1);

        coordinator
            .handle_message(tab.clone(), ObserverMessage::PageClosed)
            .await;
        assert_eq!(coordinator.tab_count(), 0);
    }

    #[tokio::test]
    async fn counter_notices_are_published() {
        let (coordinator, bus) = coordinator();
        let mut rx = bus.subscribe();
        let tab = TabId::new();

        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), 1_000_000)
            .await;

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(rx.recv().await.unwrap().message);
        }
        assert!(seen.contains(&CoordinatorNotice::AdCountUpdated { count: 1 }));
        assert!(seen.contains(&CoordinatorNotice::VideoCountUpdated { count: 1 }));
    }

    #[tokio::test]
    async fn emergency_clear_drops_tracking_but_not_counters() {
        let (coordinator, _bus) = coordinator();
        let tab = TabId::new();
        let base = 1_000_000;
        coordinator
            .handle_observation_at(&tab, &observation(Some("vid-1"), Some("ad-a")), base)
            .await;

        coordinator.emergency_clear();
        assert_eq!(coordinator.tab_count(), 0);
        assert_eq!(count_of(&coordinator, UiRequest::GetAds24h, base).await, 1);
        assert_eq!(count_of(&coordinator, UiRequest::GetVideos24h, base).await, 1);
    }
}
