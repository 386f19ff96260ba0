//! Wiring: observer loop, coordinator loop, and the runtime that owns both.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ad_detector::{Debouncer, Detector, DetectorTuning};
use adwatch_core_types::TabId;
use adwatch_event_bus::{to_mpsc, InMemoryBus, Tabbed, WatchBus};
use page_locator::PagePort;
use tab_coordinator::{Coordinator, MemoryRollingStore};
use watch_protocol::{CoordinatorNotice, ObserverMessage};

use crate::config::AppConfig;

/// One page instance's observer loop: a recurring timer and any
/// page-lifecycle signals funnel through the same debounced entry point
/// into [`Detector::sample`].
pub struct Observer {
    tab: TabId,
    detector: Arc<Detector>,
    bus: Arc<InMemoryBus<ObserverMessage>>,
    debouncer: Debouncer,
    debounce: Duration,
}

impl Observer {
    pub fn new(
        tab: TabId,
        port: Arc<dyn PagePort>,
        tuning: DetectorTuning,
        bus: Arc<InMemoryBus<ObserverMessage>>,
        debounce_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            tab,
            detector: Arc::new(Detector::new(port, tuning)),
            bus,
            debouncer: Debouncer::new(),
            debounce: Duration::from_millis(debounce_ms),
        })
    }

    pub fn tab(&self) -> &TabId {
        &self.tab
    }

    /// Request a sampling pass. Rapid repeated triggers coalesce into one.
    pub fn trigger(self: &Arc<Self>, reason: &'static str) {
        debug!(reason, tab = %self.tab, "sampling triggered");
        let observer = Arc::clone(self);
        self.debouncer.trigger("sample", self.debounce, async move {
            observer.sample_once().await;
        });
    }

    /// One immediate detection pass, publishing whatever the gate admitted.
    pub async fn sample_once(&self) {
        let output = self.detector.sample().await;
        for message in output.messages {
            self.bus.publish(self.tab.clone(), message).await;
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.detector.poll_interval());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.trigger("poll"),
            }
        }
        // Page gone: cancel pending samples, drop transient state, tell the
        // coordinator.
        self.debouncer.cancel_all();
        self.detector.reset();
        self.bus
            .publish(self.tab.clone(), ObserverMessage::PageClosed)
            .await;
        debug!(tab = %self.tab, "observer stopped");
    }
}

/// The coordinator loop: messages applied one at a time in arrival order,
/// interleaved with the periodic reclamation sweep.
pub async fn run_coordinator(
    coordinator: Arc<Coordinator>,
    mut messages: mpsc::Receiver<Tabbed<ObserverMessage>>,
    sweep_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut sweep = tokio::time::interval(sweep_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sweep.tick() => {
                coordinator.sweep();
            }
            incoming = messages.recv() => match incoming {
                Some(item) => coordinator.handle_message(item.tab, item.message).await,
                None => break,
            },
        }
    }
    debug!("coordinator stopped");
}

/// The fully wired pipeline for one observed page.
pub struct WatchRuntime {
    pub coordinator: Arc<Coordinator>,
    pub observer: Arc<Observer>,
    pub notices: Arc<InMemoryBus<CoordinatorNotice>>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl WatchRuntime {
    pub fn start(port: Arc<dyn PagePort>, config: &AppConfig) -> Self {
        let bus: Arc<InMemoryBus<ObserverMessage>> = InMemoryBus::new(64);
        let notices: Arc<InMemoryBus<CoordinatorNotice>> = InMemoryBus::new(64);
        let store = Arc::new(MemoryRollingStore::new(config.store_capacity));
        let coordinator = Arc::new(Coordinator::new(
            config.coordinator_config(),
            store,
            notices.clone(),
        ));
        let messages = to_mpsc(bus.clone(), 64);
        let observer = Observer::new(
            TabId::new(),
            port,
            config.tuning.clone(),
            bus,
            config.debounce_ms,
        );

        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(run_coordinator(
                coordinator.clone(),
                messages,
                Duration::from_millis(config.sweep_interval_ms),
                shutdown.clone(),
            )),
            tokio::spawn(observer.clone().run(shutdown.clone())),
        ];
        info!(tab = %observer.tab(), "watch runtime started");

        Self {
            coordinator,
            observer,
            notices,
            shutdown,
            tasks,
        }
    }

    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("watch runtime stopped");
    }
}
