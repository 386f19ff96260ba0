//! In-process message passing between the observer and the coordinator.
//!
//! Delivery is best-effort by design: the coordinating side may not be
//! listening yet (or may have shut down), and the protocol treats that as a
//! non-fatal condition surfaced at warn level, never as an error the
//! observer has to handle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use adwatch_core_types::TabId;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Message: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Message for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// A message scoped to one observed page instance.
#[derive(Clone, Debug)]
pub struct Tabbed<M>
where
    M: Message,
{
    pub tab: TabId,
    pub message: M,
}

#[async_trait]
pub trait WatchBus<M>: Send + Sync
where
    M: Message,
{
    /// Publish a message for the given tab. Absent receivers are tolerated.
    async fn publish(&self, tab: TabId, message: M);

    fn subscribe(&self) -> broadcast::Receiver<Tabbed<M>>;
}

/// Broadcast-backed bus connecting the observer loop to the coordinator.
pub struct InMemoryBus<M>
where
    M: Message,
{
    sender: broadcast::Sender<Tabbed<M>>,
}

impl<M> InMemoryBus<M>
where
    M: Message,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl<M> WatchBus<M> for InMemoryBus<M>
where
    M: Message,
{
    async fn publish(&self, tab: TabId, message: M) {
        if self
            .sender
            .send(Tabbed {
                tab: tab.clone(),
                message,
            })
            .is_err()
        {
            warn!(tab = %tab, "message dropped: no live receiver");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Tabbed<M>> {
        self.sender.subscribe()
    }
}

/// Materialise an mpsc receiver from the bus subscription so the coordinator
/// can process messages one at a time in arrival order.
pub fn to_mpsc<M>(bus: Arc<InMemoryBus<M>>, capacity: usize) -> mpsc::Receiver<Tabbed<M>>
where
    M: Message,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(item) = rx.recv().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_send_order_per_tab() {
        let bus: Arc<InMemoryBus<u32>> = InMemoryBus::new(8);
        let mut rx = bus.subscribe();
        let tab = TabId::new();

        for n in 0..3 {
            bus.publish(tab.clone(), n).await;
        }

        for expected in 0..3 {
            let item = rx.recv().await.unwrap();
            assert_eq!(item.tab, tab);
            assert_eq!(item.message, expected);
        }
    }

    #[tokio::test]
    async fn publish_without_receiver_is_silent() {
        let bus: Arc<InMemoryBus<&'static str>> = InMemoryBus::new(4);
        // No subscriber exists; this must not panic or error.
        bus.publish(TabId::new(), "observation").await;
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn mpsc_materialisation_forwards_messages() {
        let bus: Arc<InMemoryBus<u32>> = InMemoryBus::new(8);
        let mut rx = to_mpsc(bus.clone(), 8);
        // Give the forwarding task a chance to subscribe.
        tokio::task::yield_now().await;

        bus.publish(TabId::new(), 7).await;
        let item = rx.recv().await.unwrap();
        assert_eq!(item.message, 7);
    }
}
