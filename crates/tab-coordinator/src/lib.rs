//! Tab-scoped coordination over the observation stream.
//!
//! The [`Coordinator`] owns one state record per observed page instance,
//! applies counting rules to activity flips, maintains the two rolling
//! 24-hour collections behind the [`RollingStore`] seam, and periodically
//! reclaims memory. It is the sole writer of the counters; observers only
//! emit events.

pub mod coordinator;
pub mod model;
pub mod store;
pub mod window;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use model::TabRecord;
pub use store::{CounterEntry, MemoryRollingStore, RollingStore, StoreError, ADS_KEY, VIDEOS_KEY};
