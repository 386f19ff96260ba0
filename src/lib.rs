//! AdWatch: real-time observation of ad/video playback on a third-party
//! media page.
//!
//! The workspace splits along the process boundary of the deployed system:
//! the observer side (`ad-detector` over `page-locator`) derives state from
//! noisy page polling, the coordinator side (`tab-coordinator`) owns per-tab
//! records and the rolling 24-hour counters, and `watch-protocol` defines
//! the messages between them. This crate wires the pieces into a runnable
//! pipeline and provides a scripted page simulator for demos and
//! integration tests.

pub mod config;
pub mod runtime;
pub mod sim;

pub use config::AppConfig;
pub use runtime::{run_coordinator, Observer, WatchRuntime};
pub use sim::{demo_script, SimScene, SimulatedPage};
