//! Semantic element location over an opaque observed page.
//!
//! The observed page is only reachable through the [`PagePort`] trait; every
//! lookup is keyed by a semantic [`ElementDescriptor`] rather than a page
//! selector, so the detection layer never depends on page structure. The
//! [`resolver`] module holds the ordered first-success-wins field resolution
//! used for video/ad identifier cascades.

mod errors;
mod locator;
pub mod resolver;
mod ports;
mod types;

pub use errors::LocatorError;
pub use locator::{soften, ElementLocator};
pub use ports::PagePort;
pub use resolver::{resolve_first, Resolver};
pub use types::{ElementDescriptor, ElementHandle, VideoState};
