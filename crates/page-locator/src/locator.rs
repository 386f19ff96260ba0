//! The locate-by-descriptor utility wrapping a [`PagePort`].

use std::sync::Arc;

use tracing::debug;

use crate::errors::LocatorError;
use crate::ports::PagePort;
use crate::types::{ElementDescriptor, ElementHandle};

/// Resolves semantic descriptors against the live page.
///
/// Every failure mode collapses to "no match": page inspection is
/// best-effort and a single missing element must never abort the caller's
/// sampling pass.
pub struct ElementLocator {
    port: Arc<dyn PagePort>,
}

impl ElementLocator {
    pub fn new(port: Arc<dyn PagePort>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> Arc<dyn PagePort> {
        Arc::clone(&self.port)
    }

    /// Locate a descriptor, returning `None` on any failure.
    pub async fn locate(&self, descriptor: ElementDescriptor) -> Option<ElementHandle> {
        match self.port.query(descriptor).await {
            Ok(found) => found,
            Err(err) => {
                debug!(
                    descriptor = descriptor.name(),
                    error = %err,
                    "element lookup failed, treating as absent"
                );
                None
            }
        }
    }

    /// Locate a descriptor and keep it only if it is currently visible.
    pub async fn locate_visible(&self, descriptor: ElementDescriptor) -> Option<ElementHandle> {
        self.locate(descriptor).await.filter(|handle| handle.visible)
    }

    /// Visible text of a located element, if any.
    pub async fn text_of(&self, descriptor: ElementDescriptor) -> Option<String> {
        self.locate(descriptor)
            .await
            .and_then(|handle| handle.text)
            .filter(|text| !text.trim().is_empty())
    }
}

/// Convert a port read into "field absent" on failure, logging at debug.
pub fn soften<T>(label: &'static str, result: Result<Option<T>, LocatorError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            debug!(field = label, error = %err, "page read failed, treating as absent");
            None
        }
    }
}
