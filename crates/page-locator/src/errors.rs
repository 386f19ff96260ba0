//! Error types for page location

use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// The page is mid-navigation or the port backend is gone
    #[error("Page unavailable: {0}")]
    PageUnavailable(String),
}
