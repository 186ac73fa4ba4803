//! Harvest error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The browser could not be launched or connected to.
    #[error("Failed to start browser session: {0}")]
    SessionInit(String),
    #[error("Navigation timed out after {seconds}s for {url}")]
    NavigationTimeout { url: String, seconds: u64 },
    #[error("Navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },
    /// A candidate element was missing a required field.
    #[error("Candidate {index} has no usable {field}")]
    ExtractionField { index: usize, field: &'static str },
    #[error("No categories configured for store")]
    NoCategoriesConfigured,
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    /// The page or browser went away while a harvest was in flight.
    #[error("Browser session is closed")]
    SessionClosed,
    #[error("Browser error: {0}")]
    Browser(String),
}

impl HarvestError {
    /// Whether this error aborts the whole harvest rather than a single category.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::SessionInit(_)
                | HarvestError::NoCategoriesConfigured
                | HarvestError::InvalidSelector { .. }
                | HarvestError::SessionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
