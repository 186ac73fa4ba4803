//! Network capture of product API responses.
//!
//! Response bodies are pushed into a bounded channel by the session's
//! listener task and drained by the crawl controller once the scroll phase
//! of a category is finished. The buffer is emptied at category boundaries
//! so one category's traffic never leaks into the next.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::CaptureConfig;

/// A parsed response body captured during a category visit.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedResponse {
    pub url: String,
    pub status: i64,
    pub body: serde_json::Value,
}

/// URL/status classification for capturable responses.
#[derive(Debug, Clone)]
pub struct CaptureRules {
    api_markers: Vec<String>,
    resource_markers: Vec<String>,
}

impl CaptureRules {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            api_markers: config.api_markers.clone(),
            resource_markers: config.resource_markers.clone(),
        }
    }

    /// A response is captured when its URL carries an API marker and a
    /// resource marker and the status is 200.
    pub fn matches(&self, url: &str, status: i64) -> bool {
        if status != 200 {
            return false;
        }
        let has_marker = |markers: &[String]| {
            markers.is_empty() || markers.iter().any(|m| url.contains(m.as_str()))
        };
        has_marker(&self.api_markers) && has_marker(&self.resource_markers)
    }
}

impl Default for CaptureRules {
    fn default() -> Self {
        Self::new(&CaptureConfig::default())
    }
}

/// Parse a response body as structured data.
///
/// Bodies that don't look like JSON objects or arrays are skipped.
pub fn parse_body(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) if value.is_object() || value.is_array() => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping unparseable capture body: {}", e);
            None
        }
    }
}

/// Producer half handed to the response listener.
#[derive(Debug, Clone)]
pub struct CaptureSender {
    tx: mpsc::Sender<CapturedResponse>,
    dropped: Arc<AtomicUsize>,
}

impl CaptureSender {
    /// Queue a captured response. Returns false when the buffer is full or
    /// the consumer is gone; the response is dropped in that case.
    pub fn push(&self, response: CapturedResponse) -> bool {
        match self.tx.try_send(response) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(response)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Capture buffer full, dropping response from {}", response.url);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Per-session buffer of captured responses.
#[derive(Debug)]
pub struct CaptureBuffer {
    tx: mpsc::Sender<CapturedResponse>,
    rx: mpsc::Receiver<CapturedResponse>,
    dropped: Arc<AtomicUsize>,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sender(&self) -> CaptureSender {
        CaptureSender {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }

    /// Take everything queued so far, in arrival order.
    pub fn drain(&mut self) -> Vec<CapturedResponse> {
        let mut out = Vec::new();
        while let Ok(response) = self.rx.try_recv() {
            out.push(response);
        }
        out
    }

    /// Discard everything queued so far and reset the overflow counter.
    /// Returns how many responses were discarded.
    pub fn clear(&mut self) -> usize {
        self.dropped.store(0, Ordering::Relaxed);
        self.drain().len()
    }

    /// Responses dropped because the buffer was full since the last clear.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
