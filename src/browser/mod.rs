//! Rendering session: one browser page driven through a category crawl.
//!
//! The crawl controller only talks to the [`RenderSession`] trait, so tests
//! can substitute an in-memory page. [`ChromiumSession`] is the real
//! implementation, built on chromiumoxide (CDP) when the `browser` feature
//! is enabled.

mod capture;
mod chrome;
mod chromium;
pub mod scripts;
mod stealth;

pub use capture::{parse_body, CaptureBuffer, CaptureRules, CaptureSender, CapturedResponse};
pub use chrome::find_chrome;
pub use chromium::ChromiumSession;
pub use stealth::STEALTH_SCRIPTS;

use async_trait::async_trait;

use crate::error::Result;

/// A page whose content grows as it is scrolled.
#[async_trait]
pub trait LazyLoadPage: Send {
    /// Proxy for how much content is loaded (container count or page height).
    async fn measure(&mut self) -> Result<u64>;

    /// Trigger one lazy-load growth step.
    async fn grow(&mut self) -> Result<()>;
}

/// Lifecycle of a rendering session.
///
/// `open` must subscribe to network responses before returning so no
/// early API traffic is missed. `close` must be safe to call after a
/// partial `open` and more than once.
#[async_trait]
pub trait RenderSession: LazyLoadPage {
    async fn open(&mut self) -> Result<()>;

    /// Load `url` and wait for it to settle, bounded by the navigation timeout.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Serialized DOM of the current page.
    async fn content(&mut self) -> Result<String>;

    /// Take the responses captured since the last drain or clear.
    fn drain_captures(&mut self) -> Vec<CapturedResponse>;

    /// Discard captured responses; called at category boundaries.
    fn clear_captures(&mut self);

    async fn close(&mut self);
}
