//! The Page Driver: a minimal, uniform capability surface over a headless
//! browser. Portal strategies are written against this trait,
//! never against `chromiumoxide` directly, so that selector-probing logic
//! stays portable and testable.

mod chromium;

pub use chromium::ChromiumPageDriver;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Opaque handle to a DOM element located by the driver. Strategies never
/// construct one directly; only `find_first`/`find_all` return them.
#[derive(Debug, Clone)]
pub struct ElementHandle(pub(crate) String, pub(crate) usize);

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn open(&mut self, url: &str) -> Result<()>;
    async fn wait(&self, duration: Duration);

    /// Return a handle to the first *visible* element matching any selector
    /// in the prioritized list, or `None` if none match within `timeout`.
    /// Selector lists, not single IDs, are first-class here (design note on
    /// polymorphic selector probing) because portal markup varies by county.
    async fn find_first(&self, selectors: &[&str], timeout: Duration) -> Result<Option<ElementHandle>>;

    /// Return a handle to every element currently matching `selector`, in
    /// document order, waiting up to `timeout` for at least one match.
    /// Unlike `find_first` this is a single-selector probe: callers that
    /// need to compare several candidates (e.g. several document links
    /// with the same visible text) use this instead of looping `find_first`.
    async fn find_all(&self, selector: &str, timeout: Duration) -> Result<Vec<ElementHandle>>;

    async fn fill(&self, handle: &ElementHandle, text: &str) -> Result<()>;
    async fn press(&self, handle: &ElementHandle, key: &str) -> Result<()>;
    async fn click(&self, handle: &ElementHandle) -> Result<()>;

    async fn attr(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>>;
    async fn text(&self, handle: &ElementHandle) -> Result<String>;
    async fn inner_html(&self, handle: &ElementHandle) -> Result<String>;

    /// Current page title, used to build `search_input_missing` diagnostics.
    async fn page_title(&self) -> Result<String>;
    async fn current_url(&self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}
