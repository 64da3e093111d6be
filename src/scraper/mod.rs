//! Portal scraping: the rate limiter, the page driver adapter, the portal
//! strategies, and the document downloader.

pub mod downloader;
pub mod page_driver;
pub mod portal;
pub mod rate_limiter;
