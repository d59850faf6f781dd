//! Same-site web crawler feeding the content store.
//!
//! This crate provides:
//! - [`Frontier`]: BFS work queue with visited-set dedup and a depth bound
//! - [`RobotsTxt`]: robots exclusion rules and crawl-delay
//! - [`Crawler`]: concurrent, scope-aware fetch loop that saves raw bodies

pub mod engine;
pub mod frontier;
pub mod robots;

pub use engine::{CrawlResult, Crawler, SavedPage, page_key};
pub use frontier::{Frontier, normalize_url};
pub use robots::{RobotsTxt, fetch_robots_txt};
