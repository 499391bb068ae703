//! Fetching and parsing of news listings.

pub mod adapter;
pub mod date;
pub mod engine;
pub mod fetcher;
pub mod sites;

pub use adapter::SiteAdapter;
pub use engine::CrawlEngine;
pub use fetcher::PageFetcher;
pub use sites::AdapterKind;
