//! Concrete capabilities.
//!
//! Each module wraps one third-party API behind the
//! [`Capability`](cellchat_agent::Capability) contract. All of them accept a
//! base URL override so tests can point them at a local fake.

pub mod arxiv;
pub mod asknews;
pub mod duckduckgo;
pub mod google;
pub mod openweather;
pub mod reddit;
pub mod searx;
pub mod wikipedia;

use std::sync::Arc;

use cellchat_agent::Capability;

pub use arxiv::ArxivSearch;
pub use asknews::AskNewsSearch;
pub use duckduckgo::DuckDuckGoSearch;
pub use google::{GoogleScholarSearch, GoogleSearch, GoogleTrendsSearch};
pub use openweather::OpenWeatherSearch;
pub use reddit::RedditSearch;
pub use searx::SearxSearch;
pub use wikipedia::WikipediaSearch;

/// Every built-in capability, in the order they are offered to the model.
pub fn default_catalog() -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(DuckDuckGoSearch::new()),
        Arc::new(ArxivSearch::new()),
        Arc::new(WikipediaSearch::new()),
        Arc::new(GoogleSearch::new()),
        Arc::new(GoogleScholarSearch::new()),
        Arc::new(GoogleTrendsSearch::new()),
        Arc::new(AskNewsSearch::new()),
        Arc::new(RedditSearch::new()),
        Arc::new(SearxSearch::new()),
        Arc::new(OpenWeatherSearch::new()),
    ]
}
