//! State module for tracking crawl progress
//!
//! `CrawlState` is the lifecycle of one crawl request. Page requests and jobs
//! carry no enum: their nullable `status` column is the whole story (null
//! means not yet processed).

mod crawl_state;

pub use crawl_state::CrawlState;
