//! State module for tracking fetch progress
//!
//! # Components
//!
//! - `FetchState`: Tracks one URL through HTTP retries, the browser fallback,
//!   and its final outcome

mod fetch_state;

pub use fetch_state::FetchState;
