//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PaginationState`: Tracks the pagination cursor of a single crawl target

mod pagination_state;

pub use pagination_state::PaginationState;
