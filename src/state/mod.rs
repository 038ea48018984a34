//! State module for tracking crawl progress
//!
//! - `VisitState`: the claim lifecycle of a single URL
//! - `VisitedRecord`: what a visited set stores per URL

mod visit_state;

pub use visit_state::{VisitState, VisitedRecord};
