//! API request handlers

pub mod attributes;
pub mod certificate;

pub use attributes::{fetch_attributes, request_attributes};
pub use certificate::read_certificate;

use crate::issuance::IssuancePipeline;

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Verification, refresh and issuance for every request
    pub pipeline: IssuancePipeline,
}

impl AppState {
    pub fn new(pipeline: IssuancePipeline) -> Self {
        Self { pipeline }
    }
}
