//! Optional external review of validated records.

pub mod reviewer;
pub mod verdict;

pub use reviewer::LlmReviewer;
pub use verdict::{apply_review, ReviewError, ReviewedRecord, Verdict};
