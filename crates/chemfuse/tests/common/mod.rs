//! Shared test utilities for chemfuse integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated orchestrator runs against an on-disk database
//! - Builders for fixture bundles and configurations
//! - `GatedParser`, a parser that blocks until released, for cancellation tests

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{GatedParser, TestHarness};
