//! Shared test utilities for docscrape integration tests.
//!
//! This module provides:
//! - HTML builders producing results pages the extractor understands
//! - Scripted fakes for the fetcher, status store and result sink
//! - `TestHarness` wiring them into an `Orchestrator` inside a temp directory

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
