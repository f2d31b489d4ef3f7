//! Common test utilities for the managed store integration tests.
//!
//! This module provides counting wrappers around the in-memory collaborators
//! and small builders for test objects.

pub mod fixtures;
pub mod spies;

pub use fixtures::*;
pub use spies::*;
