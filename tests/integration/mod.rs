//! Integration test suite for dc
//!
//! End-to-end tests against real projects in temporary directories. Library
//! tests swap the process runner for a recording one so no container engine
//! is needed; CLI tests only use verbs that never start containers.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: `dc` binary smoke tests
//! - **discovery**: tree discovery, ignore rules and template merging
//! - **lifecycle**: aggregate operations over subtrees
//! - **packaging**: application archives

mod common;

mod cli;
mod discovery;
mod lifecycle;
mod packaging;
