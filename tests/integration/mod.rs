//! Integration test suite for slidetiler.
//!
//! These tests run complete tiling runs against a shell-script stand-in for
//! the tiling tool, driven through the local transport with `sh` as the
//! interpreter. They verify resolution, dispatch, and archive aggregation
//! together.
//!
//! # Test Categories
//!
//! - `batch_run`: single-image runs and failure handling
//! - `bundle_inputs`: zip bundle expansion and workspace cleanup
//! - `concurrency`: worker bounds and concurrent aggregation

mod fixtures;

mod bundle_inputs;
mod concurrency;
