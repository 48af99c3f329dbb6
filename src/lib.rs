//! Batch tiling of whole-slide images.
//!
//! Inputs (single images or zip bundles of images) are resolved into
//! [`task::ImageTask`]s, each task runs the external tiling tool through a
//! configurable [`invoker::Transport`], and the produced tiles are collected
//! into one zip archive namespaced by image name.

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod invoker;
pub mod locator;
pub mod log;
pub mod resolver;
pub mod run;
pub mod task;
pub mod util;

pub use error::{Error, Result};
pub use run::{RunSummary, TilingRun};
