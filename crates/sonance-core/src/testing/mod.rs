//! Testing utilities for sonance-core.
//!
//! This module provides mocks, fixtures, and test helpers for unit testing
//! without requiring real model files.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sonance_core::testing::{pocket_models, small_layout, MockModel};
//!
//! // A full Pocket stack whose decoder emits 240 samples
//! let models = pocket_models(&small_layout(), 240);
//!
//! // A single graph with a fixed output
//! let model = MockModel::with_output("decoder", "audio_frame", tensor);
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
