//! CLI command handlers.
//!
//! | Module | Handles |
//! |--------|---------|
//! | [`synthesize`] | synthesis, `--list-voices`, `--list-backends` |
//! | [`utils`] | formatting and voice selection helpers |

pub mod synthesize;
pub mod utils;
