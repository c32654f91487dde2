//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros of [`lumen_core::profiling`]. Enable
//! the `profiling` feature to record spans:
//!
//! ```bash
//! cargo test --features profiling
//! ```
//!
//! Submission, uploads and ring writes are instrumented; the ring also plots
//! its write offset so wraparound is visible on the Tracy timeline.

pub use lumen_core::{frame_mark, profile_function, profile_plot, profile_scope};
