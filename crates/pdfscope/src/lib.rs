//! Public facade crate for `pdfscope`.
//!
//! This crate intentionally contains no IO or PDF-parsing logic.
//! It re-exports the backend-agnostic types/traits from `pdfscope-core`.

pub use pdfscope_core::*;
