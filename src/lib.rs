//! Structural, size-annotated diffing of .NET assembly images.
//!
//! `asmdiff` loads two PE/CLI images (optionally wrapped in the XALZ
//! compressed-assembly container), renders canonical string identities for
//! their types and members, and walks both type trees in lock-step to emit a
//! minimal change list annotated with byte deltas. Optional passes diff the
//! metadata stream and table sizes, manifest resource sizes, and individual
//! method body lengths.
//!
//! # Architecture
//!
//! - [`container`] — XALZ detection and LZ4 payload decompression, producing
//!   an [`AssemblyImage`]
//! - [`metadata`] — CLI metadata access: Cor20 header, metadata root, heaps,
//!   tables, signatures, method body sizes
//! - [`render`] — canonical type/member key rendering under a generic context
//! - [`diff`] — the structural differ, its options, and the run summary
//! - [`report`] — lazy context headers and line-oriented report output
//!
//! # Examples
//!
//! ```rust,no_run
//! use asmdiff::{diff, DiffOptions};
//! use std::path::Path;
//!
//! let opts = DiffOptions::default();
//! let result = diff::compare(Path::new("a.dll"), Path::new("b.dll"), &opts)?;
//! for line in result.report.lines() {
//!     println!("{line}");
//! }
//! # Ok::<(), asmdiff::Error>(())
//! ```

#[macro_use]
mod error;

pub mod container;
pub mod diff;
pub(crate) mod file;
pub mod metadata;
pub mod render;
pub mod report;

#[cfg(test)]
pub(crate) mod test;

pub use container::AssemblyImage;
pub use diff::{DiffOptions, DiffResult, DiffSummary};
pub use error::Error;
pub use report::{Category, DiffEntry, DiffSign, Report};

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
