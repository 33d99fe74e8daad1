//! Score rendering through external tools.
//!
//! | Operation | Tool |
//! |---|---|
//! | **Score → PDF** | `mscore --export-to` |
//! | **PDF → slides** | `pdf2svg` |
//! | **PDF → piano pages** | `pdfinfo` + `pdftops -eps` |
//! | **Pre-flight** | `which` lookup of every tool above |
//!
//! The module is split into:
//! - **Backend**: the [`Converter`] trait and [`ConvertError`]
//! - **External**: [`ExternalConverter`] and the [`preflight`] check

pub mod backend;
pub mod external;

pub use backend::{ConvertError, Converter};
pub use external::{ExternalConverter, preflight};
