//! Decoders for the VIM scene-exchange format.
//!
//! A `.vim` file is a BFast container of containers. [`parse_vim`] is the
//! single entry point; the per-layer decoders are public for tools that only
//! need one layer. Everything returned borrows from the input bytes where the
//! layout allows, so the input must outlive the decoded model.

pub mod bfast;
pub mod entity;
pub mod error;
pub mod g3d;
pub mod view;
pub mod vim;

pub use bfast::{BFastBuilder, Container};
pub use entity::{Column, ColumnKind, EntityTable, EntityTables};
pub use error::{Result, VimError};
pub use g3d::{decode_g3d, G3d, G3dBuilder};
pub use vim::{parse_vim, parse_vim_with_range, VimBuilder, VimHeader, VimModel};
