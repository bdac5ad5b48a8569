//! fwstitch-lib: Core types and logic for fwstitch
//!
//! This crate stitches a child microcontroller's firmware into a host
//! firmware image:
//! - `convert`: hex image → raw binary through the converter tool
//! - `embed`: raw binary → C array source through the dump tool
//! - `bridge`: child binary → host build tree, by copy or link
//! - `rules`: suffix-driven rules that chain the two conversions
//! - `sequence`: host upload first, then the nested child upload
//! - `pipeline`: the exposed build and upload actions, in graph order

pub mod bridge;
pub mod config;
pub mod consts;
pub mod convert;
pub mod embed;
pub mod graph;
pub mod pipeline;
pub mod rules;
pub mod sequence;
pub mod target;
pub mod tool;
pub mod util;
