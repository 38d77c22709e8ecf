#![allow(clippy::single_component_path_imports)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! `webpine-rs` is a pure-Rust WebP codec: VP8L lossless encode/decode,
//! the RIFF container, alpha planes, and animation compositing.
//!
pub use webpine_internal::*;
