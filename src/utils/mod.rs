//! Utility helpers: filesystem writes and content hashing.
pub mod files;

pub use files::{atomic_write, compute_sha256_hex, ensure_dir};
