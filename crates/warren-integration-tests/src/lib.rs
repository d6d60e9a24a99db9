//! Integration test support crate.
//!
//! The crate body is empty; the end-to-end scenarios live under
//! `tests/`.
