//! # causerie-user
//!
//! User & Presence Manager: profile lifecycle, nickname reservation with a
//! uniqueness guarantee, live prefix search, online/offline presence with
//! graceful-disconnect semantics, push-token synchronization, and the
//! short-TTL profile cache.

pub mod cache;
pub mod directory;
pub mod presence;
pub mod push;

pub use cache::ProfileCache;
pub use directory::{CompleteProfile, UserDirectory};
