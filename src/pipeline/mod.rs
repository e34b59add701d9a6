//! Conversion pipeline: readiness cache, prefetch scheduling and the
//! session that owns them together with the queue.

pub mod cache;
pub mod prefetch;
pub mod session;
