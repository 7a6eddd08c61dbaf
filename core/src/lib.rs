//! # RedLilium Engine Core
//!
//! Identifiers, math and pooling shared by every engine crate.

pub mod guid;
pub mod math;
pub mod pool;

pub use guid::Guid;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
