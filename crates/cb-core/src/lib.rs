//! community-board/crates/cb-core/src/lib.rs
//!
//! The central forum logic and interface definitions for the community board.

pub mod error;
pub mod fallback;
pub mod forum;
pub mod memory;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use fallback::TieredStore;
pub use forum::{Forum, DEFAULT_MAX_POSTS};
pub use memory::MemoryStore;
pub use models::*;
pub use traits::*;
