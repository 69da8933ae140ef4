//! # quarry-common
//!
//! Foundational types shared across the Quarry storage engine crates:
//!
//! - **Types**: core identifiers (`PageId`, `FrameId`, `Lsn`)
//! - **Constants**: page sizing, pool sizing, and queue limits
//!
//! ## Example
//!
//! ```rust
//! use quarry_common::types::{Lsn, PageId};
//!
//! let page = PageId::new(42);
//! assert!(page.is_valid());
//! assert!(!Lsn::INVALID.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::{FrameId, Lsn, PageId};
