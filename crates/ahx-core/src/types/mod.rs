//! Core data types shared by every crate in the workspace.

pub mod auction;
pub mod item;
pub mod price;
pub mod region;
pub mod wire;

pub use auction::*;
pub use item::*;
pub use price::*;
pub use region::*;
pub use wire::*;

/// Upstream item identifier.
pub type ItemId = i64;
