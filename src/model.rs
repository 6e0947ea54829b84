//! Persistent domain records shared by the reconciler, the flows, and the stores.
//!
//! Rows are keyed by natural identities: listings by `(provider, external id)`, library
//! entries by `(user, provider, external id)`, price points by `(provider, external id,
//! region)`. Store backends upsert on those keys and never invent others.

pub mod account;
pub mod catalog;
pub mod library;
pub mod price;
pub mod wishlist;

pub use account::*;
pub use catalog::*;
pub use library::*;
pub use price::*;
pub use wishlist::*;
