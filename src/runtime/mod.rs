//! Runtime support for stores.
//!
//! This module provides store identity and the designated main context on
//! which all reducers, observers and subscription changes run.

mod context;

pub use context::{MainContext, StoreId};
