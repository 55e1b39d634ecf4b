//! Common orchestration data structures for the L2 bridge membership
//! manager.
//!
//! This crate provides the pieces shared by the membership tables and the
//! event-facing entry points of `bridgemgrd`:
//!
//! - [`SyncMap`]: type-safe map that prevents auto-vivification bugs
//! - [`TaskStatus`]: result classification for event handler dispatch
//!
//! # Architecture
//!
//! Membership state lives in explicit tables (bridge-by-name,
//! LAG-by-index) owned by a manager object. `SyncMap` keeps every table
//! mutation explicit: looking up a bridge that does not exist returns
//! `None` instead of silently creating an empty bridge, which is the
//! class of bug the original C++ `map[key]` access pattern was prone to.

mod sync_map;
mod task;

pub use sync_map::{SyncMap, SyncMapError};
pub use task::TaskStatus;
