//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Index reconcile: drops index fields whose keys expired via TTL

mod reconcile;

pub use reconcile::spawn_reconcile_task;
