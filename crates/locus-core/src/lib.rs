//! locus-core library.
//!
//! The outline tree sync core: a [`store::NodeStore`] of node records, a
//! derived [`index::ChildIndex`], and the [`reconcile::Reconciler`] that is
//! the single writer of both.
//!
//! # Conventions
//!
//! - **Errors**: Use `thiserror` enums for domain errors and `anyhow::Result`
//!   for file and config I/O.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod index;
pub mod model;
pub mod persist;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod tree;
pub mod verify;

pub use model::node::{Node, NodeId};
pub use reconcile::Reconciler;
pub use tree::Tree;
