//! Infrastructure layer: event store, command dispatch and the receiving pipeline.

pub mod catalog;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod locks;
pub mod posting;
pub mod receiving;
