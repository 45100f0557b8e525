//! # todo-analytics
//!
//! Analytics event pipeline for the hosted to-do app.
//!
//! Business operations hand an action name to the [`producer`], which pushes
//! an identify/group/track bundle onto the [`queue`]. The [`consumer`] routes
//! each delivery to a handler in [`dispatch`], which posts it to the
//! analytics API (or logs it in debug mode). The [`schedule`] job refreshes
//! group traits directly, skipping the queue.

pub mod config;
pub mod consumer;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod model;
pub mod producer;
pub mod queue;
pub mod schedule;
pub mod telemetry;
