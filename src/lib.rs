//! # massmint-preview
//!
//! Bounded-concurrency render dispatch for generative mass-mint previews.
//!
//! Keeps an ordered registry of preview items keyed by hash, releases at
//! most a fixed number of renders at a time, routes render results back to
//! their items (regenerating on failure), and pins finished previews with
//! their metadata.

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;
pub mod telemetry;
