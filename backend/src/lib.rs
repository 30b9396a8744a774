//! # LGS Rust Backend
//!
//! Safety coordinator for laser guide star propagation.
//!
//! This crate decides, continuously during a night, whether the laser may
//! fire. It combines the propagation windows cleared by the space-traffic
//! authority, site-wide blanket closures, beam-collision reports from
//! neighbouring observatories and live telescope state read through the
//! telescope-control gateway. When any input is missing or stale the
//! verdict is to shutter.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`models`]: Intervals, windows, targets, observations, nights, collisions
//! - [`algorithms`]: Window algebra, target clustering, timing constraints
//! - [`parsing`]: Collision feed (text and HTML) and timing-window decoders
//! - [`db`]: Repository pattern and the in-memory store
//! - [`gateway`]: Telescope-control gateway trait and simulated gateway
//! - [`services`]: Producers, safety snapshot, decision loop, night supervisor
//! - [`config`]: TOML configuration with environment overrides
//! - [`http`]: Axum-based status surface

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod config;
pub mod db;
pub mod gateway;
pub mod models;
pub mod parsing;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;

pub use config::LgsConfig;
