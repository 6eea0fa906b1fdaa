//! Test utilities for kvchurn.
//!
//! This crate provides utilities to facilitate testing kvchurn against a store over HTTP. See the
//! modules for all available utilities.

pub mod server;
pub mod tracing;
