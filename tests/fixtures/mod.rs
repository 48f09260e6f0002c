//! Test fixtures for route-optimizer.
//!
//! Provides realistic test data including:
//! - Real Doha locations (from OpenStreetMap) for depots and collection points
//! - Builders for bin records and monitored routes

#![allow(dead_code)]

pub mod doha_locations;

pub use doha_locations::*;
