//! factbook-sync - Periodic World Factbook synchronization
//!
//! This crate fetches the Factbook bulk dataset once per run and fans out one
//! workflow per country. Each workflow uploads the country's JSON blob,
//! replaces its record in a partitioned record store, and uploads its flag
//! and map images the first time they are seen.

pub mod app;
pub mod blob;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod sync;
