//! FactorLab Core: series cache, factor engine, pipelines, streaming simulation.
//!
//! This crate contains:
//! - Interval reconciliation over fetched coverage, and a cache that only
//!   asks its provider for the gaps
//! - Parquet and in-memory cache stores, CSV and synthetic providers
//! - Factors that compute in batch or one bar at a time with equal results
//! - Named factor pipelines producing nested result namespaces
//! - A train/test driver streaming rolling-history snapshots

pub mod data;
pub mod domain;
pub mod factors;
pub mod pipeline;
pub mod simulation;
