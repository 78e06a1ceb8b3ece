//! # Health Sync Core
//!
//! Pure logic for Health Sync: the metric catalog, point and session
//! models, interval normalization, time bucketing, session assembly, and
//! the remote fitness API abstraction.
//!
//! This crate does no file or network I/O. The application crate streams
//! the export file into these accumulators and drives a [`remote::FitnessApi`]
//! implementation to upload the results.

pub mod aggregate;
pub mod catalog;
pub mod models;
pub mod normalize;
pub mod remote;
pub mod sessions;
