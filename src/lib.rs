//! # Health Sync
//!
//! Stream an Apple Health `export.xml` and upload its measurements, sleep
//! nights, and workouts to Google Fit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ export.xml  │──▶│   Extract    │──▶│  Aggregate   │──▶│   Upload   │──▶ Google Fit
//! │ (streamed)  │   │ (quick-xml)  │   │ minute / day │   │ chunks /   │
//! └─────────────┘   └──────────────┘   │ / sessions   │   │ sessions   │
//!                                      └──────────────┘   └────────────┘
//! ```
//!
//! The metric catalog, point models, aggregation, and the remote API trait
//! live in the `health-sync-core` crate. This crate adds the I/O: the XML
//! scanner, credentials, the HTTP client, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! hsync metrics                          # list supported metrics
//! hsync sync weight --dry-run            # scan only
//! HSYNC_ACCESS_TOKEN=ya29... hsync sync all
//! hsync sources                          # list remote data sources
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`credentials`] | Access-token providers |
//! | [`extract`] | Streaming export scanner |
//! | [`resolver`] | Data-source get-or-create |
//! | [`upload`] | Chunked dataset upload |
//! | [`session_upload`] | Session + segment upload |
//! | [`google_fit`] | Google Fit REST client |
//! | [`ingest`] | Per-metric sync pipeline |
//! | [`progress`] | Progress reporting on stderr |
//! | [`sources`] | Catalog and remote source listings |

pub mod config;
pub mod credentials;
pub mod extract;
pub mod google_fit;
pub mod ingest;
pub mod progress;
pub mod resolver;
pub mod session_upload;
pub mod sources;
pub mod upload;
