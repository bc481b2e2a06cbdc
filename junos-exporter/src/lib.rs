//! Prometheus exporter for Junos devices.
//!
//! Each request to the metrics endpoint names a configuration profile and a
//! target device. The exporter opens one NETCONF session over SSH to the
//! device, runs the profile's collectors on it concurrently and answers with
//! the resulting samples in Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ HTTP request │───>│  Scheduler  │───>│  Collectors  │───>│   NETCONF    │
//! │ config/target│    │ (one scrape)│    │ (concurrent) │    │ session (SSH)│
//! └──────────────┘    └─────────────┘    └──────────────┘    └──────────────┘
//!        ^                                      │
//!        │            ┌─────────────┐    ┌──────────────┐
//!        └────────────│ Exposition  │<───│    Mapper    │
//!                     │ (text 0.0.4)│    │ (XML→samples)│
//!                     └─────────────┘    └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! junos-exporter --config config.json5
//! curl 'http://localhost:9347/metrics?config=default&target=router1.example.net'
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod mapper;
pub mod netconf;
pub mod scheduler;

pub use config::{ExporterConfig, Overrides, TargetConfig};
pub use http::{AppState, HttpServer};
pub use netconf::{Connector, Session, SshConnector};
pub use scheduler::{Scheduler, Scrape};
