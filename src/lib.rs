// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod resources;
pub mod runtime;
pub mod series;
pub mod service;
pub mod testkit;

pub use cache::{CacheLookup, MemoryMetadataCache, MetadataCache};
pub use client::{ResilientClient, ResilientClientConfig};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use resources::{FileMetadata, ReportMetadata, Resource};
pub use series::{decimate, SeriesDecimator, SeriesRequest};
pub use service::{FallbackResponse, FetchOutcome, RbmcService};
