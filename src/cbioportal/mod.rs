//! cBioPortal lookups
//!
//! This module provides:
//! - A REST client with retries over the public cBioPortal API
//! - Per-study fetching of mutations, mRNA/protein expression, CNA and
//!   clinical data
//! - Pure feature extraction over the fetched records
//! - The aggregated per-gene report the tools hand back to the model
//!
//! # Architecture
//!
//! ```text
//! search(genes, cancer)
//!     → /studies?keyword=     (largest N studies)
//!     → /genes/fetch          (HUGO symbol → Entrez id)
//!     → fetch_study_data()    (all studies concurrently)
//!     → aggregate()           (feature extraction + report)
//! ```

use std::collections::HashMap;

pub mod client;
pub mod clinical;
pub mod copy_number;
pub mod expression;
pub mod models;
pub mod mutations;
pub mod search;
pub mod stats;
pub mod study;

/// Entrez gene id → upper-case HUGO symbol
pub type SymbolMap = HashMap<i64, String>;

pub use client::{CbioportalClient, CbioportalError, ProfileSelection};
pub use search::{aggregate, CbioportalReport, GeneReport, ReportMetadata};
pub use study::{fetch_study_data, StudyData};
