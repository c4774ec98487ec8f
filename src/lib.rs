// Normalization and aggregation core for the energy billing dashboard.
//
// The pipeline turns heterogeneous electricity/gas invoice extracts into a
// single canonical in-memory table and derives every dashboard view from it:
//
//   raw bytes -> sniff -> {electricity|gas} normalizer -> CanonicalStore
//             -> filter & aggregation -> view rows
//
// The presentation layer (file pickers, charts, widgets) lives outside this
// crate and only ever sees `CanonicalStore` plus the view-row types in
// `reports` and `geo`.

pub mod electricity;
pub mod error;
pub mod gas;
pub mod geo;
pub mod loader;
pub mod output;
pub mod reference;
pub mod reports;
pub mod sniff;
pub mod types;
pub mod util;

pub use error::LoadError;
pub use loader::{CanonicalStore, LoadOutcome, Pipeline, Source, SourceKind, SourceLocation};
pub use reports::{FilterConfig, EnergyFilter, GroupBy, TimeAggregation};
pub use types::{CanonicalRecord, CostBreakdown, EnergyType, VoltageClass};
