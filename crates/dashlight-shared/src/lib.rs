//! Diagnostic engine for dashboard warning lights and common car faults.
//!
//! Everything here is synchronous and pure: a turn maps the caller's state
//! and answer to a payload and the next state. The completion service
//! lives in `dashlight_common`.

pub mod analyzer;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod gate;
pub mod graph;
pub mod knowledge;
pub mod options;
pub mod payload;
pub mod planner;
pub mod resolution;
pub mod safety;
pub mod scenario;
pub mod scoring;
pub mod state;
pub mod summary;
pub mod synthesis;
pub mod turn;
pub mod validate;
pub mod version;

pub use error::{DiagError, ExtractionError};
pub use knowledge::{Knowledge, KnowledgeBase, LightSeverity, Severity};
pub use payload::{DiagnosisReport, Envelope, Payload};
pub use state::{ActiveFlow, DiagnosticState, VehicleInfo};
pub use synthesis::DisplayTables;
pub use turn::{DeferReason, Deferral, Engine, TurnInput, TurnOutcome};
pub use version::{VersionInfo, BUILD_DATE, GIT_SHA, VERSION};
