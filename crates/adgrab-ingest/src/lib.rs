//! Ingest pipeline: media resolution, rate-limited concurrent downloads,
//! content-addressed dedup storage, and the coordinator that assembles
//! per-record results in fetch order.

mod coordinator;
mod dedup;
mod download;
mod error;
mod ledger;
mod ocr;
mod resolve;
mod resume;
mod sink;
mod store;
mod types;

pub use coordinator::{CoordinatorOptions, IngestCoordinator, RunSummary};
pub use dedup::DedupIndex;
pub use download::DownloadManager;
pub use error::IngestError;
pub use ledger::{Ledger, LedgerEntry, LedgerUnit, Severity};
pub use ocr::{NoopExtractor, OcrError, TextExtractor};
pub use resolve::{resolve, MediaFieldPolicy};
pub use resume::RunState;
pub use sink::{IngestSink, JsonlSink, VecSink};
pub use store::{fingerprint, AssetStore};
pub use types::{
    Asset, DownloadOutcome, IngestResult, MediaKind, MediaOutcome, MediaRef, RecordState,
};
