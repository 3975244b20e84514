pub mod backfill;
pub mod fetcher;
pub mod merge;
pub mod planner;
pub mod prober;
pub mod resume;
pub mod writer;

pub use backfill::{BackfillEngine, CycleReport, SymbolReport};
pub use fetcher::PagedFetcher;
pub use merge::{merge_pages, MergedSeries};
pub use planner::{plan, FetchPlan, PageRequest};
pub use prober::{probe, ProbeResult};
pub use writer::{BatchWriter, WriteReport};
