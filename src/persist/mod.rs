pub mod types;
pub use types::*;
pub mod rows;
pub mod csv_sink;
pub mod memory;

use crate::engine::types::Venue;

/// Append-only destination for finalized rows.
///
/// Shared by every pipeline, so implementations must accept concurrent
/// calls and keep rows for the same `(category, venue, symbol)` target from
/// interleaving. `headers` is written once, when the target is first created.
pub trait Sink: Send + Sync {
    fn log(
        &self,
        category: Category,
        venue: Venue,
        symbol: &str,
        row: &[String],
        headers: &[String],
    ) -> SinkResult<()>;
}
