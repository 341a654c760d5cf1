//! Ingestion records
//!
//! - `types`: raw `FetchResult`/`Cookie` values and the warehouse-shaped
//!   `IngestionRecord`
//! - `mapper`: the pure `ResultMapper` between them

mod mapper;
mod types;

pub use mapper::{epoch_seconds_to_instant, MappingError, ResultMapper};
pub use types::{
    format_instant, Cookie, CookieRecord, FetchResult, IngestionRecord, PageDetails,
    SameSitePolicy, StorageEntry,
};
