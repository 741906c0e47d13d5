use async_trait::async_trait;

use crate::entity::Record;
use crate::Result;

/// Produces the record for one app.
///
/// "No data for this app" is not an error: implementations return a minimal record
/// (see [`crate::entity::minimal_record`]) and keep `Err` for conditions that should
/// stop the whole run.
#[async_trait]
pub trait FetchRecord: Send + Sync {
    async fn fetch_record(&self, id: u64, name: &str) -> Result<Record>;
}

