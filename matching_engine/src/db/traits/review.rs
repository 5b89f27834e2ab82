use crate::db_types::MatchingKey;

use super::matching_database::MatchingEngineError;

/// Seam to the external review subsystem. The engine only ever needs to know which matchings a
/// guest has already reviewed, so the completed-and-unreviewed view can subtract them; review
/// storage and the at-most-one-review rule live entirely on the other side of this trait.
#[allow(async_fn_in_trait)]
pub trait ReviewLookup {
    async fn reviewed_keys(&self, guest_id: i64) -> Result<Vec<MatchingKey>, MatchingEngineError>;
}
