use serde::{Deserialize, Serialize};

use crate::db_types::Matching;

/// Emitted when a cast accepts an offer: the assigned cast on a solo offer, or any participant
/// on a group offer. The notification layer typically turns this into a toast for the guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingAcceptedEvent {
    pub matching: Matching,
    pub cast_id: i64,
}

impl MatchingAcceptedEvent {
    pub fn new(matching: Matching, cast_id: i64) -> Self {
        Self { matching, cast_id }
    }
}

/// Emitted when a session ends. `cast_id` is the cast that drove the completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingCompletedEvent {
    pub matching: Matching,
    pub cast_id: i64,
}

impl MatchingCompletedEvent {
    pub fn new(matching: Matching, cast_id: i64) -> Self {
        Self { matching, cast_id }
    }
}
