pub mod matching_objects;

mod matching_flow_api;
mod matching_query_api;

pub use matching_flow_api::MatchingFlowApi;
pub use matching_query_api::MatchingQueryApi;
