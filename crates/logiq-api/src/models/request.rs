use logiq_core::QueryFilters;
use serde::Deserialize;

/// Largest `limit` a query may ask for.
pub const MAX_QUERY_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct LogQueryRequest {
    pub query: String,
    #[serde(default)]
    pub filters: QueryFilters,
    pub limit: Option<i64>,
}

impl LogQueryRequest {
    /// The requested limit, or `default` when none was given. Must be 1..=50.
    pub fn resolved_limit(&self, default: usize) -> Result<usize, String> {
        let limit = self.limit.unwrap_or(default as i64);
        if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
            return Err(format!("limit must be between 1 and {MAX_QUERY_LIMIT}, got {limit}"));
        }
        Ok(limit as usize)
    }
}
