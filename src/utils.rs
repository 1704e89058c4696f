use serde::Deserialize;

const DEFAULT_PAGE_LIMIT: u64 = 25;
const MAX_PAGE_LIMIT: u64 = 100;
/// Postgres takes `OFFSET` as a signed bigint.
pub const MAX_PAGE_OFFSET: u64 = i64::MAX as u64;

/// `?limit=&offset=` for the post listing. Both are optional; a missing or
/// zero limit means the default page size.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    offset: Option<u64>,
}

impl PaginationParams {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    pub fn limit(&self) -> u64 {
        match self.limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(limit) => limit.min(MAX_PAGE_LIMIT),
        }
    }

    /// Never above [`MAX_PAGE_OFFSET`], so it always fits an `i64`.
    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0).min(MAX_PAGE_OFFSET)
    }
}
