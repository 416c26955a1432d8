//! Pagination bounds for task listings

use serde::Deserialize;

use crate::persistence::Pagination;

/// Page size used when none (or a non-positive one) is requested
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page a caller can request
pub const MAX_LIMIT: u32 = 100;

/// Raw, caller-supplied pagination parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageRequest {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    /// Effective pagination after clamping
    pub fn clamp(&self) -> Pagination {
        let limit = match self.limit {
            Some(limit) if limit > 0 => limit.min(i64::from(MAX_LIMIT)) as u32,
            _ => DEFAULT_LIMIT,
        };
        let offset = self
            .offset
            .unwrap_or(0)
            .clamp(0, i64::from(u32::MAX)) as u32;
        Pagination { offset, limit }
    }
}
