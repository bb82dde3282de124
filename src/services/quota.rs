use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("Storage quota exceeded: {requested} bytes requested, {remaining} bytes remaining")]
    Exceeded { requested: i64, remaining: i64 },

    #[error("Invalid size: {0}")]
    InvalidSize(i64),
}

/// Per-user storage accounting: bytes stored against a byte limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageQuota {
    pub total_bytes: i64,
    pub limit_bytes: i64,
}

impl StorageQuota {
    pub fn new(total_bytes: i64, limit_bytes: i64) -> Self {
        Self {
            total_bytes: total_bytes.max(0),
            limit_bytes: limit_bytes.max(0),
        }
    }

    /// Bytes still available; zero when the limit was lowered below usage
    pub fn remaining(&self) -> i64 {
        (self.limit_bytes - self.total_bytes).max(0)
    }

    pub fn can_store(&self, size: i64) -> bool {
        size >= 0 && size <= self.remaining()
    }

    pub fn with_upload(&self, size: i64) -> Result<Self, QuotaError> {
        if size < 0 {
            return Err(QuotaError::InvalidSize(size));
        }
        if !self.can_store(size) {
            return Err(QuotaError::Exceeded {
                requested: size,
                remaining: self.remaining(),
            });
        }
        Ok(Self::new(self.total_bytes + size, self.limit_bytes))
    }

    pub fn with_release(&self, size: i64) -> Self {
        Self::new(self.total_bytes.saturating_sub(size.max(0)), self.limit_bytes)
    }

    pub fn percent_used(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 100.0;
        }
        let pct = self.total_bytes as f64 / self.limit_bytes as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }
}
