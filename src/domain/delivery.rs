//! Delivery log model

use super::ids::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest response body kept in the delivery log
pub const MAX_RESPONSE_BODY_LEN: usize = 2000;

/// Append-only record of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub job_id: JobId,
    pub response_code: u16,
    pub response_body: String,
    pub sent_at: DateTime<Utc>,
}

impl DeliveryLogEntry {
    /// Builds an entry, truncating oversized bodies on a char boundary
    pub fn new(
        job_id: JobId,
        response_code: u16,
        response_body: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let mut body: String = response_body.into();
        if body.len() > MAX_RESPONSE_BODY_LEN {
            let mut cut = MAX_RESPONSE_BODY_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Self {
            job_id,
            response_code,
            response_body: body,
            sent_at,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_code)
    }
}
