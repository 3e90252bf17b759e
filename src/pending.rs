use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::RngExt;

use crate::api::types::StatusParams;

/// A post submitted but not yet confirmed or rejected by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatus {
    pub params: StatusParams,
    pub created_at: DateTime<Utc>,
}

/// Pending posts keyed by their client-generated idempotency key.
#[derive(Debug, Default)]
pub struct PendingStatuses {
    records: HashMap<String, PendingStatus>,
}

impl PendingStatuses {
    pub fn insert(&mut self, idempotency_key: String, params: StatusParams) {
        self.records.insert(
            idempotency_key,
            PendingStatus {
                params,
                created_at: Utc::now(),
            },
        );
    }

    pub fn remove(&mut self, idempotency_key: &str) -> Option<PendingStatus> {
        self.records.remove(idempotency_key)
    }

    pub fn get(&self, idempotency_key: &str) -> Option<&PendingStatus> {
        self.records.get(idempotency_key)
    }

    /// Pending replies to `status_id`, oldest first.
    pub fn replies_to(&self, status_id: &str) -> Vec<(&str, &PendingStatus)> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .filter(|(_, p)| p.params.in_reply_to_id.as_deref() == Some(status_id))
            .map(|(k, p)| (k.as_str(), p))
            .collect();
        out.sort_by_key(|(_, p)| p.created_at);
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A fresh idempotency key: 16 random bytes, hex encoded.
pub fn new_idempotency_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
