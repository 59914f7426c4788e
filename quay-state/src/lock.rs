//! Lock records guarding the state against concurrent applies

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before an abandoned lock may be taken over
pub const LOCK_TIMEOUT_SECS: i64 = 15 * 60;

/// Who holds the state, for what, and until when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// "apply" or "destroy"
    pub operation: String,
    /// user@host
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_timeout(operation, LOCK_TIMEOUT_SECS)
    }

    pub fn with_timeout(operation: impl Into<String>, timeout_secs: i64) -> Self {
        let created = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: holder(),
            created,
            expires: created + Duration::seconds(timeout_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires < Utc::now()
    }
}

fn holder() -> String {
    let user = ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_else(|| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lock_lasts_fifteen_minutes() {
        let lock = LockInfo::new("apply");
        assert_eq!(lock.operation, "apply");
        assert!(!lock.id.is_empty());
        assert!(lock.who.contains('@'));
        assert_eq!((lock.expires - lock.created).num_seconds(), 900);
        assert!(!lock.is_expired());
    }

    #[test]
    fn lock_past_its_expiry_can_be_taken_over() {
        let lock = LockInfo::with_timeout("destroy", -1);
        assert!(lock.is_expired());
    }

    #[test]
    fn lock_records_survive_json() {
        let lock = LockInfo::new("apply");
        let json = serde_json::to_string(&lock).unwrap();
        let back: LockInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lock);
    }
}
