// ============================
// crates/backend-lib/src/audit.rs
// ============================
//! Append-only security log.
use crate::models::{AccountId, ClientMeta, SecurityEvent, SecurityLog};
use crate::storage::Storage;
use crate::time::TimeProvider;
use serde_json::Value;
use tracing::error;

/// Writes `SecurityLog` entries. A failed write is logged and swallowed so an
/// audit outage never blocks authentication.
#[derive(Clone)]
pub struct AuditTrail<S> {
    storage: S,
    clock: TimeProvider,
}

impl<S: Storage> AuditTrail<S> {
    pub fn new(storage: S, clock: TimeProvider) -> Self {
        Self { storage, clock }
    }

    pub async fn record(
        &self,
        event: SecurityEvent,
        account_id: Option<AccountId>,
        email: Option<&str>,
        meta: &ClientMeta,
        details: Value,
    ) {
        let details = match details {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };
        let entry = SecurityLog {
            event_type: event,
            account_id,
            email: email.map(str::to_string),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            timestamp: self.clock.now(),
            details,
        };
        if let Err(e) = self.storage.append_security_log(entry).await {
            error!(error = %e, event = %event, "failed to write security log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[tokio::test]
    async fn records_event_with_details() {
        let storage = MemoryStorage::new();
        let audit = AuditTrail::new(storage.clone(), TimeProvider::new());
        let meta = ClientMeta {
            ip_address: Some("10.0.0.1".into()),
            user_agent: None,
        };

        audit
            .record(
                SecurityEvent::LoginFailed,
                None,
                Some("ghost@example.com"),
                &meta,
                json!({"reason": "user_not_found"}),
            )
            .await;
        audit
            .record(SecurityEvent::Logout, Some(3), None, &meta, Value::Null)
            .await;

        let all = storage.security_logs(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, SecurityEvent::LoginFailed);
        assert_eq!(all[0].details["reason"], "user_not_found");
        assert_eq!(all[0].ip_address.as_deref(), Some("10.0.0.1"));

        let mine = storage.security_logs(Some(3)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].details.is_empty());
    }
}
