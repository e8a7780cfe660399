use crate::clock;
use crate::events::{EventKind, EventLog, redact};
use crate::token::error::{CredentialKind, GateError};
use crate::token::hash::{Salt, session_credential};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// State behind a session credential
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SessionRecord {
    pub identity: String,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Long-lived session credentials issued on login
#[derive(Clone, Debug)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl_secs: u64,
    salt: Salt,
    events: EventLog,
}

impl SessionStore {
    pub fn new(ttl_secs: u64, salt: Salt, events: EventLog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
            salt,
            events,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn issue(&self, identity: &str, origin: &str) -> (String, SessionRecord) {
        self.issue_at(identity, origin, clock::now())
    }

    /// Mint a credential for `identity`. A hash collision overwrites the old record.
    pub fn issue_at(
        &self,
        identity: &str,
        origin: &str,
        now: DateTime<Utc>,
    ) -> (String, SessionRecord) {
        let credential = session_credential(identity, origin, now, &self.salt);
        let record = SessionRecord {
            identity: identity.to_string(),
            origin: origin.to_string(),
            created_at: now,
            expires_at: clock::expiry_after(now, self.ttl_secs),
        };

        self.inner.write().insert(credential.clone(), record.clone());

        debug!(identity, origin, ttl_secs = self.ttl_secs, "Session issued");
        self.events.record(
            EventKind::SessionIssued,
            format!("{identity} from {origin} ({})", redact(&credential)),
        );

        (credential, record)
    }

    pub fn validate(&self, credential: &str) -> Result<SessionRecord, GateError> {
        self.validate_at(credential, clock::now())
    }

    /// Look the credential up, deleting it if it has expired
    pub fn validate_at(
        &self,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, GateError> {
        let record = self
            .inner
            .read()
            .get(credential)
            .cloned()
            .ok_or(GateError::CredentialNotFound(CredentialKind::Session))?;

        if !clock::is_expired(record.expires_at, now) {
            return Ok(record);
        }

        if self.remove_if_expired(credential, now) {
            debug!(identity = %record.identity, "Expired session removed on lookup");
            self.events.record(
                EventKind::SessionExpired,
                format!("{} ({})", record.identity, redact(credential)),
            );
        }

        Err(GateError::CredentialExpired {
            kind: CredentialKind::Session,
            ttl_secs: self.ttl_secs,
        })
    }

    /// Read-only lookup, never deletes
    pub fn peek(&self, credential: &str) -> Option<SessionRecord> {
        self.inner.read().get(credential).cloned()
    }

    /// Idempotent delete. Returns whether a record was present.
    pub fn revoke(&self, credential: &str) -> bool {
        let removed = self.inner.write().remove(credential);
        if let Some(record) = &removed {
            debug!(identity = %record.identity, "Session revoked");
            self.events.record(
                EventKind::SessionRevoked,
                format!("{} ({})", record.identity, redact(credential)),
            );
        }
        removed.is_some()
    }

    /// Remove every expired record, returning how many were removed
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.write();
        let before = sessions.len();
        sessions.retain(|_, record| !clock::is_expired(record.expires_at, now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_if_expired(&self, credential: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.inner.write();
        match sessions.get(credential) {
            Some(record) if clock::is_expired(record.expires_at, now) => {
                sessions.remove(credential);
                true
            }
            // already swept, or replaced by a fresh record
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    fn store() -> SessionStore {
        SessionStore::new(3600, Salt::from_secret("session-test"), EventLog::new(16))
    }

    #[test]
    fn test_issue_sets_exact_ttl() {
        let store = store();
        let now = clock::now();
        let (credential, record) = store.issue_at("alice", "127.0.0.1", now);

        assert_eq!(record.created_at, now);
        assert_eq!(record.expires_at, now + Duration::seconds(3600));
        assert_eq!(store.validate_at(&credential, now).unwrap(), record);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_issued_credentials_are_unique() {
        let store = store();
        let now = clock::now();
        let mut seen = HashSet::new();
        for i in 0..100 {
            let (credential, _) =
                store.issue_at("alice", "127.0.0.1", now + Duration::nanoseconds(i));
            assert!(seen.insert(credential));
        }
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_unknown_credential_not_found() {
        let store = store();
        assert_eq!(
            store.validate("nope"),
            Err(GateError::CredentialNotFound(CredentialKind::Session))
        );
    }

    #[test]
    fn test_expired_then_not_found() {
        let store = store();
        let now = clock::now();
        let (credential, record) = store.issue_at("alice", "127.0.0.1", now);

        let err = store.validate_at(&credential, record.expires_at).unwrap_err();
        assert!(err.is_expired());
        assert_eq!(err.to_string(), "session expired (3600s limit reached)");

        // lazily deleted by the failed validation
        assert!(store.peek(&credential).is_none());
        assert_eq!(
            store.validate_at(&credential, now),
            Err(GateError::CredentialNotFound(CredentialKind::Session))
        );
    }

    #[test]
    fn test_expired_until_swept() {
        let store = store();
        let now = clock::now();
        let (credential, _) = store.issue_at("alice", "127.0.0.1", now);
        let later = now + Duration::seconds(3601);

        // peeking does not delete
        assert!(store.peek(&credential).is_some());
        assert_eq!(store.sweep(later), 1);
        assert_eq!(
            store.validate_at(&credential, later),
            Err(GateError::CredentialNotFound(CredentialKind::Session))
        );
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let store = store();
        let (credential, _) = store.issue("bob", "10.0.0.2");

        assert!(store.revoke(&credential));
        assert!(!store.revoke(&credential));
        assert!(store.validate(&credential).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_only_removes_expired() {
        let store = store();
        let now = clock::now();
        store.issue_at("old", "1.1.1.1", now - Duration::seconds(7200));
        let (fresh, _) = store.issue_at("new", "1.1.1.1", now);

        assert_eq!(store.sweep(now), 1);
        assert_eq!(store.sweep(now), 0);
        assert!(store.validate_at(&fresh, now).is_ok());
    }

    #[test]
    fn test_lifecycle_events_recorded() {
        let events = EventLog::new(16);
        let store = SessionStore::new(1, Salt::random(), events.clone());
        let now = clock::now();
        let (credential, _) = store.issue_at("carol", "127.0.0.1", now);
        let _ = store.validate_at(&credential, now + Duration::seconds(2));

        let kinds = events
            .snapshot()
            .into_iter()
            .map(|e| e.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, [EventKind::SessionIssued, EventKind::SessionExpired]);
    }
}
