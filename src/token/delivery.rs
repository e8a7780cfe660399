use crate::clock;
use crate::events::{EventKind, EventLog, redact};
use crate::token::error::{CredentialKind, GateError};
use crate::token::hash::{Salt, delivery_credential};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What a delivery credential grants access to
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeliveryRecord {
    pub session: String,
    pub node_id: String,
    pub content_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A successfully validated delivery credential
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ValidDelivery {
    pub record: DeliveryRecord,
    pub seconds_remaining: u64,
}

/// Short-lived per-load delivery credentials minted by the gate.
///
/// The TTL is fixed and applies from issuance, regardless of how long the
/// bound session has left.
#[derive(Clone, Debug)]
pub struct DeliveryStore {
    inner: Arc<RwLock<HashMap<String, DeliveryRecord>>>,
    ttl_secs: u64,
    salt: Salt,
    events: EventLog,
}

impl DeliveryStore {
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

    pub fn issue(&self, session: &str, node_id: &str, content_id: &str) -> (String, DeliveryRecord) {
        self.issue_at(session, node_id, content_id, clock::now())
    }

    pub fn issue_at(
        &self,
        session: &str,
        node_id: &str,
        content_id: &str,
        now: DateTime<Utc>,
    ) -> (String, DeliveryRecord) {
        let credential = delivery_credential(session, node_id, content_id, now, &self.salt);
        let record = DeliveryRecord {
            session: session.to_string(),
            node_id: node_id.to_string(),
            content_id: content_id.to_string(),
            created_at: now,
            expires_at: clock::expiry_after(now, self.ttl_secs),
        };

        self.inner.write().insert(credential.clone(), record.clone());

        debug!(node_id, content_id, ttl_secs = self.ttl_secs, "Delivery token issued");
        self.events.record(
            EventKind::DeliveryIssued,
            format!("{content_id} via {node_id} ({})", redact(&credential)),
        );

        (credential, record)
    }

    pub fn validate(&self, credential: &str) -> Result<ValidDelivery, GateError> {
        self.validate_at(credential, clock::now())
    }

    /// Look the credential up, deleting it if it has expired
    pub fn validate_at(
        &self,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidDelivery, GateError> {
        let record = self
            .inner
            .read()
            .get(credential)
            .cloned()
            .ok_or(GateError::CredentialNotFound(CredentialKind::Delivery))?;

        if !clock::is_expired(record.expires_at, now) {
            let seconds_remaining = clock::seconds_remaining(record.expires_at, now);
            return Ok(ValidDelivery {
                record,
                seconds_remaining,
            });
        }

        if self.remove_if_expired(credential, now) {
            debug!(content_id = %record.content_id, "Expired delivery token removed on lookup");
            self.events.record(
                EventKind::DeliveryExpired,
                format!("{} ({})", record.content_id, redact(credential)),
            );
        }

        Err(GateError::CredentialExpired {
            kind: CredentialKind::Delivery,
            ttl_secs: self.ttl_secs,
        })
    }

    /// Remove every expired record, returning how many were removed
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.inner.write();
        let before = tokens.len();
        tokens.retain(|_, record| !clock::is_expired(record.expires_at, now));
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_if_expired(&self, credential: &str, now: DateTime<Utc>) -> bool {
        let mut tokens = self.inner.write();
        match tokens.get(credential) {
            Some(record) if clock::is_expired(record.expires_at, now) => {
                tokens.remove(credential);
                true
            }
            _ => false,
        }
    }
}
