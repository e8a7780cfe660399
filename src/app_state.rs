use crate::config::Config;
use crate::events::EventLog;
use crate::proxy::Upstream;
use crate::sweeper::Sweeper;
use crate::token::{DeliveryStore, NodePool, Salt, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-lifetime context shared by every handler and background task
#[derive(Clone, Debug)]
pub struct AppState {
    pub sessions: SessionStore,
    pub deliveries: DeliveryStore,
    pub nodes: NodePool,
    pub upstream: Upstream,
    pub events: EventLog,
    pub accounts: Arc<HashMap<String, String>>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    /// Build the stores and start the expiry sweeper. Must be called from
    /// within a tokio runtime.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let events = EventLog::new(config.event_log_capacity);

        let session_salt = config
            .session_secret
            .as_deref()
            .map(Salt::from_secret)
            .unwrap_or_else(Salt::random);
        let delivery_salt = config
            .delivery_secret
            .as_deref()
            .map(Salt::from_secret)
            .unwrap_or_else(Salt::random);

        let sessions = SessionStore::new(config.session_ttl_secs, session_salt, events.clone());
        let deliveries =
            DeliveryStore::new(config.delivery_ttl_secs, delivery_salt, events.clone());

        let nodes = NodePool::new(config.node_ids())
            .ok_or_else(|| anyhow::anyhow!("Upstream node pool is empty"))?;
        let upstream = Upstream::new(&config.upstream_origin)?;

        let this = Self {
            sessions,
            deliveries,
            nodes,
            upstream,
            events,
            accounts: Arc::new(config.accounts.clone()),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        };

        info!(
            session_ttl_secs = config.session_ttl_secs,
            delivery_ttl_secs = config.delivery_ttl_secs,
            nodes = ?this.nodes.nodes(),
            upstream = %this.upstream.origin(),
            "App state initialized"
        );

        Sweeper::new(
            this.sessions.clone(),
            this.deliveries.clone(),
            this.events.clone(),
        )
        .start(
            Duration::from_secs(config.sweep_interval_secs),
            this.shutdown.clone(),
        );

        Ok(this)
    }

    /// Check a username/password pair against the fixed account table
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.accounts
            .get(username)
            .is_some_and(|expected| expected == password)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
