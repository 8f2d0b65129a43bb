//! Multinode Connection Manager — client side (spec §4.7, C15). Opens
//! sessions on every healthy endpoint under the unified policy (spec §9:
//! "implementations MUST NOT branch on XA for connection setup"), binds
//! each returned session to the endpoint that produced it, enforces
//! stickiness, and reacts to connection-class failures.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, instrument, warn};

use crate::backend::Properties;
use crate::client::endpoint::ServerEndpoint;
use crate::client::session_tracker::SessionTracker;
use crate::common::{ClientId, ConnectionFingerprint, RpcStatus, SessionId};
use crate::error::{OjpError, Result};
use crate::pool_registry::PoolRegistry;

#[derive(Debug, Clone)]
pub struct ConnectDetails {
    pub url: String,
    pub user: String,
    pub password: String,
    pub client_id: ClientId,
    pub is_xa: bool,
    pub properties: Properties,
}

/// The RPC transport external collaborator (spec §1(c)), narrowed to the
/// single call the connection manager needs per endpoint.
#[async_trait]
pub trait ServerRpc: Send + Sync {
    async fn connect(&self, endpoint: &Arc<ServerEndpoint>, details: &ConnectDetails) -> std::result::Result<SessionId, RpcStatus>;
    async fn terminate(&self, endpoint: &Arc<ServerEndpoint>, session_id: SessionId) -> std::result::Result<(), RpcStatus>;
    async fn ping(&self, endpoint: &Arc<ServerEndpoint>) -> std::result::Result<(), RpcStatus>;
}

pub struct ConnectionManager {
    endpoints: Vec<Arc<ServerEndpoint>>,
    rpc: Arc<dyn ServerRpc>,
    pub session_tracker: Arc<SessionTracker>,
    bindings: DashMap<SessionId, Arc<ServerEndpoint>>,
    fingerprint_endpoints: DashMap<ConnectionFingerprint, Vec<Arc<ServerEndpoint>>>,
    pool_registry: Arc<PoolRegistry>,
}

impl ConnectionManager {
    pub fn new(endpoints: Vec<Arc<ServerEndpoint>>, rpc: Arc<dyn ServerRpc>, pool_registry: Arc<PoolRegistry>) -> Self {
        Self {
            endpoints,
            rpc,
            session_tracker: Arc::new(SessionTracker::new()),
            bindings: DashMap::new(),
            fingerprint_endpoints: DashMap::new(),
            pool_registry,
        }
    }

    pub fn endpoints(&self) -> &[Arc<ServerEndpoint>] {
        &self.endpoints
    }

    /// `connect(details)`: fans out to every currently healthy endpoint
    /// regardless of `is_xa` (spec §9 unified policy), binding each
    /// returned session to its producing endpoint.
    #[instrument(skip(self, details))]
    pub async fn connect(&self, fingerprint: ConnectionFingerprint, details: &ConnectDetails) -> Vec<SessionId> {
        let mut opened = Vec::new();
        let mut accepted_endpoints = Vec::new();
        for endpoint in self.endpoints.iter().filter(|e| e.is_healthy()) {
            match self.rpc.connect(endpoint, details).await {
                Ok(session_id) => {
                    self.bindings.insert(session_id, endpoint.clone());
                    self.session_tracker.bind(endpoint);
                    accepted_endpoints.push(endpoint.clone());
                    opened.push(session_id);
                }
                Err(status) => {
                    warn!(?endpoint, ?status, "connect failed on endpoint");
                    if status.is_connection_class() {
                        self.mark_unhealthy(endpoint);
                    }
                }
            }
        }
        self.fingerprint_endpoints.insert(fingerprint, accepted_endpoints);
        info!(opened = opened.len(), "multinode connect fan-out complete");
        opened
    }

    /// Session-less operation routing: the healthy endpoint with fewest
    /// bound sessions, ties round-robin (spec §4.7).
    pub fn select_for_sessionless(&self) -> Option<Arc<ServerEndpoint>> {
        self.session_tracker.least_loaded(&self.endpoints).cloned()
    }

    /// Sticky routing for an operation carrying `session_id`. Unbinds and
    /// fails with `ConnectionClass` if the bound endpoint has gone
    /// unhealthy (spec §4.7 "never transparently fail over a session").
    pub fn route(&self, session_id: SessionId) -> Result<Arc<ServerEndpoint>> {
        let Some(entry) = self.bindings.get(&session_id) else {
            return Err(OjpError::UnknownId {
                kind: "session",
                id: session_id.to_string(),
            });
        };
        let endpoint = entry.value().clone();
        if !endpoint.is_healthy() {
            drop(entry);
            self.bindings.remove(&session_id);
            self.session_tracker.unbind(&endpoint);
            return Err(OjpError::ConnectionClass(format!("endpoint {endpoint:?} is unhealthy")));
        }
        Ok(endpoint)
    }

    pub async fn terminate(&self, session_id: SessionId) {
        if let Some((_, endpoint)) = self.bindings.remove(&session_id) {
            self.session_tracker.unbind(&endpoint);
            if let Err(status) = self.rpc.terminate(&endpoint, session_id).await {
                warn!(?status, %session_id, "terminate rpc failed");
            }
        }
    }

    /// Records the RPC-level outcome of an operation, flipping the
    /// endpoint's health on connection-class statuses only (spec §4.7
    /// "Failure detection"). Database-level errors never reach here.
    pub fn observe_status(&self, endpoint: &Arc<ServerEndpoint>, status: RpcStatus) {
        if status.is_connection_class() {
            self.mark_unhealthy(endpoint);
        }
    }

    /// On an unhealthy transition: drops every session binding to this
    /// endpoint (spec §4.7 "iterate all session-to-endpoint bindings, drop
    /// those bound to the failed endpoint"), then proactively invalidates
    /// pooled logical connections for every fingerprint that was fanned
    /// out to it — otherwise those pools keep handing out connections
    /// against a node already known to be down until they happen to be
    /// exercised and fail.
    fn mark_unhealthy(&self, endpoint: &Arc<ServerEndpoint>) {
        if !endpoint.is_healthy() {
            return;
        }
        endpoint.mark_unhealthy();
        let stale: Vec<SessionId> = self.bindings.iter().filter(|e| e.value().id == endpoint.id).map(|e| *e.key()).collect();
        for session_id in stale {
            self.bindings.remove(&session_id);
        }
        self.session_tracker.unbind(endpoint);
        self.invalidate_pooled_connections(endpoint);
        warn!(?endpoint, "endpoint marked unhealthy; session bindings dropped");
    }

    /// Invalidates idle pooled connections for every fingerprint whose
    /// fan-out included `endpoint`. A pool has no notion of which node a
    /// given idle connection is against, so a failed endpoint means the
    /// whole idle set for that fingerprint is suspect and gets dropped;
    /// borrowed connections are left alone and fail on next use instead.
    fn invalidate_pooled_connections(&self, endpoint: &Arc<ServerEndpoint>) {
        for entry in self.fingerprint_endpoints.iter() {
            if !entry.value().iter().any(|e| e.id == endpoint.id) {
                continue;
            }
            let fp = *entry.key();
            if let Some(xa) = self.pool_registry.xa_registry(fp) {
                let ids: Vec<u64> = xa.pool().idle_oldest_first().into_iter().map(|(id, _)| id).collect();
                if !ids.is_empty() {
                    xa.pool().force_invalidate_idle(&ids);
                }
            }
            if let Some(pool) = self.pool_registry.regular_pool(fp) {
                let idle = pool.idle_count();
                if idle > 0 {
                    pool.force_invalidate_idle(idle);
                }
            }
        }
    }

    pub fn mark_healthy(&self, endpoint: &Arc<ServerEndpoint>) {
        endpoint.mark_healthy();
    }

    pub fn fingerprint_endpoint_count(&self, fingerprint: ConnectionFingerprint) -> usize {
        self.fingerprint_endpoints.get(&fingerprint).map(|v| v.len()).unwrap_or(0)
    }
}
