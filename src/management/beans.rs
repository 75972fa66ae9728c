//! Managed views of servers and sessions.
//!
//! Beans hold weak handles; once the object is gone attributes come back
//! empty and operations fail with [`ManagementError::Released`].

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::listener::{WeakServer, WeakSession};

use super::{Managed, ManagementError};

pub struct ServerBean {
    server: WeakServer,
}

impl ServerBean {
    pub fn new(server: WeakServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Managed for ServerBean {
    async fn attributes(&self) -> BTreeMap<String, String> {
        let Some(server) = self.server.upgrade() else {
            return BTreeMap::new();
        };

        let uptime = server
            .uptime()
            .map(|uptime| format!("{}s", uptime.as_secs()))
            .unwrap_or_else(|| "-".to_string());

        BTreeMap::from([
            ("name".to_string(), server.name().to_string()),
            ("status".to_string(), server.status().to_string()),
            ("activeSessions".to_string(), server.active_sessions().await.to_string()),
            ("createdSessions".to_string(), server.created_sessions().to_string()),
            ("destroyedSessions".to_string(), server.destroyed_sessions().to_string()),
            ("uptime".to_string(), uptime),
        ])
    }

    async fn invoke(&self, operation: &str) -> Result<(), ManagementError> {
        let server = self.server.upgrade().ok_or(ManagementError::Released)?;
        match operation {
            "start" => server
                .start()
                .await
                .map_err(|e| ManagementError::Failed(e.to_string())),
            "stop" => {
                server.stop().await;
                Ok(())
            }
            other => Err(ManagementError::UnknownOperation(other.to_string())),
        }
    }
}

pub struct SessionBean {
    session: WeakSession,
}

impl SessionBean {
    pub fn new(session: WeakSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Managed for SessionBean {
    async fn attributes(&self) -> BTreeMap<String, String> {
        let Some(session) = self.session.upgrade() else {
            return BTreeMap::new();
        };

        let peer = session
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();

        BTreeMap::from([
            ("id".to_string(), session.id().to_string()),
            ("status".to_string(), session.status_string()),
            ("bindType".to_string(), session.bind_type_string()),
            ("systemId".to_string(), session.system_id().unwrap_or_default()),
            ("created".to_string(), session.created_ago()),
            ("peer".to_string(), peer),
        ])
    }

    async fn invoke(&self, operation: &str) -> Result<(), ManagementError> {
        let session = self.session.upgrade().ok_or(ManagementError::Released)?;
        match operation {
            "close" => session
                .close()
                .await
                .map_err(|e| ManagementError::Failed(e.to_string())),
            other => Err(ManagementError::UnknownOperation(other.to_string())),
        }
    }
}
