//! Management exposition of servers and sessions.
//!
//! Objects expose read-only string attributes and named operations through
//! [`Managed`], and are published under a structured name in a
//! [`ManagementRegistry`]. Registration failures are reported to the caller,
//! which logs them; they never stop the server.

mod beans;

pub use beans::{ServerBean, SessionBean};

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// Management errors.
#[derive(Debug, Error)]
pub enum ManagementError {
    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("'{0}' is not registered")]
    NotRegistered(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("managed object no longer exists")]
    Released,

    #[error("operation failed: {0}")]
    Failed(String),
}

/// An object with management attributes and operations.
#[async_trait]
pub trait Managed: Send + Sync {
    async fn attributes(&self) -> BTreeMap<String, String>;

    async fn invoke(&self, operation: &str) -> Result<(), ManagementError>;
}

/// Where managed objects are published.
pub trait ManagementRegistry: Send + Sync {
    fn register(&self, name: &str, object: Arc<dyn Managed>) -> Result<(), ManagementError>;

    fn unregister(&self, name: &str) -> Result<(), ManagementError>;
}

/// Name of a server's management object.
pub fn server_object_name(server: &str) -> String {
    format!("smppserver:type=Server,name={}", server)
}

/// Name of a session's management object.
pub fn session_object_name(server: &str, session_id: u32) -> String {
    format!("smppserver:type=Sessions,server={},id=session-{}", server, session_id)
}

/// Registry that accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistry;

impl ManagementRegistry for NoopRegistry {
    fn register(&self, _name: &str, _object: Arc<dyn Managed>) -> Result<(), ManagementError> {
        Ok(())
    }

    fn unregister(&self, _name: &str) -> Result<(), ManagementError> {
        Ok(())
    }
}

/// Registry keeping objects in memory, for embedding and tests.
#[derive(Default)]
pub struct InMemoryRegistry {
    objects: RwLock<BTreeMap<String, Arc<dyn Managed>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Managed>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl ManagementRegistry for InMemoryRegistry {
    fn register(&self, name: &str, object: Arc<dyn Managed>) -> Result<(), ManagementError> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        if objects.contains_key(name) {
            return Err(ManagementError::AlreadyRegistered(name.to_string()));
        }
        objects.insert(name.to_string(), object);
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<(), ManagementError> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ManagementError::NotRegistered(name.to_string()))
    }
}
