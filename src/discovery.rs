//! Service discovery interface.
//!
//! The call engines never talk to a registry themselves; these types
//! exist so integrations can publish server addresses and watch them
//! change. [`MemoryRegistry`] is the in-process reference
//! implementation, useful for tests and single-process setups; real
//! deployments plug in their own backend behind the [`Registry`] trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, RpcError};

/// One reachable instance of a named service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Service name, matching request headers.
    pub name: String,
    /// Dialable address, `host:port`.
    pub address: String,
    /// Deployment group tag; empty when ungrouped.
    pub group: String,
}

/// What happened to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Instance appeared or was updated.
    Put,
    /// Instance went away.
    Delete,
}

/// A change notification from a [`Registry`] subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEvent {
    pub kind: EventKind,
    pub instance: ServiceInstance,
}

/// A service discovery backend.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Publish an instance.
    async fn register(&self, instance: ServiceInstance) -> Result<()>;

    /// Withdraw an instance.
    async fn unregister(&self, instance: ServiceInstance) -> Result<()>;

    /// Instances currently registered under `service_name`.
    async fn list(&self, service_name: &str) -> Result<Vec<ServiceInstance>>;

    /// Stream of changes for `service_name`. The channel closes when
    /// the registry does.
    async fn subscribe(&self, service_name: &str) -> mpsc::Receiver<RegistryEvent>;

    /// Shut the registry down; subscriptions end.
    async fn close(&self) -> Result<()>;
}

const SUBSCRIBE_BUFFER: usize = 16;

#[derive(Default)]
struct MemoryInner {
    instances: HashMap<String, Vec<ServiceInstance>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<RegistryEvent>>>,
    closed: bool,
}

/// In-process [`Registry`] keeping instances in a map.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<MemoryInner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the subscribers for one service, outside the lock.
    fn subscribers_of(&self, service_name: &str) -> Vec<mpsc::Sender<RegistryEvent>> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .subscribers
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    fn publish(&self, event: RegistryEvent) {
        for tx in self.subscribers_of(&event.instance.name) {
            // A dropped or saturated subscriber just misses the event.
            let _ = tx.try_send(event.clone());
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, instance: ServiceInstance) -> Result<()> {
        {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            if inner.closed {
                return Err(RpcError::RegistryClosed);
            }
            let entries = inner.instances.entry(instance.name.clone()).or_default();
            entries.retain(|existing| existing.address != instance.address);
            entries.push(instance.clone());
        }
        self.publish(RegistryEvent {
            kind: EventKind::Put,
            instance,
        });
        Ok(())
    }

    async fn unregister(&self, instance: ServiceInstance) -> Result<()> {
        let removed = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            if inner.closed {
                return Err(RpcError::RegistryClosed);
            }
            match inner.instances.get_mut(&instance.name) {
                Some(entries) => {
                    let before = entries.len();
                    entries.retain(|existing| existing.address != instance.address);
                    before != entries.len()
                }
                None => false,
            }
        };
        if removed {
            self.publish(RegistryEvent {
                kind: EventKind::Delete,
                instance,
            });
        }
        Ok(())
    }

    async fn list(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        if inner.closed {
            return Err(RpcError::RegistryClosed);
        }
        Ok(inner.instances.get(service_name).cloned().unwrap_or_default())
    }

    async fn subscribe(&self, service_name: &str) -> mpsc::Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBE_BUFFER);
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if !inner.closed {
            inner
                .subscribers
                .entry(service_name.to_string())
                .or_default()
                .push(tx);
        }
        // On a closed registry the sender drops here and the receiver
        // reports end-of-stream immediately.
        rx
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.closed = true;
        inner.instances.clear();
        inner.subscribers.clear();
        Ok(())
    }
}
