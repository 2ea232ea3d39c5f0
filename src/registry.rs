//! Concurrency-safe service registry.
//!
//! The registry is the agent's single source of truth for which services
//! exist and what state they were last seen in. The underlying map never
//! leaves this module; callers only see cloned [`Service`] snapshots.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{info, info_span, Instrument};

use crate::models::service::{Service, ServiceStatus};
use crate::persistence::service_dir::ServiceDirs;
use crate::{AppError, Result};

/// Registry of subscribed services keyed by name.
#[derive(Debug)]
pub struct ServiceRegistry {
    dirs: ServiceDirs,
    services: RwLock<HashMap<String, Service>>,
}

impl ServiceRegistry {
    /// Create an empty registry persisting directories under `dirs`.
    #[must_use]
    pub fn new(dirs: ServiceDirs) -> Self {
        Self {
            dirs,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Directory layout backing this registry.
    #[must_use]
    pub fn dirs(&self) -> &ServiceDirs {
        &self.dirs
    }

    /// Register a new service in the `New` state.
    ///
    /// The service directory and port record are written before the entry
    /// becomes visible, so a registered service always has its directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateService` if `name` is already registered
    /// (the existing entry is untouched), `AppError::InvalidRequest` for an
    /// unusable name, or `AppError::Directory` if persisting fails.
    pub async fn subscribe(
        &self,
        name: &str,
        runtime_id: &str,
        image: &str,
        control_port: u16,
    ) -> Result<Service> {
        let span = info_span!("subscribe", name, control_port);
        async {
            let mut services = self.services.write().await;
            if services.contains_key(name) {
                return Err(AppError::DuplicateService(format!(
                    "service '{name}' already exists"
                )));
            }

            self.dirs.ensure(name).await?;
            self.dirs.write_port(name, control_port).await?;

            let service = Service::new(
                name.to_owned(),
                runtime_id.to_owned(),
                image.to_owned(),
                control_port,
            );
            services.insert(name.to_owned(), service.clone());
            info!(runtime_id, image, "service subscribed");
            Ok(service)
        }
        .instrument(span)
        .await
    }

    /// Remove a service entry. The on-disk directory is left in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered.
    pub async fn unsubscribe(&self, name: &str) -> Result<Service> {
        let removed = self.services.write().await.remove(name);
        match removed {
            Some(service) => {
                info!(name, "service unsubscribed");
                Ok(service)
            }
            None => Err(not_found(name)),
        }
    }

    /// Fetch a snapshot of one service.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered.
    pub async fn get(&self, name: &str) -> Result<Service> {
        self.services
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// Whether `name` is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.services.read().await.contains_key(name)
    }

    /// Snapshot of all services, sorted by name.
    pub async fn list(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self.services.read().await.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Number of registered services.
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// Overwrite the status of a service; all other fields stay as they are.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered.
    pub async fn update_status(&self, name: &str, status: ServiceStatus) -> Result<Service> {
        let mut services = self.services.write().await;
        let service = services.get_mut(name).ok_or_else(|| not_found(name))?;
        if service.status != status {
            info!(name, from = %service.status, to = %status, "service status changed");
            service.status = status;
        }
        Ok(service.clone())
    }
}

fn not_found(name: &str) -> AppError {
    AppError::NotFound(format!("no service named '{name}'"))
}
