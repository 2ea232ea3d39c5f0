//! Container lifecycle management: start, stop, remove, recover.
//!
//! The controller owns the glue between the service registry, the port
//! allocator, the container runtime and the status channel. Every
//! operation that changes what the agent knows about a service goes
//! through here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{DaemonConfig, GlobalConfig};
use crate::models::request::{MountSpec, StartRequest};
use crate::models::service::{Service, ServiceStatus};
use crate::persistence::service_dir::validate_name;
use crate::ports::PortAllocator;
use crate::registry::ServiceRegistry;
use crate::runtime::{ContainerRuntime, ContainerState, PortMapping, RunSpec};
use crate::status_channel::StatusChannel;
use crate::{AppError, Result};

/// Drives containers through their lifecycle and keeps the registry in sync.
pub struct LifecycleController {
    registry: Arc<ServiceRegistry>,
    ports: Arc<PortAllocator>,
    runtime: Arc<dyn ContainerRuntime>,
    status_channel: StatusChannel,
    daemon: DaemonConfig,
    base_port: u16,
}

impl LifecycleController {
    /// Wire a controller from its collaborators and the global configuration.
    #[must_use]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        ports: Arc<PortAllocator>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &GlobalConfig,
    ) -> Self {
        Self {
            registry,
            ports,
            runtime,
            status_channel: StatusChannel::new(config.daemon.status_read_timeout()),
            daemon: config.daemon.clone(),
            base_port: config.ports.base,
        }
    }

    /// Create (or reuse) the controller directory and status FIFO for `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` for an unusable name or
    /// `AppError::Directory` if the directory cannot be prepared.
    pub async fn create_service_directory(&self, name: &str) -> Result<PathBuf> {
        self.registry.dirs().ensure(name).await
    }

    /// Register an externally started container and reserve its control port.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateService` if `name` is already registered
    /// or `control_port` is reserved by another service.
    pub async fn subscribe(
        &self,
        name: &str,
        runtime_id: &str,
        image: &str,
        control_port: u16,
    ) -> Result<Service> {
        if self.registry.contains(name).await {
            return Err(AppError::DuplicateService(format!(
                "service '{name}' already exists"
            )));
        }
        if !self.ports.reserve(control_port) {
            return Err(AppError::DuplicateService(format!(
                "control port {control_port} is already reserved"
            )));
        }
        match self
            .registry
            .subscribe(name, runtime_id, image, control_port)
            .await
        {
            Ok(service) => Ok(service),
            Err(err) => {
                self.ports.release(control_port);
                Err(err)
            }
        }
    }

    /// Drop a service from the registry and free its control port.
    ///
    /// The container and its directory are left alone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered.
    pub async fn unsubscribe(&self, name: &str) -> Result<Service> {
        let service = self.registry.unsubscribe(name).await?;
        self.ports.release(service.control_port);
        Ok(service)
    }

    /// Start a service.
    ///
    /// A registered service whose container has exited is started again;
    /// an unknown name gets a fresh container with a newly allocated
    /// control port.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` for a malformed request,
    /// `AppError::AlreadyRunning` if the existing container is not stopped,
    /// `AppError::DuplicateService` if an unmanaged container already uses
    /// the name,
    /// `AppError::PortExhausted` when no control port is free, and
    /// `AppError::Runtime` when the runtime refuses or the container does
    /// not come up.
    pub async fn start(&self, request: &StartRequest) -> Result<Service> {
        let name = request.container_name.as_str();
        let span = info_span!("start_service", name);
        async {
            validate_name(name)?;
            if request.image.trim().is_empty() {
                return Err(AppError::InvalidRequest("image must not be empty".into()));
            }
            let app_ports = request
                .app_ports
                .iter()
                .map(|raw| PortMapping::parse(raw))
                .collect::<Result<Vec<_>>>()?;

            if self.registry.contains(name).await {
                return self.restart_existing(name).await;
            }

            let dir = self.create_service_directory(name).await?;
            let port = self.ports.allocate(self.base_port)?;
            match self.launch(request, app_ports, port, dir).await {
                Ok(service) => Ok(service),
                Err(err) => {
                    self.ports.release(port);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn restart_existing(&self, name: &str) -> Result<Service> {
        let service = self.registry.get(name).await?;
        let state = self.runtime.state(service.container_ref()).await?;
        if state != ContainerState::Exited {
            return Err(AppError::AlreadyRunning(format!(
                "service '{name}' is {state}"
            )));
        }

        info!(name, "starting stopped container");
        self.runtime.start(service.container_ref()).await?;
        self.resolve_status(name).await
    }

    async fn launch(
        &self,
        request: &StartRequest,
        app_ports: Vec<PortMapping>,
        control_port: u16,
        dir: PathBuf,
    ) -> Result<Service> {
        let name = request.container_name.as_str();
        match self.runtime.state(name).await {
            Ok(state) => {
                return Err(AppError::DuplicateService(format!(
                    "container '{name}' already exists ({state})"
                )));
            }
            Err(AppError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let spec = self.run_spec(request, app_ports, control_port, dir);
        let runtime_id = match self.runtime.run(&spec).await {
            Ok(id) => id,
            Err(err) => {
                warn!(name, %err, "container run failed, removing any leftover");
                if let Err(rm_err) = self.runtime.remove(name).await {
                    warn!(name, %rm_err, "failed to remove container after failed run");
                }
                return Err(err);
            }
        };

        let reason = match self.runtime.state(name).await {
            Ok(state) if state.is_running() => None,
            Ok(state) => Some(format!("container is {state}")),
            Err(err) => Some(err.to_string()),
        };
        if let Some(reason) = reason {
            warn!(name, %reason, "container did not come up, removing it");
            if let Err(err) = self.runtime.remove(name).await {
                warn!(name, %err, "failed to remove container after failed start");
            }
            return Err(AppError::Runtime(format!(
                "container '{name}' did not reach running: {reason}"
            )));
        }

        if let Err(err) = self
            .registry
            .subscribe(name, &runtime_id, &request.image, control_port)
            .await
        {
            error!(
                name,
                runtime_id,
                control_port,
                %err,
                "container is running but was not registered"
            );
            return Err(err);
        }
        info!(name, runtime_id, control_port, "service started");
        self.resolve_status(name).await
    }

    fn run_spec(
        &self,
        request: &StartRequest,
        mut ports: Vec<PortMapping>,
        control_port: u16,
        dir: PathBuf,
    ) -> RunSpec {
        ports.push(PortMapping::tcp(control_port, self.daemon.internal_port));

        let mut capabilities = self.daemon.required_caps.clone();
        for cap in &request.caps {
            if !capabilities.contains(cap) {
                capabilities.push(cap.clone());
            }
        }

        let mut mounts = request.mounts.clone();
        mounts.push(MountSpec::bind(
            dir.to_string_lossy(),
            self.daemon.mount_target.as_str(),
        ));

        RunSpec {
            name: request.container_name.clone(),
            image: request.image.clone(),
            ports,
            capabilities,
            security_opts: self.daemon.security_opts.clone(),
            mounts,
            env: request.envs.clone(),
            command: self
                .daemon
                .command
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            controller_dir: dir,
        }
    }

    /// Stop the container behind `name` and refresh its recorded status.
    ///
    /// Unregistered names are passed to the runtime as container names.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the runtime knows no such container
    /// and `AppError::Runtime` if stopping fails.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let container = self.container_ref_for(name).await?;
        self.runtime.stop(&container).await?;
        info!(name, "container stopped");

        if self.registry.contains(name).await {
            if let Err(err) = self.resolve_status(name).await {
                warn!(name, %err, "status refresh after stop failed");
            }
        }
        Ok(())
    }

    /// Remove the container, its registry entry, port reservation and directory.
    ///
    /// A container the runtime no longer knows still has its bookkeeping
    /// cleaned up.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` if the runtime refuses the removal, in
    /// which case nothing else is touched.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let span = info_span!("remove_service", name);
        async {
            let container = self.container_ref_for(name).await?;
            if !self.runtime.remove(&container).await? {
                warn!("container already gone");
            }

            match self.unsubscribe(name).await {
                Ok(_) | Err(AppError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
            self.registry.dirs().remove(name).await?;
            info!("service removed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Raw runtime inspection document for `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if neither the registry nor the runtime
    /// knows the container.
    pub async fn container_info(&self, name: &str) -> Result<Value> {
        let container = self.container_ref_for(name).await?;
        self.runtime.inspect(&container).await
    }

    /// Refresh and return the status of a registered service.
    ///
    /// A running container is asked for its fine-grained state over the
    /// status channel; any other coarse state is recorded as-is. Runtime or
    /// channel failures leave the previous status in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered.
    pub async fn resolve_status(&self, name: &str) -> Result<Service> {
        let service = self.registry.get(name).await?;
        let coarse = match self.runtime.state(service.container_ref()).await {
            Ok(state) => state,
            Err(err) => {
                warn!(name, %err, "cannot query container state, keeping previous status");
                return Ok(service);
            }
        };

        let status = if coarse.is_running() {
            let pipe = self.registry.dirs().status_pipe(name)?;
            match self.read_channel(&pipe).await {
                Some(status) => status,
                None => return Ok(service),
            }
        } else {
            ServiceStatus::from(&coarse)
        };
        self.registry.update_status(name, status).await
    }

    async fn read_channel(&self, pipe: &Path) -> Option<ServiceStatus> {
        match self.status_channel.read_status(pipe).await {
            Ok(status) => Some(status),
            Err(err) => {
                error!(pipe = %pipe.display(), %err, "status channel read failed, keeping previous status");
                None
            }
        }
    }

    /// Refresh every registered service concurrently.
    ///
    /// Services removed while the refresh runs are left out.
    pub async fn resolve_all(&self) -> Vec<Service> {
        let names: Vec<String> = self
            .registry
            .list()
            .await
            .into_iter()
            .map(|service| service.name)
            .collect();

        join_all(names.iter().map(|name| self.resolve_status(name)))
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(service) => Some(service),
                Err(AppError::NotFound(_)) => None,
                Err(err) => {
                    warn!(%err, "status refresh failed");
                    None
                }
            })
            .collect()
    }

    /// Rebuild the registry from the service directories left by a previous run.
    ///
    /// Directories without a matching container or without a port record
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the services root cannot be listed
    /// and `AppError::Runtime` if the runtime cannot list containers.
    pub async fn recover_at_startup(&self) -> Result<Vec<Service>> {
        let names = self.registry.dirs().list_names().await?;
        if names.is_empty() {
            info!("no service directories to recover");
            return Ok(Vec::new());
        }

        let containers = self.runtime.list().await?;
        let mut recovered = Vec::with_capacity(names.len());
        for name in names {
            let Some(container) = containers.iter().find(|c| c.name == name) else {
                warn!(name, "no container for service directory, skipping");
                continue;
            };
            let port = match self.registry.dirs().read_port(&name).await {
                Ok(Some(port)) => port,
                Ok(None) => {
                    warn!(name, "service directory has no port record, skipping");
                    continue;
                }
                Err(err) => {
                    warn!(name, %err, "unreadable port record, skipping");
                    continue;
                }
            };

            if let Err(err) = self
                .subscribe(&name, &container.id, &container.image, port)
                .await
            {
                warn!(name, %err, "failed to re-register service");
                continue;
            }
            match self.resolve_status(&name).await {
                Ok(service) => recovered.push(service),
                Err(err) => warn!(name, %err, "status refresh after recovery failed"),
            }
        }

        info!(count = recovered.len(), "services recovered");
        Ok(recovered)
    }

    /// Container reference for `name`: the runtime id when registered,
    /// otherwise the name itself.
    async fn container_ref_for(&self, name: &str) -> Result<String> {
        match self.registry.get(name).await {
            Ok(service) => Ok(service.container_ref().to_owned()),
            Err(AppError::NotFound(_)) => {
                validate_name(name)?;
                Ok(name.to_owned())
            }
            Err(err) => Err(err),
        }
    }
}
