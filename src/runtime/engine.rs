//! Runtime adapter speaking the Docker Engine HTTP API.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::info;

use super::{ContainerRuntime, ContainerState, ContainerSummary, RunSpec, RuntimeFuture};
use crate::{AppError, Result};

/// Engine API-backed [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct EngineApi {
    base_url: String,
    client: Client,
}

impl EngineApi {
    /// Create an adapter for the Engine API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("cannot build engine client: {err}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and map transport and status failures.
    ///
    /// `304 Not Modified` counts as success: the engine uses it for start/stop
    /// calls on containers already in the requested state.
    async fn send(&self, request: reqwest::RequestBuilder, container: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|err| AppError::Runtime(format!("engine request failed: {err}")))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => format!("<unreadable body: {err}>"),
        };
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("no container '{container}': {body}")));
        }
        Err(AppError::Runtime(format!("engine returned {status}: {body}")))
    }
}

/// Engine API create body for a spec.
#[must_use]
pub fn create_body(spec: &RunSpec) -> Value {
    let mut exposed: HashMap<String, Value> = HashMap::new();
    let mut bindings: HashMap<String, Vec<Value>> = HashMap::new();
    for mapping in &spec.ports {
        let key = format!("{}/{}", mapping.container_port, mapping.protocol);
        exposed.insert(key.clone(), json!({}));
        bindings.entry(key).or_default().push(json!({
            "HostIp": mapping.host_ip.clone().unwrap_or_default(),
            "HostPort": mapping.host_port.to_string(),
        }));
    }

    let mounts: Vec<Value> = spec
        .mounts
        .iter()
        .map(|m| {
            json!({
                "Type": m.r#type,
                "Source": m.source,
                "Target": m.target,
                "ReadOnly": m.read_only,
            })
        })
        .collect();

    json!({
        "Image": spec.image,
        "Cmd": spec.command,
        "Env": spec.env,
        "ExposedPorts": exposed,
        "HostConfig": {
            "PortBindings": bindings,
            "CapAdd": spec.capabilities,
            "SecurityOpt": spec.security_opts,
            "Mounts": mounts,
            "Init": true,
        },
    })
}

fn state_of(doc: &Value) -> ContainerState {
    ContainerState::parse(
        doc.pointer("/State/Status")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    )
}

impl ContainerRuntime for EngineApi {
    fn run(&self, spec: &RunSpec) -> RuntimeFuture<'_, String> {
        let body = create_body(spec);
        let name = spec.name.clone();
        Box::pin(async move {
            info!(container = %name, "creating container via engine api");
            let created: Value = self
                .send(
                    self.client
                        .post(self.url(&format!("/containers/create?name={name}")))
                        .json(&body),
                    &name,
                )
                .await?
                .json()
                .await
                .map_err(|err| AppError::Runtime(format!("unexpected create reply: {err}")))?;
            let id = created
                .get("Id")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Runtime("create reply carries no Id".into()))?
                .to_owned();

            self.send(self.client.post(self.url(&format!("/containers/{id}/start"))), &name)
                .await?;
            Ok(id)
        })
    }

    fn start(&self, container: &str) -> RuntimeFuture<'_, ()> {
        let container = container.to_owned();
        Box::pin(async move {
            self.send(
                self.client.post(self.url(&format!("/containers/{container}/start"))),
                &container,
            )
            .await?;
            Ok(())
        })
    }

    fn stop(&self, container: &str) -> RuntimeFuture<'_, ()> {
        let container = container.to_owned();
        Box::pin(async move {
            self.send(
                self.client.post(self.url(&format!("/containers/{container}/stop"))),
                &container,
            )
            .await?;
            Ok(())
        })
    }

    fn remove(&self, container: &str) -> RuntimeFuture<'_, bool> {
        let container = container.to_owned();
        Box::pin(async move {
            match self
                .send(
                    self.client.delete(self.url(&format!("/containers/{container}"))),
                    &container,
                )
                .await
            {
                Ok(_) => Ok(true),
                Err(AppError::NotFound(_)) => Ok(false),
                Err(err) => Err(err),
            }
        })
    }

    fn inspect(&self, container: &str) -> RuntimeFuture<'_, Value> {
        let container = container.to_owned();
        Box::pin(async move {
            self.send(
                self.client.get(self.url(&format!("/containers/{container}/json"))),
                &container,
            )
            .await?
            .json()
            .await
            .map_err(|err| AppError::Runtime(format!("unexpected inspect reply: {err}")))
        })
    }

    fn state(&self, container: &str) -> RuntimeFuture<'_, ContainerState> {
        let container = container.to_owned();
        Box::pin(async move {
            let doc = self.inspect(&container).await?;
            Ok(state_of(&doc))
        })
    }

    fn list(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>> {
        Box::pin(async move {
            let entries: Vec<Value> = self
                .send(
                    self.client.get(self.url("/containers/json?all=true")),
                    "",
                )
                .await?
                .json()
                .await
                .map_err(|err| AppError::Runtime(format!("unexpected list reply: {err}")))?;

            Ok(entries
                .iter()
                .map(|entry| ContainerSummary {
                    id: entry
                        .get("Id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    name: entry
                        .pointer("/Names/0")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim_start_matches('/')
                        .to_owned(),
                    image: entry
                        .get("Image")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    state: entry
                        .get("State")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                })
                .collect())
        })
    }
}
