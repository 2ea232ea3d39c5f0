#![forbid(unsafe_code)]

//! `cm-controller-ctl`: operator CLI for a `cm-controller` agent.
//!
//! Sends one request to the agent's control API and prints the JSON reply.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(
    name = "cm-controller-ctl",
    about = "Operator CLI for the cm-controller agent",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the agent's control API.
    #[arg(long, default_value = "http://127.0.0.1:8787/cm_controller/v1")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe agent liveness.
    Up,

    /// List all services with resolved status.
    List,

    /// Show one service with resolved status.
    Get {
        /// Service name.
        name: String,
    },

    /// Dump the runtime inspection document of a service's container.
    Info {
        /// Service name.
        name: String,
    },

    /// Register an already running container.
    Subscribe {
        /// Container name.
        name: String,
        /// Runtime container id.
        #[arg(long)]
        id: String,
        /// Image reference.
        #[arg(long)]
        image: String,
        /// Host port of the daemon control API.
        #[arg(long)]
        daemon_port: u16,
    },

    /// Forget a service without touching its container.
    Unsubscribe {
        /// Service name.
        name: String,
    },

    /// Start a new service, or restart a stopped one.
    Start {
        /// Container name.
        name: String,
        /// Image reference.
        #[arg(long)]
        image: String,
        /// Application port mapping, `[ip:]host:container[/proto]`.
        #[arg(short = 'p', long = "publish")]
        app_ports: Vec<String>,
        /// Environment entry, `KEY=VALUE`.
        #[arg(short, long = "env")]
        envs: Vec<String>,
        /// Extra capability.
        #[arg(long = "cap-add")]
        caps: Vec<String>,
    },

    /// Stop a service's container.
    Stop {
        /// Service name.
        name: String,
    },

    /// Remove a service, its container and its directory.
    Remove {
        /// Service name.
        name: String,
    },

    /// Ask the daemon to run (or restore) the workload.
    Run {
        /// Service name.
        name: String,
        /// JSON file forwarded as the request body.
        #[arg(long)]
        body: Option<PathBuf>,
    },

    /// Ask the daemon to checkpoint the workload.
    Checkpoint {
        /// Service name.
        name: String,
        /// Keep the workload running after the checkpoint.
        #[arg(long)]
        leave_running: bool,
        /// Checkpoint image destination.
        #[arg(long)]
        image_url: Option<String>,
    },
}

type CtlResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(execute(&args)) {
        Ok((true, reply)) => println!("{reply}"),
        Ok((false, reply)) => {
            eprintln!("{reply}");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Request failed: {err}");
            eprintln!("Is cm-controller listening on '{}'?", args.url);
            std::process::exit(1);
        }
    }
}

/// Send the request for `args.command`; returns success flag and printable reply.
async fn execute(args: &Cli) -> CtlResult<(bool, String)> {
    let base = args.url.trim_end_matches('/');
    let (method, url, body) = match &args.command {
        Command::Up => (Method::GET, endpoint(base, "/up")?, None),
        Command::List => (Method::GET, endpoint(base, "/service")?, None),
        Command::Get { name } => (Method::GET, endpoint(base, &format!("/service/{name}"))?, None),
        Command::Info { name } => (
            Method::GET,
            endpoint(base, &format!("/service/container_info/{name}"))?,
            None,
        ),
        Command::Subscribe {
            name,
            id,
            image,
            daemon_port,
        } => {
            let mut url = endpoint(base, "/subscribe")?;
            url.query_pairs_mut()
                .append_pair("container_name", name)
                .append_pair("container_id", id)
                .append_pair("image", image)
                .append_pair("daemon_port", &daemon_port.to_string());
            (Method::POST, url, None)
        }
        Command::Unsubscribe { name } => (
            Method::POST,
            endpoint(base, &format!("/unsubscribe/{name}"))?,
            None,
        ),
        Command::Start {
            name,
            image,
            app_ports,
            envs,
            caps,
        } => (
            Method::POST,
            endpoint(base, "/start")?,
            Some(json!({
                "container_name": name,
                "image": image,
                "app_ports": app_ports,
                "envs": envs,
                "mounts": [],
                "caps": caps,
            })),
        ),
        Command::Stop { name } => (Method::POST, endpoint(base, &format!("/stop/{name}"))?, None),
        Command::Remove { name } => (
            Method::DELETE,
            endpoint(base, &format!("/remove/{name}"))?,
            None,
        ),
        Command::Run { name, body } => {
            let payload = match body {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => json!({}),
            };
            (Method::POST, endpoint(base, &format!("/run/{name}"))?, Some(payload))
        }
        Command::Checkpoint {
            name,
            leave_running,
            image_url,
        } => {
            let mut payload = json!({ "leave_running": leave_running });
            if let Some(image_url) = image_url {
                payload["image_url"] = Value::String(image_url.clone());
            }
            (
                Method::POST,
                endpoint(base, &format!("/checkpoint/{name}"))?,
                Some(payload),
            )
        }
    };

    let mut request = Client::new().request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let success = response.status().is_success();
    let text = response.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or(text);
    Ok((success, pretty))
}

fn endpoint(base: &str, path: &str) -> CtlResult<Url> {
    Ok(Url::parse(&format!("{base}{path}"))?)
}
