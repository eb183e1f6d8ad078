/// Version injected at compile time via TALOS_INFRA_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TALOS_INFRA_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use talos_infra::config::{self, ClusterConfig, DropletConfig, Overrides, Settings, StackFile};
use talos_infra::digitalocean::DigitalOceanClient;
use talos_infra::engine::{self, ApplyOptions, RunSummary};
use talos_infra::gcp::auth::GcpCredentials;
use talos_infra::gcp::client::{Endpoints, GcpClient};
use talos_infra::gcp::http::format_api_error;
use talos_infra::gcp::operations::PollPolicy;
use talos_infra::resource::args::Asset;
use talos_infra::resource::builder::{cluster_graph, droplet_graph};
use talos_infra::resource::dispatch::{
    DigitalOceanProvisioner, GcpProvisioner, PreviewProvisioner,
};
use talos_infra::resource::input::render_placeholders;
use talos_infra::resource::{ExportTable, Provisioner, ResourceGraph};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Provision a Talos control plane on GCP, or a single DigitalOcean droplet
#[derive(Parser, Debug)]
#[command(name = "talos-infra", version = VERSION, about, long_about = None)]
struct Args {
    /// Stack file (YAML); defaults to ./talos-infra.yaml
    #[arg(short, long, global = true)]
    stack: Option<PathBuf>,

    /// Log level; TALOS_INFRA_LOG takes precedence when set
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resources that would be created, in creation order
    Plan(RunArgs),
    /// Create the resources and print the exports
    Up {
        #[command(flatten)]
        run: RunArgs,

        /// Also write the exports to this file
        #[arg(long)]
        exports_file: Option<PathBuf>,
    },
    /// Print exports written by a previous `up`
    Exports {
        #[arg(long)]
        file: PathBuf,

        /// Print a single export value
        name: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long, value_enum, default_value = "cluster")]
    profile: Profile,

    #[arg(long, env = "GCP_PROJECT")]
    project: Option<String>,

    #[arg(long, env = "GCP_REGION")]
    region: Option<String>,

    #[arg(long, env = "GCP_ZONE")]
    zone: Option<String>,

    /// URL of the Talos release image
    #[arg(long, env = "TALOS_RELEASE")]
    release: Option<String>,

    /// Use this access token instead of Application Default Credentials
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Serve both GCP APIs from this base URL (for emulators)
    #[arg(long, env = "GCP_API_ENDPOINT")]
    api_endpoint: Option<String>,

    #[arg(long, env = "DIGITALOCEAN_TOKEN", hide_env_values = true)]
    digitalocean_token: Option<String>,

    /// SSH key id or fingerprint for the droplet (repeatable)
    #[arg(long = "ssh-key")]
    ssh_keys: Vec<String>,

    /// Create independent resources concurrently
    #[arg(long)]
    parallel: bool,

    /// Seconds to wait for a single resource to become ready
    #[arg(long, default_value_t = 600)]
    operation_timeout: u64,

    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            project: self.project.clone(),
            region: self.region.clone(),
            zone: self.zone.clone(),
            release: self.release.clone(),
            digitalocean_token: self.digitalocean_token.clone(),
            ssh_keys: self.ssh_keys.clone(),
        }
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_secs(self.operation_timeout),
            ..PollPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Profile {
    /// GCP image, instance group and TCP load balancer
    Cluster,
    /// A single DigitalOcean droplet
    Droplet,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("talos-infra").join("talos-infra.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".talos-infra").join("talos-infra.log");
    }
    PathBuf::from("talos-infra.log")
}

/// Log to stderr and append to the log file
fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    if matches!(level, LogLevel::Off) && std::env::var_os("TALOS_INFRA_LOG").is_none() {
        return Ok(None);
    }

    let filter = EnvFilter::try_from_env("TALOS_INFRA_LOG")
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.and(std::io::stderr))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("talos-infra {} logging to {:?}", VERSION, log_path);

    Ok(Some(guard))
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn load_stack(explicit: Option<&Path>) -> Result<StackFile> {
    match config::stack_path(explicit) {
        Some(path) => {
            tracing::info!("Using stack file {}", path.display());
            StackFile::load(&path)
        }
        None => {
            tracing::info!("No stack file found, using flags and environment only");
            Ok(StackFile::default())
        }
    }
}

/// Resolve configuration and build the profile's graph.
/// Configuration errors surface here, before anything is submitted.
fn build_graph(stack: &StackFile, run: &RunArgs, settings: &Settings) -> Result<ResourceGraph> {
    let overrides = run.overrides();
    let graph = match run.profile {
        Profile::Cluster => {
            let config = ClusterConfig::resolve(stack, &overrides)?;
            tracing::info!(release = %config.release.file, "Cluster profile");
            cluster_graph(settings, &config)?
        }
        Profile::Droplet => {
            let config = DropletConfig::resolve(stack, &overrides)?;
            droplet_graph(settings, &config)?
        }
    };
    graph.validate()?;
    Ok(graph)
}

async fn provisioner_for(stack: &StackFile, run: &RunArgs) -> Result<Box<dyn Provisioner>> {
    let overrides = run.overrides();
    match run.profile {
        Profile::Cluster => {
            let config = ClusterConfig::resolve(stack, &overrides)?;
            let project = config.project.expose();
            let zone = config.zone.expose();
            let endpoints = run
                .api_endpoint
                .as_deref()
                .map(Endpoints::single)
                .unwrap_or_default();

            let client = match &run.access_token {
                Some(token) => GcpClient::with_credentials(
                    GcpCredentials::from_token(token.clone()),
                    project,
                    zone,
                    endpoints,
                )?,
                None => GcpClient::new(project, zone, endpoints).await?,
            };
            Ok(Box::new(GcpProvisioner::new(client, run.poll_policy())))
        }
        Profile::Droplet => {
            let config = DropletConfig::resolve(stack, &overrides)?;
            let client = DigitalOceanClient::new(config.token)?;
            Ok(Box::new(DigitalOceanProvisioner::new(client, run.poll_policy())))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanView {
    levels: Vec<Vec<String>>,
    resources: Vec<serde_json::Value>,
    exports: ExportTable,
}

async fn plan(stack: &StackFile, run: &RunArgs) -> Result<()> {
    let settings = Settings::default();
    let graph = build_graph(stack, run, &settings)?;

    let levels = graph
        .levels()?
        .iter()
        .map(|level| level.iter().map(|d| d.name.clone()).collect())
        .collect();

    let resources = graph
        .descriptors
        .iter()
        .map(|d| -> Result<serde_json::Value> {
            let mut view = serde_json::to_value(d)?;
            let mut args = render_placeholders(&d.args);
            Asset::redact(&mut args);
            view["args"] = args;
            Ok(view)
        })
        .collect::<Result<Vec<_>>>()?;

    let preview = engine::apply(&graph, &PreviewProvisioner, ApplyOptions::default()).await?;

    print(
        &PlanView {
            levels,
            resources,
            exports: preview.exports,
        },
        run.format,
    )
}

async fn up(stack: &StackFile, run: &RunArgs, exports_file: Option<&Path>) -> Result<()> {
    let settings = Settings::default();
    let graph = build_graph(stack, run, &settings)?;
    let provisioner = provisioner_for(stack, run).await?;

    let summary: RunSummary = engine::apply(
        &graph,
        provisioner.as_ref(),
        ApplyOptions {
            parallel: run.parallel,
        },
    )
    .await?;

    if let Some(path) = exports_file {
        let content = serde_json::to_string_pretty(&summary.exports)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write exports to {}", path.display()))?;
        tracing::info!("Exports written to {}", path.display());
    }

    print(&summary.exports, run.format)
}

fn exports(file: &Path, name: Option<&str>) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read exports file {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse exports file {}", file.display()))?;
    let table = ExportTable::from_json(&value)
        .with_context(|| format!("{} is not an exports file", file.display()))?;

    match name {
        Some(name) => {
            let value = table
                .get(name)
                .with_context(|| format!("No export named {}", name))?;
            println!("{}", value);
        }
        None => print(&table, OutputFormat::Json)?,
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Plan(run) => {
            let stack = load_stack(args.stack.as_deref())?;
            plan(&stack, run).await
        }
        Command::Up { run, exports_file } => {
            let stack = load_stack(args.stack.as_deref())?;
            up(&stack, run, exports_file.as_deref()).await
        }
        Command::Exports { file, name } => exports(file, name.as_deref()),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    if let Err(err) = run(&args).await {
        tracing::error!("{:#}", err);
        if format!("{:#}", err).contains("API request failed") {
            eprintln!("Error: {err:#}\n{}", format_api_error(&err));
        } else {
            eprintln!("Error: {err:#}");
        }
        std::process::exit(1);
    }
}
