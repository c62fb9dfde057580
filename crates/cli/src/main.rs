use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llmc_core::DaemonConfig;
use llmc_daemon::Daemon;
use llmc_store::{ControlSurface, Registry, StateStore};
use std::path::Path;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "llmc-rag-daemon")]
#[command(about = "Background RAG index refresher: ticks the repo registry and runs enrichment/embedding jobs")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the scheduler loop until shutdown is requested
  Run,
  /// Run a single scheduler tick and exit
  Tick,
  /// Print the effective configuration
  Config {
    /// Print as JSON instead of YAML
    #[arg(long)]
    json: bool,
  },
  /// Validate registry/state/control/index paths and permissions
  Doctor,
}

fn init_logging(config: &DaemonConfig) {
  let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt().with_env_filter(filter);
  match config.log_format {
    llmc_core::LogFormat::Json => builder.json().init(),
    llmc_core::LogFormat::Plain => builder.init(),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Run => cmd_run().await,
    Commands::Tick => cmd_tick().await,
    Commands::Config { json } => cmd_config(json),
    Commands::Doctor => cmd_doctor(),
  }
}

async fn cmd_run() -> Result<()> {
  let config = DaemonConfig::load();
  init_logging(&config);

  let daemon = Daemon::new(config);
  if let Err(err) = daemon.run().await {
    error!(error = %err, "daemon exited with an error");
    std::process::exit(1);
  }
  Ok(())
}

async fn cmd_tick() -> Result<()> {
  let config = DaemonConfig::load();
  init_logging(&config);

  let daemon = Daemon::new(config);
  let shutdown_observed = daemon.run_once().await;
  if shutdown_observed {
    info!("shutdown flag observed, no jobs run");
  }
  Ok(())
}

fn cmd_config(json: bool) -> Result<()> {
  let config = DaemonConfig::load();
  let rendered = if json {
    serde_json::to_string_pretty(&config).context("failed to serialize config as JSON")?
  } else {
    serde_yaml::to_string(&config).context("failed to serialize config as YAML")?
  };
  println!("{}", rendered);
  Ok(())
}

/// One pass/fail line per check, matching spec.md's "doctor reports config
/// and permission issues" requirement. Exits 1 if any check fails.
fn cmd_doctor() -> Result<()> {
  let config = DaemonConfig::load();
  let mut all_ok = true;

  let mut check = |label: &str, ok: bool, detail: &str| {
    let status = if ok { "ok" } else { "FAIL" };
    println!("[{status}] {label}: {detail}");
    if !ok {
      all_ok = false;
    }
  };

  check_dir_writable(&mut check, "registry path", config.registry_path.parent().unwrap_or(Path::new(".")));
  check_dir_writable(&mut check, "state store", &config.state_store_path);
  check_dir_writable(&mut check, "control dir", &config.control_dir);
  check_dir_writable(&mut check, "log path", &config.log_path);

  let registry = Registry::new(config.registry_path.clone());
  match registry.load() {
    Ok(repos) => {
      check("registry", true, &format!("{} repos loaded", repos.len()));

      let state_store = StateStore::new(config.state_store_path.clone());
      for (repo_id, repo) in &repos {
        match state_store.get(repo_id) {
          Ok(_) => {}
          Err(err) => check(
            "repo state",
            false,
            &format!("{repo_id}: failed to read state ({err})"),
          ),
        }
        let index_dir = repo.workspace_path.join("indexes");
        check_dir_writable(&mut check, &format!("index dir ({repo_id})"), &index_dir);
      }
    }
    Err(err) => check("registry", false, &format!("failed to load: {err}")),
  }

  let control = ControlSurface::new(config.control_dir.clone());
  match control.read() {
    Ok(_) => check("control surface", true, "readable"),
    Err(err) => check("control surface", false, &format!("failed to read: {err}")),
  }

  if !all_ok {
    std::process::exit(1);
  }
  Ok(())
}

fn check_dir_writable(check: &mut impl FnMut(&str, bool, &str), label: &str, dir: &Path) {
  match std::fs::create_dir_all(dir) {
    Ok(()) => check(label, true, &dir.display().to_string()),
    Err(err) => check(label, false, &format!("{}: {err}", dir.display())),
  }
}
