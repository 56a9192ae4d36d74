//! `kaji-ops`: operator tool for a Kaji store.
//!
//! # Usage
//!
//! ```text
//! kaji-ops close --scope day
//! kaji-ops close --scope month --team-id 0b6f...
//! kaji-ops bootstrap --email owner@example.com --team "Flat 4"
//! kaji-ops invite --team-id 0b6f... --email second@example.com
//! ```
//!
//! Reads the store location from `--config` (TOML) layered under `KAJI_*`
//! environment variables. Exits with status 1 when any team fails to close.

mod close;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use kaji_core::{closing::CloseScope, team::TeamId};
use kaji_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "kaji-ops", about = "Operator tool for the Kaji team task store")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Close every finished window still open, for one or all teams.
  Close {
    /// Window to close: day, week or month.
    #[arg(long)]
    scope:   CloseScope,
    /// Close only this team instead of every team with members.
    #[arg(long)]
    team_id: Option<TeamId>,
  },
  /// Create a user and a team they own, and print a session token.
  Bootstrap {
    #[arg(long)]
    email:              String,
    #[arg(long)]
    team:               String,
    /// Team-local offset from UTC in minutes (defaults to the configured one).
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,
  },
  /// Create a user, add them to a team, and print a session token.
  Invite {
    #[arg(long)]
    team_id: TeamId,
    #[arg(long)]
    email:   String,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

fn default_utc_offset_minutes() -> i32 { 540 }

#[derive(Deserialize, Debug)]
struct OpsConfig {
  store_path:                 PathBuf,
  /// Offset given to teams bootstrapped without an explicit one.
  #[serde(default = "default_utc_offset_minutes")]
  default_utc_offset_minutes: i32,
}

fn load_config(path: PathBuf) -> Result<OpsConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("KAJI"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise OpsConfig")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) => {
      let _ = e.print();
      return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }
  };

  match run(args).await {
    Ok(code) => code,
    Err(e) => {
      tracing::error!(error = %format!("{e:#}"), "kaji-ops failed");
      ExitCode::FAILURE
    }
  }
}

async fn run(args: Args) -> Result<ExitCode> {
  let cfg = load_config(args.config)?;
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match args.command {
    Command::Close { scope, team_id } => {
      let summary = close::run_close(&store, scope, team_id, Utc::now())
        .await
        .context("failed to list closable teams")?;
      Ok(if summary.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
    Command::Bootstrap { email, team, utc_offset_minutes } => {
      let offset = utc_offset_minutes.unwrap_or(cfg.default_utc_offset_minutes);
      let user = store.create_user(&email).await.context("creating user")?;
      let team_id = store.create_team(&team, user, offset).await.context("creating team")?;
      let token = store.create_session(user).await.context("creating session")?;
      tracing::info!(user_id = %user, team_id = %team_id, "bootstrapped team");
      println!("{token}");
      Ok(ExitCode::SUCCESS)
    }
    Command::Invite { team_id, email } => {
      let user = store.create_user(&email).await.context("creating user")?;
      store.add_member(team_id, user).await.context("adding member")?;
      let token = store.create_session(user).await.context("creating session")?;
      tracing::info!(user_id = %user, team_id = %team_id, "invited member");
      println!("{token}");
      Ok(ExitCode::SUCCESS)
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
