// Operator output goes to the terminal.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::time::Duration;

use anyhow::{Context, Result};
use ayab_client_core::{
    ClientViewModel, DEFAULT_BRIDGE_URL, HttpBridgeApi, SyncCommand, SyncConfig, Synchronizer,
};
use ayab_proto::MachineParams;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::info;

pub const DEFAULT_ROW_WIDTH: u64 = 400;

#[derive(Parser, Debug)]
#[command(name = "ayab")]
#[command(about = "Control an AYAB knitting daemon through its HTTP bridge")]
pub struct AyabCli {
    /// Base URL of the bridge mount point.
    #[arg(long, env = "AYAB_BRIDGE_URL", default_value = DEFAULT_BRIDGE_URL, global = true)]
    pub bridge_url: String,
    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 3_000, global = true)]
    pub timeout_ms: u64,
    /// Width of the queue row in pattern columns; the rest filler takes what
    /// the entries leave free.
    #[arg(long, default_value_t = DEFAULT_ROW_WIDTH, global = true)]
    pub row_width: u64,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow queue, cursor and machine state until interrupted
    Watch(WatchArgs),
    /// Print queue, cursor and machine readiness once
    Status,
    /// Move the knitting cursor
    #[command(subcommand)]
    Cursor(CursorCommand),
    /// Edit the pattern queue
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Machine restart and knitting parameters
    #[command(subcommand)]
    Machine(MachineCommand),
    /// Restart or shut down the host running the daemon
    Platform(PlatformArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    pub interval_ms: u64,
}

#[derive(Subcommand, Debug)]
pub enum CursorCommand {
    /// Set the absolute cursor position
    Set {
        position: u64,
        /// Snap to the start of the entry containing the position.
        #[arg(long)]
        boundary: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Remove the entry at INDEX
    Remove {
        index: usize,
        /// Also delete the backing image file.
        #[arg(long)]
        delete: bool,
    },
    /// Queue an already-uploaded image
    Add { file_path: String, web_url: String },
}

#[derive(Subcommand, Debug)]
pub enum MachineCommand {
    /// Restart knitting on the machine
    Restart,
    /// Change pattern width, ribber mode and color count
    Params {
        #[arg(long)]
        width: u32,
        #[arg(long, default_value_t = 2)]
        colors: u8,
        #[arg(long)]
        ribber: bool,
    },
}

#[derive(Args, Debug)]
pub struct PlatformArgs {
    #[arg(value_enum)]
    pub action: PlatformVerb,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformVerb {
    Restart,
    Shutdown,
}

pub async fn run() -> Result<()> {
    run_cli(AyabCli::parse()).await
}

pub async fn run_cli(cli: AyabCli) -> Result<()> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let row_width = cli.row_width;
    let api = HttpBridgeApi::new(&cli.bridge_url, timeout).context("invalid --bridge-url")?;
    let config = SyncConfig {
        fetch_timeout: timeout,
        ..SyncConfig::default()
    };

    match cli.command {
        Commands::Watch(args) => {
            let config = SyncConfig {
                poll_interval: Duration::from_millis(args.interval_ms.max(100)),
                ..config
            };
            watch_session(Synchronizer::new(api, config), row_width).await
        }
        Commands::Status => {
            let mut sync = Synchronizer::new(api, config);
            sync.refresh_queue()
                .await
                .context("failed to read daemon state")?;
            print_view(sync.view(), row_width);
            Ok(())
        }
        Commands::Cursor(CursorCommand::Set { position, boundary }) => {
            let mut sync = Synchronizer::new(api, config);
            sync.propose_cursor(position);
            sync.commit_cursor(boundary)
                .await
                .context("daemon rejected cursor position")?;
            print_view(sync.view(), row_width);
            Ok(())
        }
        Commands::Queue(QueueCommand::Remove { index, delete }) => {
            let mut sync = Synchronizer::new(api, config);
            sync.remove_entry(index, delete)
                .await
                .with_context(|| format!("failed to remove queue entry {index}"))?;
            print_view(sync.view(), row_width);
            Ok(())
        }
        Commands::Queue(QueueCommand::Add { file_path, web_url }) => {
            let mut sync = Synchronizer::new(api, config);
            sync.add_file(file_path, web_url)
                .await
                .context("failed to queue image")?;
            print_view(sync.view(), row_width);
            Ok(())
        }
        Commands::Machine(MachineCommand::Restart) => {
            let mut sync = Synchronizer::new(api, config);
            sync.restart_machine()
                .await
                .context("failed to restart machine")?;
            print_view(sync.view(), row_width);
            Ok(())
        }
        Commands::Machine(MachineCommand::Params {
            width,
            colors,
            ribber,
        }) => {
            let params = MachineParams::new(width, ribber, colors)?;
            let mut sync = Synchronizer::new(api, config);
            sync.apply_params(params)
                .await
                .context("failed to apply machine parameters")?;
            print_view(sync.view(), row_width);
            Ok(())
        }
        Commands::Platform(args) => {
            let mut sync = Synchronizer::new(api, config);
            sync.restart_platform(args.action == PlatformVerb::Shutdown)
                .await
                .context("platform request failed")?;
            println!("{}", json!({ "sent": format!("{:?}", args.action).to_lowercase() }));
            Ok(())
        }
    }
}

async fn watch_session(sync: Synchronizer<HttpBridgeApi>, row_width: u64) -> Result<()> {
    // The sender stays alive for the whole watch so the session never ends on
    // its own; Ctrl-C drops it.
    let (commands, receiver) = mpsc::channel::<SyncCommand>(4);
    let (updates, mut view) = watch::channel(ClientViewModel::default());
    let session = tokio::spawn(sync.run(receiver, updates));

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                log_view(&view.borrow_and_update(), row_width);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    drop(commands);
    session.abort();
    Ok(())
}

fn log_view(view: &ClientViewModel, row_width: u64) {
    let rendered = view.rendered_queue(row_width);
    info!(
        entries = rendered.as_ref().map_or(0, |row| row.entries.len()),
        pattern_width = rendered.as_ref().map_or(0, |row| row.row_height),
        rest_width = rendered.as_ref().map_or(0, |row| row.rest_width),
        current_entry = rendered
            .as_ref()
            .and_then(|row| row.entries.iter().find(|entry| entry.is_current))
            .map(|entry| entry.index),
        cursor_position = view.displayed_cursor_position(),
        end_of_pattern = view.cursor.is_some_and(|cursor| cursor.end_of_pattern),
        readiness = view.readiness().as_str(),
        "daemon state"
    );
}

fn print_view(view: &ClientViewModel, row_width: u64) {
    println!("{}", summarize(view, row_width));
}

fn summarize(view: &ClientViewModel, row_width: u64) -> serde_json::Value {
    let rendered = view.rendered_queue(row_width);
    let queue = rendered.as_ref().map(|row| {
        row.entries
            .iter()
            .map(|entry| {
                json!({
                    "index": entry.index,
                    "weburl": entry.weburl,
                    "x": entry.x,
                    "patternLength": entry.width,
                    "current": entry.is_current,
                    "removable": !entry.is_current,
                })
            })
            .collect::<Vec<_>>()
    });
    json!({
        "queue": queue,
        "restWidth": rendered.as_ref().map(|row| row.rest_width),
        "patternWidth": view.queue.as_ref().map(|state| state.pattern_width),
        "colors": view.queue.as_ref().map(|state| state.colors),
        "ribber": view.queue.as_ref().map(|state| state.ribber),
        "cursor": view.cursor,
        "pendingEdit": view.pending_edit.map(|edit| json!({
            "position": edit.position,
            "entry": view.pending_edit_entry(),
        })),
        "machineStatus": view.machine.map(|machine| machine.status),
        "readiness": view.readiness().as_str(),
    })
}
