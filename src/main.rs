//! Playrack: an interactive ansible-playbook runner with a TUI.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads configuration, and sets up the main event loop to manage
//! the inventory tree, playbook selection, and live runs.

mod app;
mod command;
mod config;
mod error;
mod events;
mod inventory;
mod output;
mod playbooks;
mod runner;
mod tree;
mod tui;
mod vault;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use tokio::sync::mpsc;

use crate::app::{App, AppAction, RunRequest};
use crate::command::{build_playbook_command, preview_command};
use crate::config::{load_config, Config, Overrides, Settings};
use crate::events::Event;
use crate::runner::{LiveRunner, RunnerMessage};
use crate::vault::VaultSecret;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "playrack",
    version,
    about = "Interactive ansible-playbook runner with a TUI",
    styles = help_styles(),
    color = clap::ColorChoice::Always
)]
struct Cli {
    /// Project root containing inventory/ and playbooks/ (default: ".").
    root: Option<PathBuf>,
    /// Path to playrack.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Inventory directory or file.
    #[arg(long)]
    inventory: Option<PathBuf>,
    /// Playbooks directory.
    #[arg(long)]
    playbooks: Option<PathBuf>,
    /// Number of tree levels to auto-expand on load.
    #[arg(long)]
    expand_levels: Option<usize>,
    /// Start with the vault password file enabled.
    #[arg(long)]
    vault: bool,
    /// Max output lines to keep in memory.
    #[arg(long)]
    max_lines: Option<usize>,
    /// Append run output to this log file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Resources tied to the run in flight.
struct ActiveRun {
    secret: Option<VaultSecret>,
    log: Option<BufWriter<File>>,
}

impl ActiveRun {
    fn log_lines(&mut self, lines: &[String]) {
        if let Some(log) = self.log.as_mut() {
            for line in lines {
                let _ = writeln!(log, "{}", line);
            }
        }
    }

    fn log_line(&mut self, line: &str) {
        if let Some(log) = self.log.as_mut() {
            let _ = writeln!(log, "{}", line);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| project_root.join("playrack.toml"));
    let config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        Config::default()
    };
    let overrides = Overrides {
        inventory: cli.inventory,
        playbooks: cli.playbooks,
        expand_levels: cli.expand_levels,
        vault: cli.vault,
        max_lines: cli.max_lines,
        log_file: cli.log_file,
    };
    let settings = Settings::resolve(project_root, &config, &overrides);

    let mut app = App::new(settings);
    app.reload();

    let (event_tx, mut event_rx) = mpsc::channel(256);
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());

    let mut terminal = tui::init_terminal()?;
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut active: Option<ActiveRun> = None;
    let mut result = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::Key(key) => {
                        if let AppAction::Run(request) = app.handle_key(key) {
                            start_run(&mut app, request, &mut active, &event_tx);
                        }
                    }
                    Event::Resize { .. } => {}
                    Event::RunChunk(chunk) => {
                        let lines = app.on_run_chunk(&chunk);
                        if let Some(run) = active.as_mut() {
                            run.log_lines(&lines);
                        }
                    }
                    Event::RunFailed { error } => {
                        app.on_run_failed(&error);
                        if let Some(run) = active.as_mut() {
                            run.log_line(&format!("run failed: {}", error));
                        }
                    }
                    Event::RunExited { code } => {
                        app.on_run_exited(code);
                        finish_run(&mut app, &mut active, code);
                    }
                    Event::Shutdown => {
                        app.should_quit = true;
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            result = Err(err).context("failed to draw UI");
            break;
        }
        if app.should_quit {
            break;
        }
    }

    // Dropping the active run removes the vault secret file. The runner
    // itself lives in the driver task; its Drop reaps the child when the
    // runtime shuts down.
    drop(active);
    tui::restore_terminal(terminal)?;
    result
}

fn start_run(
    app: &mut App,
    request: RunRequest,
    active: &mut Option<ActiveRun>,
    tx: &mpsc::Sender<Event>,
) {
    if active.is_some() {
        app.running = true;
        app.set_status_warning("a run is already in progress");
        return;
    }

    let secret = match request.vault_password.as_deref() {
        Some(password) => match VaultSecret::create(password) {
            Ok(secret) => Some(secret),
            Err(err) => {
                app.on_spawn_error(&err);
                return;
            }
        },
        None => None,
    };

    let cmd = build_playbook_command(
        &request.inventory,
        &request.playbook,
        &request.limit_patterns,
        secret.as_ref().map(|s| s.path()),
    );
    let preview = preview_command(&cmd);

    app.output.clear();
    app.output.push_line(format!("$ {}", preview));

    let runner = match LiveRunner::spawn(&cmd, &app.settings.project_root) {
        Ok(runner) => runner,
        Err(err) => {
            app.on_spawn_error(&err);
            return;
        }
    };

    let mut run = ActiveRun {
        secret,
        log: open_run_log(app),
    };
    run.log_line(&format!("$ {}", preview));
    *active = Some(run);

    spawn_run_driver(runner, tx.clone());
    let name = app
        .selected_playbook_name()
        .unwrap_or("playbook")
        .to_string();
    app.set_status_message(format!("running {}", name));
}

fn finish_run(app: &mut App, active: &mut Option<ActiveRun>, code: i32) {
    let Some(mut run) = active.take() else {
        return;
    };
    if code == 0 {
        run.log_line("process ended successfully");
    } else {
        run.log_line(&format!("process exited with code {}", code));
    }
    if let Some(log) = run.log.as_mut() {
        let _ = log.flush();
    }
    if let Some(secret) = run.secret.take() {
        if let Err(err) = secret.close() {
            app.set_status_warning(format!("{}", err));
        }
    }
}

fn open_run_log(app: &mut App) -> Option<BufWriter<File>> {
    let path = app.settings.log_file.clone()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                app.set_status_warning(format!("log file: {}", err));
                return None;
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(BufWriter::new(file)),
        Err(err) => {
            app.set_status_warning(format!("log file: {}", err));
            None
        }
    }
}

/// Forwards runner messages into the main event loop, then reports the exit
/// code once the output stream is drained.
fn spawn_run_driver(mut runner: LiveRunner, tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        while let Some(message) = runner.recv().await {
            match message {
                RunnerMessage::Chunk(chunk) => {
                    if tx.send(Event::RunChunk(chunk)).await.is_err() {
                        return;
                    }
                }
                RunnerMessage::Error(err) => {
                    let _ = tx
                        .send(Event::RunFailed {
                            error: err.to_string(),
                        })
                        .await;
                }
                RunnerMessage::Eof => break,
            }
        }
        let code = tokio::task::spawn_blocking(move || {
            let mut runner = runner;
            runner.wait()
        })
        .await
        .unwrap_or(-1);
        let _ = tx.send(Event::RunExited { code }).await;
    });
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => {
                    let _ = tx.blocking_send(Event::Key(key));
                }
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    let _ = tx.blocking_send(Event::Resize { width, height });
                }
                _ => {}
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = tx.send(Event::Shutdown).await;
                }
                _ = sigterm.recv() => {
                    let _ = tx.send(Event::Shutdown).await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(Event::Shutdown).await;
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(Style::new().fg_color(Some(AnsiColor::Red.into())))
}
