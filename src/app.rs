//! Application state and UI logic.
//!
//! This module holds the core `App` struct, which maintains the inventory
//! tree, playbook list, output buffer, vault state, and run state. It also
//! defines how user input events are translated into application actions.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::command::{build_playbook_command, preview_command};
use crate::config::Settings;
use crate::error::Error;
use crate::inventory;
use crate::output::OutputBuffer;
use crate::playbooks::{discover_playbooks, friendly_name};
use crate::tree::InventoryTree;

/// Which pane receives navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Tree,
    Playbooks,
    Output,
}

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Typing the vault password (masked).
    VaultPassword,
}

/// Overlay currently shown on top of the panes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modal {
    None,
    Help,
    Preview,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the application.
    Quit,
    /// Launch a playbook run.
    Run(RunRequest),
}

/// Everything the run driver needs to start a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub inventory: PathBuf,
    pub playbook: PathBuf,
    pub limit_patterns: Vec<String>,
    pub vault_password: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

/// The main application state container.
pub struct App {
    /// Resolved runtime settings.
    pub settings: Settings,
    /// The inventory tree.
    pub tree: InventoryTree,
    /// Discovered playbook paths.
    pub playbooks: Vec<PathBuf>,
    /// Display names parallel to `playbooks`.
    pub playbook_names: Vec<String>,
    /// Cursor in the playbook list.
    pub playbook_cursor: usize,
    /// Index of the chosen playbook, if any.
    pub playbook_selected: Option<usize>,
    /// Which pane receives navigation keys.
    pub focus: Focus,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Live run output.
    pub output: OutputBuffer,
    /// Whether runs use the vault password file.
    pub vault_enabled: bool,
    /// Overlay currently shown.
    pub modal: Modal,
    /// Whether a run is active.
    pub running: bool,
    /// Flag indicating if the application should exit.
    pub should_quit: bool,
    /// Height of the tree pane (for paging and scroll).
    pub tree_view_height: usize,
    /// Height of the output pane (for paging and scroll clamping).
    pub output_view_height: usize,
    vault_password: Option<String>,
    password_buffer: String,
    status_message: Option<StatusMessage>,
}

impl App {
    /// Creates a new `App` instance from resolved settings.
    pub fn new(settings: Settings) -> Self {
        let output = OutputBuffer::new(settings.max_lines);
        let vault_enabled = settings.vault;
        Self {
            settings,
            tree: InventoryTree::new(),
            playbooks: Vec::new(),
            playbook_names: Vec::new(),
            playbook_cursor: 0,
            playbook_selected: None,
            focus: Focus::Tree,
            input_mode: InputMode::Normal,
            output,
            vault_enabled,
            modal: Modal::None,
            running: false,
            should_quit: false,
            tree_view_height: 0,
            output_view_height: 0,
            vault_password: None,
            password_buffer: String::new(),
            status_message: None,
        }
    }

    /// Loads the inventory tree and discovers playbooks.
    pub fn reload(&mut self) {
        match inventory::load_tree(&self.settings.inventory_root) {
            Ok(spec) => {
                if let Err(err) = self.tree.load(&spec, self.settings.expand_levels) {
                    self.set_status_warning(format!("inventory: {}", err));
                }
            }
            Err(err) => {
                self.set_status_warning(format!("inventory: {:#}", err));
            }
        }
        self.playbooks = discover_playbooks(&self.settings.playbooks_root);
        self.playbook_names = self
            .playbooks
            .iter()
            .map(|path| friendly_name(path, &self.settings.playbooks_root))
            .collect();
        if self.playbooks.is_empty() {
            self.playbook_selected = None;
        }
        self.playbook_cursor = 0;
    }

    pub fn selected_playbook(&self) -> Option<&PathBuf> {
        self.playbook_selected.and_then(|i| self.playbooks.get(i))
    }

    pub fn selected_playbook_name(&self) -> Option<&str> {
        self.playbook_selected
            .and_then(|i| self.playbook_names.get(i))
            .map(String::as_str)
    }

    /// The command line a run would use right now, with the vault path
    /// placeholder masked. `None` until a playbook is chosen.
    pub fn command_preview(&self) -> Option<String> {
        let playbook = self.selected_playbook()?;
        let limits = self.tree.limit_patterns();
        let vault = self
            .vault_enabled
            .then(|| PathBuf::from("<vault password file>"));
        let cmd = build_playbook_command(
            &self.settings.inventory_root,
            playbook,
            &limits,
            vault.as_deref(),
        );
        Some(preview_command(&cmd))
    }

    // ---- run lifecycle ----

    /// Appends a raw output chunk, returning the display lines it produced
    /// so the caller can mirror them to a log file.
    pub fn on_run_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let following = self.output.is_following();
        let appended = self.output.append_bytes(chunk);
        if following {
            self.output.to_bottom();
        }
        appended
    }

    pub fn on_run_exited(&mut self, code: i32) {
        self.running = false;
        let line = if code == 0 {
            "process ended successfully".to_string()
        } else {
            format!("process exited with code {}", code)
        };
        let following = self.output.is_following();
        self.output.push_line(line.clone());
        if following {
            self.output.to_bottom();
        }
        self.set_status_message(line);
    }

    pub fn on_run_failed(&mut self, error: &str) {
        self.running = false;
        self.output.push_line(format!("run failed: {}", error));
        self.set_status_warning(format!("run failed: {}", error));
    }

    pub fn on_spawn_error(&mut self, error: &Error) {
        self.running = false;
        self.output.push_line(format!("{}", error));
        self.set_status_warning(format!("{}", error));
    }

    // ---- input handling ----

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        match self.input_mode {
            InputMode::VaultPassword => self.handle_password_input(key),
            InputMode::Normal => self.handle_normal_input(key),
        }
    }

    fn handle_password_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.password_buffer.clear();
                self.input_mode = InputMode::Normal;
                AppAction::None
            }
            KeyCode::Enter => {
                let password = std::mem::take(&mut self.password_buffer);
                self.input_mode = InputMode::Normal;
                if password.is_empty() {
                    self.set_status_warning("empty vault password; run cancelled");
                    return AppAction::None;
                }
                self.vault_password = Some(password);
                self.request_run()
            }
            KeyCode::Backspace => {
                self.password_buffer.pop();
                AppAction::None
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return AppAction::None;
                }
                self.password_buffer.push(c);
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_normal_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                if self.modal != Modal::None {
                    self.modal = Modal::None;
                    AppAction::None
                } else {
                    self.should_quit = true;
                    AppAction::Quit
                }
            }
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Tree => Focus::Playbooks,
                    Focus::Playbooks => Focus::Output,
                    Focus::Output => Focus::Tree,
                };
                AppAction::None
            }
            KeyCode::Up => {
                self.navigate(-1);
                AppAction::None
            }
            KeyCode::Down => {
                self.navigate(1);
                AppAction::None
            }
            KeyCode::PageUp => {
                match self.focus {
                    Focus::Tree => self.tree.page_up(),
                    Focus::Playbooks => self.move_playbook_cursor(-(self.page_step() as isize)),
                    Focus::Output => self.output.page_up(self.output_view_height.max(1)),
                }
                AppAction::None
            }
            KeyCode::PageDown => {
                match self.focus {
                    Focus::Tree => self.tree.page_down(),
                    Focus::Playbooks => self.move_playbook_cursor(self.page_step() as isize),
                    Focus::Output => self.output.page_down(self.output_view_height.max(1)),
                }
                AppAction::None
            }
            KeyCode::Home => {
                match self.focus {
                    Focus::Tree => self.tree.to_home(),
                    Focus::Playbooks => self.playbook_cursor = 0,
                    Focus::Output => self.output.to_top(self.output_view_height.max(1)),
                }
                AppAction::None
            }
            KeyCode::End => {
                match self.focus {
                    Focus::Tree => self.tree.to_end(),
                    Focus::Playbooks => {
                        self.playbook_cursor = self.playbooks.len().saturating_sub(1)
                    }
                    Focus::Output => self.output.to_bottom(),
                }
                AppAction::None
            }
            KeyCode::Left => {
                if self.focus == Focus::Tree {
                    self.tree.collapse_current_or_go_parent();
                }
                AppAction::None
            }
            KeyCode::Right => {
                if self.focus == Focus::Tree {
                    self.tree.expand_current();
                }
                AppAction::None
            }
            KeyCode::Char(' ') => {
                if self.focus == Focus::Tree {
                    self.tree.toggle_check_current();
                }
                AppAction::None
            }
            KeyCode::Enter => {
                match self.focus {
                    Focus::Tree => self.tree.toggle_expand_current(),
                    Focus::Playbooks => {
                        if self.playbook_cursor < self.playbooks.len() {
                            self.playbook_selected = Some(self.playbook_cursor);
                        }
                    }
                    Focus::Output => {}
                }
                AppAction::None
            }
            KeyCode::Char('v') => {
                self.vault_enabled = !self.vault_enabled;
                if !self.vault_enabled {
                    self.vault_password = None;
                }
                self.set_status_message(if self.vault_enabled {
                    "vault: on"
                } else {
                    "vault: off"
                });
                AppAction::None
            }
            KeyCode::Char('c') => {
                self.tree.clear_checks();
                self.set_status_message("cleared host selection");
                AppAction::None
            }
            KeyCode::Char('x') => {
                self.output.clear();
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.modal = if self.modal == Modal::Preview {
                    Modal::None
                } else {
                    Modal::Preview
                };
                AppAction::None
            }
            KeyCode::Char('h') => {
                self.modal = if self.modal == Modal::Help {
                    Modal::None
                } else {
                    Modal::Help
                };
                AppAction::None
            }
            KeyCode::Char('r') | KeyCode::F(5) => self.try_start_run(),
            _ => AppAction::None,
        }
    }

    fn navigate(&mut self, delta: isize) {
        match self.focus {
            Focus::Tree => self.tree.move_cursor(delta),
            Focus::Playbooks => self.move_playbook_cursor(delta),
            Focus::Output => self
                .output
                .scroll_by(-delta, self.output_view_height.max(1)),
        }
    }

    fn move_playbook_cursor(&mut self, delta: isize) {
        if self.playbooks.is_empty() {
            return;
        }
        let last = self.playbooks.len() - 1;
        self.playbook_cursor = if delta >= 0 {
            self.playbook_cursor.saturating_add(delta as usize).min(last)
        } else {
            self.playbook_cursor.saturating_sub(delta.unsigned_abs())
        };
    }

    fn page_step(&self) -> usize {
        self.tree_view_height.max(1)
    }

    fn try_start_run(&mut self) -> AppAction {
        if self.running {
            self.set_status_warning("a run is already in progress");
            return AppAction::None;
        }
        if self.selected_playbook().is_none() {
            self.set_status_warning("no playbook selected");
            return AppAction::None;
        }
        if self.tree.selected_hosts().is_empty() {
            self.set_status_warning("no hosts selected");
            return AppAction::None;
        }
        if self.vault_enabled && self.vault_password.is_none() {
            self.input_mode = InputMode::VaultPassword;
            self.password_buffer.clear();
            return AppAction::None;
        }
        self.request_run()
    }

    fn request_run(&mut self) -> AppAction {
        let Some(playbook) = self.selected_playbook().cloned() else {
            return AppAction::None;
        };
        self.running = true;
        self.modal = Modal::None;
        AppAction::Run(RunRequest {
            inventory: self.settings.inventory_root.clone(),
            playbook,
            limit_patterns: self.tree.limit_patterns(),
            vault_password: self
                .vault_enabled
                .then(|| self.vault_password.clone())
                .flatten(),
        })
    }

    // ---- status message ----

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        if let Some(message) = &self.status_message {
            let still_visible = match message.ttl {
                Some(ttl) => message.at.elapsed() < ttl,
                None => true,
            };
            if still_visible {
                return Some((message.text.as_str(), message.level));
            }
        }
        None
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info, Some(Duration::from_secs(3)));
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(
            message,
            StatusLevel::Warning,
            Some(Duration::from_secs(5)),
        );
    }

    fn set_status_message_with_level(
        &mut self,
        message: impl Into<String>,
        level: StatusLevel,
        ttl: Option<Duration>,
    ) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }

    pub fn password_mask(&self) -> String {
        "*".repeat(self.password_buffer.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeSpec;
    use std::path::Path;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_settings() -> Settings {
        Settings {
            project_root: PathBuf::from("/proj"),
            inventory_root: PathBuf::from("/proj/inventory"),
            playbooks_root: PathBuf::from("/proj/playbooks"),
            expand_levels: 3,
            vault: false,
            max_lines: 100,
            log_file: None,
        }
    }

    fn app_with_selection() -> App {
        let mut app = App::new(test_settings());
        let spec = NodeSpec::group(
            "all",
            vec![NodeSpec::group("switches", vec![NodeSpec::host("sw1")])],
        );
        app.tree.load(&spec, 3).unwrap();
        app.playbooks = vec![PathBuf::from("/proj/playbooks/site.yml")];
        app.playbook_names = vec!["site.yml".to_string()];
        app.playbook_selected = Some(0);
        app.tree.to_end();
        app.tree.toggle_check_current();
        app
    }

    #[test]
    fn quit_keys_set_the_flag() {
        let mut app = App::new(test_settings());
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppAction::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn esc_closes_a_modal_before_quitting() {
        let mut app = App::new(test_settings());
        app.modal = Modal::Help;
        assert_eq!(app.handle_key(key(KeyCode::Esc)), AppAction::None);
        assert_eq!(app.modal, Modal::None);
        assert!(!app.should_quit);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), AppAction::Quit);
    }

    #[test]
    fn tab_cycles_focus() {
        let mut app = App::new(test_settings());
        assert_eq!(app.focus, Focus::Tree);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Playbooks);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Output);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Tree);
    }

    #[test]
    fn run_requires_playbook_and_hosts() {
        let mut app = App::new(test_settings());
        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), AppAction::None);
        assert!(!app.running);

        let mut app = app_with_selection();
        let action = app.handle_key(key(KeyCode::Char('r')));
        match action {
            AppAction::Run(request) => {
                assert_eq!(request.playbook, Path::new("/proj/playbooks/site.yml"));
                assert_eq!(request.limit_patterns, vec!["sw1"]);
                assert!(request.vault_password.is_none());
            }
            other => panic!("expected Run, got {:?}", other),
        }
        assert!(app.running);
    }

    #[test]
    fn second_run_is_rejected_while_active() {
        let mut app = app_with_selection();
        assert!(matches!(
            app.handle_key(key(KeyCode::Char('r'))),
            AppAction::Run(_)
        ));
        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), AppAction::None);
    }

    #[test]
    fn vault_run_prompts_for_password_once() {
        let mut app = app_with_selection();
        app.vault_enabled = true;
        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::VaultPassword);
        for c in "s3cret".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.password_mask(), "******");
        let action = app.handle_key(key(KeyCode::Enter));
        match action {
            AppAction::Run(request) => {
                assert_eq!(request.vault_password.as_deref(), Some("s3cret"));
            }
            other => panic!("expected Run, got {:?}", other),
        }
        assert_eq!(app.input_mode, InputMode::Normal);

        // The cached password is reused for the next run without a prompt.
        app.on_run_exited(0);
        assert!(matches!(
            app.handle_key(key(KeyCode::Char('r'))),
            AppAction::Run(_)
        ));
    }

    #[test]
    fn escape_cancels_the_password_prompt() {
        let mut app = app_with_selection();
        app.vault_enabled = true;
        app.handle_key(key(KeyCode::Char('r')));
        app.handle_key(key(KeyCode::Char('a')));
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(!app.running);
        assert_eq!(app.password_mask(), "");
    }

    #[test]
    fn toggling_vault_off_forgets_the_password() {
        let mut app = app_with_selection();
        app.vault_enabled = true;
        app.handle_key(key(KeyCode::Char('r')));
        for c in "pw".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));
        app.on_run_exited(0);
        app.handle_key(key(KeyCode::Char('v')));
        assert!(!app.vault_enabled);
        app.handle_key(key(KeyCode::Char('v')));
        // Re-enabled vault must prompt again.
        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::VaultPassword);
    }

    #[test]
    fn run_exit_appends_a_final_line() {
        let mut app = app_with_selection();
        app.handle_key(key(KeyCode::Char('r')));
        app.on_run_chunk(b"PLAY [all]\r\n");
        app.on_run_exited(2);
        assert!(!app.running);
        let lines: Vec<&str> = app.output.window(10).collect();
        assert_eq!(lines, vec!["PLAY [all]", "process exited with code 2"]);
    }

    #[test]
    fn output_follows_tail_only_when_pinned() {
        let mut app = app_with_selection();
        app.output_view_height = 2;
        for i in 0..5 {
            app.on_run_chunk(format!("line {}\n", i).as_bytes());
        }
        assert!(app.output.is_following());
        app.focus = Focus::Output;
        app.handle_key(key(KeyCode::Up));
        let frozen = app.output.scroll();
        assert!(frozen > 0);
        app.on_run_chunk(b"line 5\n");
        assert_eq!(app.output.scroll(), frozen);
        app.handle_key(key(KeyCode::End));
        assert!(app.output.is_following());
    }

    #[test]
    fn space_toggles_only_with_tree_focus() {
        let mut app = app_with_selection();
        let before = app.tree.selected_hosts();
        app.focus = Focus::Playbooks;
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.tree.selected_hosts(), before);
    }

    #[test]
    fn clear_keys_reset_selection_and_output() {
        let mut app = app_with_selection();
        app.on_run_chunk(b"noise\n");
        app.handle_key(key(KeyCode::Char('c')));
        assert!(app.tree.selected_hosts().is_empty());
        app.handle_key(key(KeyCode::Char('x')));
        assert!(app.output.is_empty());
    }

    #[test]
    fn preview_masks_the_vault_placeholder() {
        let mut app = app_with_selection();
        app.vault_enabled = true;
        let preview = app.command_preview().unwrap();
        assert!(preview.contains("--vault-password-file"));
        assert!(preview.contains("******"));
        assert!(!preview.contains("<vault password file>"));
    }

    #[test]
    fn spawn_error_is_reported_and_unlocks_runs() {
        let mut app = app_with_selection();
        app.handle_key(key(KeyCode::Char('r')));
        app.on_spawn_error(&Error::Spawn {
            command: "ansible-playbook".to_string(),
            message: "not found".to_string(),
        });
        assert!(!app.running);
        assert!(matches!(
            app.handle_key(key(KeyCode::Char('r'))),
            AppAction::Run(_)
        ));
        let lines: Vec<String> = app.output.window(10).map(str::to_string).collect();
        assert!(lines.iter().any(|l| l.contains("not found")));
    }
}
