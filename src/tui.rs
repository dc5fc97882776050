//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on
//! exit, and drawing the application state using `ratatui`.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;

use crate::app::{App, Focus, InputMode, Modal, StatusLevel};
use crate::tree::{CheckState, NodeKind};

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui`
/// Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
///
/// Disables raw mode, leaves the alternate screen, and shows the cursor.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    execute!(terminal.backend_mut(), SetTitle(window_title(app)))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);
        let panes = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(vertical[0]);
        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(50),
                Constraint::Percentage(25),
                Constraint::Percentage(25),
            ])
            .split(panes[0]);

        app.tree_view_height = top[0].height.saturating_sub(2) as usize;
        app.output_view_height = panes[1].height.saturating_sub(2) as usize;
        app.tree.set_view_height(app.tree_view_height);

        render_tree(app, frame, top[0]);
        render_playbooks(app, frame, top[1]);
        render_selection(app, frame, top[2]);
        render_output(app, frame, panes[1]);
        render_footer(app, frame, vertical[1]);

        match app.modal {
            Modal::Help => render_help(frame, area),
            Modal::Preview => render_preview(app, frame, area),
            Modal::None => {}
        }
        if app.input_mode == InputMode::VaultPassword {
            render_password_prompt(app, frame, area);
        }
    })?;
    Ok(())
}

fn render_tree(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let visible = app.tree_view_height.max(1);
    let cursor = app.tree.cursor();
    let top = app.tree.top();
    let items: Vec<ListItem> = app
        .tree
        .rows()
        .enumerate()
        .skip(top)
        .take(visible)
        .map(|(i, row)| {
            let marker = match row.check {
                CheckState::Checked => "[x]",
                CheckState::Partial => "[-]",
                CheckState::Unchecked => "[ ]",
            };
            let arrow = match row.kind {
                NodeKind::Group if row.expanded => "▼ ",
                NodeKind::Group => "▶ ",
                NodeKind::Host => "  ",
            };
            let text = format!(
                "{}{} {}{}",
                "  ".repeat(row.depth),
                marker,
                arrow,
                row.name
            );
            let mut style = match row.kind {
                NodeKind::Group => Style::default().add_modifier(Modifier::BOLD),
                NodeKind::Host => Style::default(),
            };
            if i == cursor && app.focus == Focus::Tree {
                style = style.add_modifier(Modifier::REVERSED);
            }
            ListItem::new(Line::from(Span::styled(text, style)))
        })
        .collect();
    let list = List::new(items).block(pane_block("Inventory", app.focus == Focus::Tree));
    frame.render_widget(list, area);
}

fn render_playbooks(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let items: Vec<ListItem> = app
        .playbook_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let chosen = app.playbook_selected == Some(i);
            let text = if chosen {
                format!("● {}", name)
            } else {
                format!("  {}", name)
            };
            let mut style = Style::default();
            if chosen {
                style = style.fg(Color::Green);
            }
            if i == app.playbook_cursor && app.focus == Focus::Playbooks {
                style = style.add_modifier(Modifier::REVERSED);
            }
            ListItem::new(Line::from(Span::styled(text, style)))
        })
        .collect();
    let mut state = ListState::default();
    if !app.playbook_names.is_empty() {
        state.select(Some(app.playbook_cursor.min(app.playbook_names.len() - 1)));
    }
    let list = List::new(items).block(pane_block("Playbooks", app.focus == Focus::Playbooks));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_selection(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let hosts = app.tree.selected_hosts();
    let title = format!("Selection ({})", hosts.len());
    let mut lines: Vec<Line> = hosts.iter().map(|host| Line::from(host.clone())).collect();
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "no hosts selected",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let paragraph = Paragraph::new(lines).block(pane_block(&title, false));
    frame.render_widget(paragraph, area);
}

fn render_output(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let visible = app.output_view_height.max(1);
    let lines: Vec<Line> = app
        .output
        .window(visible)
        .map(|line| Line::from(line.to_string()))
        .collect();
    let title = output_title(app);
    let widget = if lines.is_empty() {
        Paragraph::new(Span::styled(
            "No output yet",
            Style::default().fg(Color::DarkGray),
        ))
        .block(pane_block(&title, app.focus == Focus::Output))
    } else {
        Paragraph::new(lines).block(pane_block(&title, app.focus == Focus::Output))
    };
    frame.render_widget(widget, area);
}

fn output_title(app: &App) -> String {
    let mut title = if app.running {
        "Output (running)".to_string()
    } else {
        "Output".to_string()
    };
    if !app.output.is_following() {
        title.push_str(&format!(" · {} lines back", app.output.scroll()));
    }
    title
}

fn render_footer(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let line = if let Some((message, level)) = app.status_message() {
        let style = match level {
            StatusLevel::Info => Style::default().fg(Color::Green),
            StatusLevel::Warning => Style::default().fg(Color::Yellow),
        };
        Line::from(Span::styled(format!(" {}", message), style))
    } else {
        let vault = if app.vault_enabled { "on" } else { "off" };
        Line::from(Span::styled(
            format!(
                " [space] check  [enter] expand/select  [r] run  [v] vault:{}  [?] preview  [h] help  [q] quit",
                vault
            ),
            Style::default().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_help(frame: &mut ratatui::Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    let help_text = vec![
        "Navigation:",
        "  Tab        Cycle pane focus",
        "  Up/Down    Move cursor / scroll output",
        "  PageUp/Dn  Page",
        "  Home/End   Jump to top/bottom",
        "  Left       Collapse group / go to parent",
        "  Right      Expand group",
        "",
        "Selection:",
        "  Space      Toggle checkbox",
        "  Enter      Expand group / choose playbook",
        "  c          Clear host selection",
        "",
        "Runs:",
        "  r / F5     Run playbook on selected hosts",
        "  v          Toggle vault password file",
        "  ?          Show command preview",
        "  x          Clear output pane",
        "",
        "General:",
        "  h          Toggle this help",
        "  q / Esc    Quit",
    ]
    .join("\n");
    let help_block = Paragraph::new(help_text)
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(Clear, popup_area);
    frame.render_widget(help_block, popup_area);
}

fn render_preview(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let popup_area = centered_rect(70, 30, area);
    let text = app
        .command_preview()
        .unwrap_or_else(|| "select a playbook first".to_string());
    let block = Paragraph::new(text)
        .wrap(ratatui::widgets::Wrap { trim: false })
        .block(
            Block::default()
                .title("Command preview")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(Clear, popup_area);
    frame.render_widget(block, popup_area);
}

fn render_password_prompt(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let popup_area = centered_rect(50, 20, area);
    let text = format!("Vault password: {}", app.password_mask());
    let block = Paragraph::new(text)
        .block(
            Block::default()
                .title("Vault")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(Clear, popup_area);
    frame.render_widget(block, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn pane_block(title: &str, focused: bool) -> Block<'static> {
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border_style)
}

fn window_title(app: &App) -> String {
    match app.selected_playbook_name() {
        Some(name) => format!("playrack · {}", name),
        None => "playrack".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::path::PathBuf;

    fn test_app() -> App {
        App::new(Settings {
            project_root: PathBuf::from("/proj"),
            inventory_root: PathBuf::from("/proj/inventory"),
            playbooks_root: PathBuf::from("/proj/playbooks"),
            expand_levels: 3,
            vault: false,
            max_lines: 100,
            log_file: None,
        })
    }

    #[test]
    fn centered_rect_fits_inside_the_area() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(60, 50, area);
        assert!(popup.width <= 60);
        assert!(popup.height <= 20);
        assert!(popup.x >= 20);
        assert!(popup.y >= 10);
    }

    #[test]
    fn output_title_shows_scrollback_position() {
        let mut app = test_app();
        app.output_view_height = 2;
        for i in 0..10 {
            app.output.push_line(format!("line {}", i));
        }
        assert_eq!(output_title(&app), "Output");
        app.output.scroll_by(3, 2);
        assert_eq!(output_title(&app), "Output · 3 lines back");
        app.running = true;
        assert!(output_title(&app).starts_with("Output (running)"));
    }

    #[test]
    fn window_title_tracks_the_chosen_playbook() {
        let mut app = test_app();
        assert_eq!(window_title(&app), "playrack");
        app.playbooks = vec![PathBuf::from("/proj/playbooks/site.yml")];
        app.playbook_names = vec!["site.yml".to_string()];
        app.playbook_selected = Some(0);
        assert_eq!(window_title(&app), "playrack · site.yml");
    }
}
