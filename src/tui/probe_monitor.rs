//! TUI for a probe run with progress display

use crate::proxy::{
    AnonymityLevel, ProbeErrorKind, ProbeEvent, ProbePool, ProbeResult, ProxyCandidate,
    ProxyProber,
};
use crate::{Config, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Maximum number of recent proxies to keep for display
const MAX_RECENT_PROXIES: usize = 100;

/// Probe monitor TUI application state
pub struct ProbeMonitorApp {
    /// Candidates to probe
    candidates: Vec<ProxyCandidate>,
    /// Run configuration
    config: Config,
    /// Total number of candidates
    total: usize,
    /// Number of completed candidates
    checked: usize,
    /// Classified proxies per level, most leaky first
    level_counts: [usize; 3],
    /// Number of discarded candidates
    discarded_count: usize,
    /// Recent classified proxies
    recent_classified: VecDeque<ProbeResult>,
    /// Recent discarded candidates with the reason
    recent_discarded: VecDeque<(ProxyCandidate, ProbeErrorKind)>,
    /// Selected list (0 = classified, 1 = discarded)
    selected_list: usize,
    /// Selected item in current list
    list_state: ListState,
    /// Status message
    status_message: String,
    /// Whether every candidate has completed
    is_complete: bool,
    /// Whether the user wants to quit
    should_quit: bool,
}

impl ProbeMonitorApp {
    /// Create a new probe monitor for `candidates`
    pub fn new(candidates: Vec<ProxyCandidate>, config: Config) -> Self {
        let total = candidates.len();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            candidates,
            config,
            total,
            checked: 0,
            level_counts: [0; 3],
            discarded_count: 0,
            recent_classified: VecDeque::new(),
            recent_discarded: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting probe run... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run the TUI until the user quits.
    ///
    /// Returns every result collected, including partial results when the
    /// user quits before all candidates completed.
    pub async fn run(&mut self) -> Result<Vec<ProbeResult>> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<Vec<ProbeResult>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prober = ProxyProber::new(self.config.prober_config());
        let pool = ProbePool::with_prober(prober, self.config.concurrency, Some(tx));
        pool.enqueue_all(self.candidates.drain(..));
        if self.total == 0 {
            self.update_status();
        }

        loop {
            terminal.draw(|f| self.ui(f))?;

            // Handle key events with a short timeout
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            while let Ok(event) = rx.try_recv() {
                self.record(event);
            }
        }

        if self.is_complete {
            Ok(pool.join().await)
        } else {
            Ok(pool.abandon().await)
        }
    }

    fn record(&mut self, event: ProbeEvent) {
        self.checked += 1;

        match event {
            ProbeEvent::Classified(result) => {
                self.level_counts[level_index(result.level)] += 1;
                self.recent_classified.push_back(result);
                if self.recent_classified.len() > MAX_RECENT_PROXIES {
                    self.recent_classified.pop_front();
                }
            }
            ProbeEvent::Discarded { proxy, kind } => {
                self.discarded_count += 1;
                self.recent_discarded.push_back((proxy, kind));
                if self.recent_discarded.len() > MAX_RECENT_PROXIES {
                    self.recent_discarded.pop_front();
                }
            }
        }

        self.update_status();
    }

    fn update_status(&mut self) {
        let [transparent, anonymous, elite] = self.level_counts;
        if self.checked >= self.total {
            self.is_complete = true;
            self.status_message = format!(
                "Complete! Checked: {} | Elite: {} | Anonymous: {} | Transparent: {} | Discarded: {} | Press 'q' to quit",
                self.total, elite, anonymous, transparent, self.discarded_count
            );
        } else {
            let percentage = (self.checked as f64 / self.total as f64 * 100.0) as u32;
            self.status_message = format!(
                "Probing... {}% ({}/{}) | Elite: {} | Anonymous: {} | Transparent: {} | Discarded: {}",
                percentage,
                self.checked,
                self.total,
                elite,
                anonymous,
                transparent,
                self.discarded_count
            );
        }
    }

    fn handle_input(&mut self, key: KeyEvent) {
        // Raw mode delivers Ctrl-C as a key press instead of a signal
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_classified.len()
        } else {
            self.recent_discarded.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Proxy lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new(format!(
            "Proxy Probe - oracle http://{}:{}/ - {} workers",
            self.config.wan_ip, self.config.oracle_port, self.config.concurrency
        ))
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let progress = if self.total > 0 {
            (self.checked as f64 / self.total as f64 * 100.0) as u16
        } else {
            100
        };
        let progress_label = format!("{}/{} ({}%)", self.checked, self.total, progress);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress.min(100))
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        let list_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[2]);

        let classified: Vec<ListItem> = self
            .recent_classified
            .iter()
            .rev() // Show newest first
            .map(|result| {
                ListItem::new(format!(
                    "{:<22} {:<12} {:.1}s",
                    result.proxy.as_str(),
                    result.level,
                    result.elapsed_secs
                ))
                .style(Style::default().fg(level_color(result.level)))
            })
            .collect();
        let classified_total = self.level_counts.iter().sum();
        Self::render_list(
            f,
            list_chunks[0],
            "Classified",
            classified,
            classified_total,
            if self.selected_list == 0 { Some(&mut self.list_state) } else { None },
        );

        let discarded: Vec<ListItem> = self
            .recent_discarded
            .iter()
            .rev()
            .map(|(proxy, kind)| {
                ListItem::new(format!("{} ({})", proxy, kind))
                    .style(Style::default().fg(Color::DarkGray))
            })
            .collect();
        Self::render_list(
            f,
            list_chunks[1],
            "Discarded",
            discarded,
            self.discarded_count,
            if self.selected_list == 1 { Some(&mut self.list_state) } else { None },
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    fn render_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        items: Vec<ListItem>,
        total_count: usize,
        list_state: Option<&mut ListState>,
    ) {
        let border_style = if list_state.is_some() {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} ({})", title, total_count))
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}

fn level_index(level: AnonymityLevel) -> usize {
    match level {
        AnonymityLevel::Transparent => 0,
        AnonymityLevel::Anonymous => 1,
        AnonymityLevel::Elite => 2,
    }
}

fn level_color(level: AnonymityLevel) -> Color {
    match level {
        AnonymityLevel::Transparent => Color::Red,
        AnonymityLevel::Anonymous => Color::Yellow,
        AnonymityLevel::Elite => Color::Green,
    }
}
