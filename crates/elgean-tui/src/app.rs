//! App: terminal event loop around a running `ListenerSession`.
//!
//! - Key events arrive from a blocking reader task over an mpsc channel.
//! - Session state arrives on a `watch` channel and is redrawn as-is.
//! - WARN/ERROR log lines arrive over the log broadcast channel.
//! - Key presses become `SessionCommand`s; the app never touches like state.

use std::collections::VecDeque;
use std::io;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use elgean_listener::{SessionCommand, SessionSnapshot};
use elgean_proto::config::StreamConfig;

use crate::ui::{self, Screen};

const MAX_LOG_LINES: usize = 200;

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    Log(String),
}

// ── App ───────────────────────────────────────────────────────────────────────

pub struct App {
    stream: StreamConfig,
    snapshot: SessionSnapshot,
    logs: VecDeque<String>,
    commands: mpsc::Sender<SessionCommand>,
    should_quit: bool,
}

impl App {
    pub fn new(stream: StreamConfig, commands: mpsc::Sender<SessionCommand>) -> Self {
        Self {
            stream,
            snapshot: SessionSnapshot::default(),
            logs: VecDeque::new(),
            commands,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(
        mut self,
        mut snapshots: watch::Receiver<SessionSnapshot>,
        mut log_rx: broadcast::Receiver<String>,
    ) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("terminal ready, size={:?}", terminal.size());

        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);

        // ── Background task: keyboard events ──────────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: log lines → AppMessage ───────────────────────────
        let log_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match log_rx.recv().await {
                    Ok(line) => {
                        if log_tx.send(AppMessage::Log(line)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        let _ = log_tx
                            .send(AppMessage::Log(format!("… {} log lines dropped", n)))
                            .await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // ── Main loop ─────────────────────────────────────────────────────────
        let result: anyhow::Result<()> = loop {
            if let Err(e) = terminal.draw(|f| {
                ui::draw(
                    f,
                    &Screen {
                        station_name: &self.stream.station_name,
                        stream_url: &self.stream.url,
                        snapshot: &self.snapshot,
                        logs: &self.logs,
                    },
                )
            }) {
                break Err(e.into());
            }

            if self.should_quit {
                break Ok(());
            }

            tokio::select! {
                Some(msg) = rx.recv() => self.handle_message(msg),

                changed = snapshots.changed() => match changed {
                    Ok(()) => self.snapshot = snapshots.borrow_and_update().clone(),
                    Err(_) => {
                        warn!("listener session ended, closing");
                        self.should_quit = true;
                    }
                },
            }
        };

        // ── Teardown ──────────────────────────────────────────────────────────
        let _ = self.commands.try_send(SessionCommand::Shutdown);
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) => self.handle_key(key),
            AppMessage::Event(_) => {}
            AppMessage::Log(line) => self.push_log(line),
        }
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('l') => self.send(SessionCommand::ToggleLike),
            KeyCode::Char('r') => self.send(SessionCommand::Refresh),
            _ => {}
        }
    }

    fn send(&mut self, cmd: SessionCommand) {
        if let Err(e) = self.commands.try_send(cmd) {
            warn!("dropping {:?}: {}", cmd, e);
        }
    }

    fn push_log(&mut self, line: String) {
        self.logs.push_back(line);
        while self.logs.len() > MAX_LOG_LINES {
            self.logs.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> (App, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(8);
        (App::new(StreamConfig::default(), tx), rx)
    }

    #[test]
    fn keys_map_to_session_commands() {
        let (mut app, mut rx) = app();
        app.handle_key(key(KeyCode::Char('l')));
        app.handle_key(key(KeyCode::Char('r')));
        app.handle_key(key(KeyCode::Char('x')));

        assert_eq!(rx.try_recv().unwrap(), SessionCommand::ToggleLike);
        assert_eq!(rx.try_recv().unwrap(), SessionCommand::Refresh);
        assert!(rx.try_recv().is_err());
        assert!(!app.should_quit);
    }

    #[test]
    fn quit_keys() {
        for k in [
            key(KeyCode::Char('q')),
            key(KeyCode::Esc),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            let (mut app, _rx) = app();
            app.handle_key(k);
            assert!(app.should_quit);
        }
    }

    #[test]
    fn log_strip_is_bounded() {
        let (mut app, _rx) = app();
        for i in 0..MAX_LOG_LINES + 10 {
            app.push_log(format!("line {}", i));
        }
        assert_eq!(app.logs.len(), MAX_LOG_LINES);
        assert_eq!(app.logs.front().map(String::as_str), Some("line 10"));
    }
}
