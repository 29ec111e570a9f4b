mod app;
mod backend;
mod config;
mod exchange;
mod panel;
mod transcript;
mod ui;

use std::fs::File;
use std::io;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use arboard::Clipboard;
use clap::Parser;
use crossterm::{
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture, Event,
        EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, layout::{Position, Rect}, Terminal};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{info, Level};

use app::{App, BackgroundEvent};
use backend::HttpBackend;
use config::{Cli, Config};
use ui::draw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

// Single thread: UI events and request completions interleave, never overlap
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config().context("invalid configuration")?;

    init_logging(&config, cli.level)?;
    info!(url = %config.base_url, "starting chatpanel");

    let transport = Arc::new(HttpBackend::new(&config).context("failed to build http client")?);
    let (events_tx, events_rx) = unbounded_channel();
    let mut app = App::new(config, transport, events_tx);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.mount();
    let result = run_app(&mut terminal, &mut app, events_rx).await;
    app.unmount();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "chatpanel exited with error");
    }
    result
}

fn init_logging(config: &Config, level: Level) -> Result<()> {
    // The terminal belongs to the UI, so diagnostics go to a file
    let file = File::create(&config.log_file)
        .with_context(|| format!("failed to open log file {}", config.log_file.display()))?;

    let mut subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    if [Level::DEBUG, Level::TRACE].contains(&level) {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    tracing::subscriber::set_global_default(subscriber.finish())
        .context("setting default subscriber")?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut events: UnboundedReceiver<BackgroundEvent>,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut ticker = tokio::time::interval(app.config.tick_rate());

    loop {
        terminal.draw(|frame| draw(frame, app))?;

        tokio::select! {
            _ = ticker.tick() => app.tick(),
            Some(event) = events.recv() => app.handle_background(event),
            maybe_event = input.next() => {
                let event = match maybe_event {
                    Some(event) => event?,
                    None => return Ok(()),
                };
                let size = terminal.size()?;
                let screen = Rect::new(0, 0, size.width, size.height);
                if handle_event(app, event, screen) == Flow::Quit {
                    return Ok(());
                }
            }
        }
    }
}

fn handle_event(app: &mut App, event: Event, screen: Rect) -> Flow {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
        Event::Paste(text) => {
            if app.panel.is_open() {
                app.insert_text(&text);
            }
            Flow::Continue
        }
        Event::Mouse(mouse) => {
            handle_mouse(app, mouse, screen);
            Flow::Continue
        }
        _ => Flow::Continue,
    }
}

fn handle_key(app: &mut App, key: KeyEvent) -> Flow {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('c') if ctrl => return Flow::Quit,
        KeyCode::Char('o') if ctrl => {
            app.toggle();
            return Flow::Continue;
        }
        KeyCode::F(1) => {
            app.toggle();
            return Flow::Continue;
        }
        _ => {}
    }

    if !app.panel.is_open() {
        return match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Flow::Quit,
            KeyCode::Enter => {
                app.toggle();
                Flow::Continue
            }
            _ => Flow::Continue,
        };
    }

    match key.code {
        KeyCode::Esc => app.close_panel(),
        KeyCode::Enter => app.submit(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::PageUp => {
            for _ in 0..3 {
                app.scroll_up();
            }
        }
        KeyCode::PageDown => {
            for _ in 0..3 {
                app.scroll_down();
            }
        }
        KeyCode::Char('v') if ctrl => {
            // Ctrl+V: Get clipboard content
            if let Ok(mut clipboard) = Clipboard::new() {
                if let Ok(text) = clipboard.get_text() {
                    app.insert_text(&text);
                }
            }
        }
        KeyCode::Char(c) if !ctrl => app.insert_text(c.encode_utf8(&mut [0; 4])),
        _ => {}
    }
    Flow::Continue
}

fn handle_mouse(app: &mut App, mouse: MouseEvent, screen: Rect) {
    let position = Position::new(mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if ui::badge_area(screen).contains(position) {
                app.toggle();
            } else if app.panel.is_open() && ui::input_area(screen).contains(position) {
                app.panel.focus_input();
            }
        }
        MouseEventKind::ScrollUp if app.panel.is_open() => app.scroll_up(),
        MouseEventKind::ScrollDown if app.panel.is_open() => app.scroll_down(),
        _ => {}
    }
}
