//! Watchboard - a terminal dashboard for stock watchlists.

mod api;
mod app;
mod board;
mod cli;
mod config;
mod export;
mod logging;
mod models;
mod proxy;
mod starred;
mod storage;
mod store;
mod ui;

use anyhow::{Context, Result, bail};
use app::App;
use board::Board;
use cli::{Args, Command};
use config::Config;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use export::BoardExport;
use models::{ListId, SortDirection, SortKey, Symbol};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    let mut config = if let Some(ref path) = args.config {
        Config::load(path)?
    } else {
        Config::load_or_default()
    };
    if let Some(ref dir) = args.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    if let Some(ref api) = args.api {
        config.general.api_base = api.clone();
    }
    if args.timeout.is_some() {
        config.general.timeout_secs = args.timeout;
    }

    match args.command.clone() {
        Some(Command::SampleConfig) => {
            print!("{}", config::sample_config());
            return Ok(());
        }
        Some(Command::Proxy { port, upstream }) => {
            logging::init_stderr(args.verbose);
            let upstream = upstream.unwrap_or_else(|| config.proxy.upstream.clone());
            return proxy::serve(&upstream, port.unwrap_or(config.proxy.port)).await;
        }
        _ => {}
    }

    let Some(data_dir) = config.data_dir() else {
        bail!("No data directory available; pass --data-dir or set storage.data_dir");
    };
    let interactive = args.command.is_none() && !args.batch;
    if interactive {
        logging::init_file(&data_dir, args.verbose)?;
    } else {
        logging::init_stderr(args.verbose);
    }

    let board = build_board(&config, data_dir)?;
    board.restore();

    match args.command.clone() {
        Some(command) => run_command(&board, command).await,
        None => {
            let active = args.list.unwrap_or_else(|| config.start_list());
            let key = args.sort.map(SortKey::from).unwrap_or(config.display.sort_by);
            let direction = if args.reverse || config.display.sort_descending {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            let mut app = App::new(board, active, key, direction);

            if args.batch {
                run_batch(&mut app, args.export.into()).await
            } else {
                run_interactive(&mut app).await
            }
        }
    }
}

fn build_board(config: &Config, data_dir: PathBuf) -> Result<Board> {
    tracing::debug!(dir = %data_dir.display(), api = %config.general.api_base, "starting");
    let storage = Arc::new(storage::FileStorage::new(data_dir));
    let source = api::RemoteClient::new(&config.general.api_base, config.general.timeout_secs)
        .context("Failed to create HTTP client")?;
    Ok(Board::new(storage, Arc::new(source), &config.lists))
}

/// Run a maintenance subcommand against the persisted board.
async fn run_command(board: &Board, command: Command) -> Result<()> {
    match command {
        Command::Add { list, symbols } => {
            for raw in &symbols {
                match board.add_and_price(list, raw).await {
                    Ok(Some(row)) => println!(
                        "Added {} to {} (1D {}, RSI {})",
                        row.symbol,
                        list.title(),
                        export::format_percent(row.perf1d),
                        export::format_rsi(row.rsi14)
                    ),
                    Ok(None) => println!("Skipped {:?}: not added to {}", raw, list.title()),
                    Err(e) => eprintln!("Could not add {:?}: {}", raw, e),
                }
            }
        }
        Command::Remove { list, symbols } => {
            for symbol in symbols.iter().filter_map(|s| Symbol::parse(s)) {
                if board.remove(list, &symbol) {
                    println!("Removed {} from {}", symbol, list.title());
                } else {
                    println!("{} is not in {}", symbol, list.title());
                }
            }
        }
        Command::Star { symbols } => {
            for symbol in symbols.iter().filter_map(|s| Symbol::parse(s)) {
                let source = ListId::STORED
                    .into_iter()
                    .find(|&id| board.rows(id).iter().any(|r| r.symbol == symbol))
                    .unwrap_or(ListId::Starred);
                let starred = board.toggle_star(source, &symbol);
                println!("{} {}", if starred { "Starred" } else { "Unstarred" }, symbol);
            }
        }
        Command::Export { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(BoardExport::default_file_name()));
            board.export().write(&path)?;
            println!("Exported to {}", path.display());
        }
        Command::Seed { path } => {
            let doc = BoardExport::read(&path)?;
            let seeded = board.seed(&doc);
            if seeded.is_empty() {
                println!("Nothing seeded; every list already has data");
            } else {
                let names: Vec<String> = seeded.iter().map(ToString::to_string).collect();
                println!("Seeded {}", names.join(", "));
            }
        }
        Command::Proxy { .. } | Command::SampleConfig => {}
    }
    Ok(())
}

/// Print one list and exit.
async fn run_batch(app: &mut App, format: export::ExportFormat) -> Result<()> {
    if app.active == ListId::Starred {
        // Starred rows only change by absorbing fresh rows from the other lists.
        let refreshes = ListId::STORED.into_iter().map(|id| app.board.refresh(id));
        for (id, result) in ListId::STORED.into_iter().zip(futures::future::join_all(refreshes).await) {
            if let Err(e) = result {
                tracing::warn!(list = %id, error = %e, "refresh failed");
            }
        }
    }
    app.refresh_active().await;
    if let Some(ref error) = app.error {
        bail!("{}", error);
    }
    ui::render_batch(app.active.title(), &app.visible_rows(), format);
    Ok(())
}

/// Run in interactive mode with TUI.
async fn run_interactive(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Work a key press asks for that has to wait on the network.
enum Action {
    None,
    Refresh,
    Add(String),
}

/// Main application loop.
async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut pending = Action::Refresh;

    loop {
        match std::mem::replace(&mut pending, Action::None) {
            Action::None => {}
            Action::Refresh => {
                app.loading = true;
                terminal.draw(|f| ui::render(f, app))?;
                app.refresh_active().await;
            }
            Action::Add(raw) => {
                app.loading = true;
                terminal.draw(|f| ui::render(f, app))?;
                app.add_symbol(&raw).await;
            }
        }

        app.drain_events();
        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    pending = handle_key_event(app, key.code, key.modifiers);
                }
            }
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// Handle keyboard input.
fn handle_key_event(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Action {
    if let Some(input) = app.input.as_mut() {
        match code {
            KeyCode::Enter => {
                let raw = std::mem::take(input);
                app.input = None;
                return Action::Add(raw);
            }
            KeyCode::Esc => app.input = None,
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) if !c.is_whitespace() => input.push(c),
            _ => {}
        }
        return Action::None;
    }

    // Close help overlay on any key
    if app.show_help {
        app.show_help = false;
        return Action::None;
    }

    // Any key dismisses an error; R also retries
    if app.error.is_some() {
        app.error = None;
        return match code {
            KeyCode::Char('R') => Action::Refresh,
            _ => Action::None,
        };
    }

    app.status = None;

    match code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => app.quit(),

        // Navigation
        KeyCode::Up | KeyCode::Char('k') => app.select_up(),
        KeyCode::Down | KeyCode::Char('j') => app.select_down(),
        KeyCode::Home | KeyCode::Char('g') => app.select_top(),
        KeyCode::End | KeyCode::Char('G') => app.select_bottom(),
        KeyCode::PageUp => {
            for _ in 0..10 {
                app.select_up();
            }
        }
        KeyCode::PageDown => {
            for _ in 0..10 {
                app.select_down();
            }
        }

        // Lists
        KeyCode::Tab | KeyCode::Right => {
            app.next_list();
            return refresh_if_unloaded(app);
        }
        KeyCode::Char(c @ '1'..='5') => {
            let idx = c as usize - '1' as usize;
            app.select_list(ListId::ALL[idx]);
            return refresh_if_unloaded(app);
        }

        // Sorting
        KeyCode::Char('s') => app.next_sort_key(),
        KeyCode::Char('r') => app.toggle_sort_direction(),
        KeyCode::F(1) => app.set_sort_key(SortKey::Symbol),
        KeyCode::F(2) => app.set_sort_key(SortKey::Perf1d),
        KeyCode::F(3) => app.set_sort_key(SortKey::Perf5d),
        KeyCode::F(4) => app.set_sort_key(SortKey::Perf20d),
        KeyCode::F(5) => app.set_sort_key(SortKey::Perf60d),
        KeyCode::F(6) => app.set_sort_key(SortKey::Rsi14),

        // Editing
        KeyCode::Char('a') if !app.active.is_server_determined() => app.input = Some(String::new()),
        KeyCode::Char('d') | KeyCode::Delete => app.remove_selected(),
        KeyCode::Char('*') | KeyCode::Char(' ') => app.toggle_star_selected(),

        KeyCode::Char('R') => return Action::Refresh,
        KeyCode::Char('h') | KeyCode::Char('?') => app.toggle_help(),

        _ => {}
    }
    Action::None
}

/// Fetch a list the first time it is shown without cached rows.
fn refresh_if_unloaded(app: &App) -> Action {
    if app.fetched_at().is_none() && app.active != ListId::Starred {
        Action::Refresh
    } else {
        Action::None
    }
}
