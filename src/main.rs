use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::EnvFilter;

use cmux::{model::Session, paths::Paths, ui, view::SessionView, watcher::EventWatcher};

type Views = Arc<Mutex<BTreeMap<String, Arc<SessionView>>>>;

const TRANSCRIPT_POLL_INTERVAL: Duration = Duration::from_millis(300);

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Optional first arg overrides the events directory.
    let args: Vec<String> = std::env::args().collect();
    let paths = match args.get(1) {
        Some(dir) => Paths::with_events_dir(dir),
        None => Paths::resolve(),
    };

    let views: Views = Arc::new(Mutex::new(BTreeMap::new()));

    let mut watcher = EventWatcher::new(&paths.events_dir)
        .map_err(|e| color_eyre::eyre::eyre!("failed to open events directory: {e}"))?;
    {
        let views = Arc::clone(&views);
        watcher.on_event(move |name, hook_event| {
            let view = {
                let mut map = views.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(
                    map.entry(name.to_string())
                        .or_insert_with(|| Arc::new(SessionView::new(name))),
                )
            };
            view.update_from_hook_event(hook_event);
        });
    }
    watcher
        .start()
        .map_err(|e| color_eyre::eyre::eyre!("failed to start watcher: {e}"))?;

    // Transcripts arrive with their own latency; poll them on a timer
    // independent of the event stream.
    {
        let views = Arc::clone(&views);
        std::thread::spawn(move || loop {
            std::thread::sleep(TRANSCRIPT_POLL_INTERVAL);
            let snapshot: Vec<Arc<SessionView>> = views
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .cloned()
                .collect();
            for view in snapshot {
                if let Err(e) = view.poll_transcript() {
                    tracing::warn!(error = %e, "transcript poll failed");
                }
            }
        });
    }

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_event_loop(&mut terminal, &views);

    // Terminal cleanup always runs, even if the loop errored.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    watcher.stop();

    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    views: &Views,
) -> Result<()> {
    let mut force_render = true;

    loop {
        let snapshot: Vec<Arc<SessionView>> = views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        // Only redraw when something changed since the last frame.
        if force_render || snapshot.iter().any(|v| v.is_dirty()) {
            let sessions: Vec<Session> = snapshot.iter().map(|v| v.session().clone()).collect();
            terminal.draw(|frame| ui::render(frame, &sessions))?;
            for view in &snapshot {
                view.mark_clean();
            }
            force_render = false;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => force_render = true,
                }
            }
        }
    }

    Ok(())
}
