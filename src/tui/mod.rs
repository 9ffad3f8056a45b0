//! Terminal User Interface (TUI) for unused
//!
//! This module provides an interactive session for browsing unused disks per
//! provider and deleting them. It uses the ratatui library for drawing and a
//! single update loop fed by one channel: key presses forwarded from a
//! blocking reader thread, and completions of background listing and
//! deletion tasks.

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, prelude::Backend, Terminal};
use std::io;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::Result;
use crate::provider::ProviderHandle;

mod app;
mod ui;

pub use app::{App, Command, DeleteStatus, Message, Screen, ViewOptions};

/// Run the interactive session until the user quits
pub async fn run(providers: Vec<ProviderHandle>, options: ViewOptions) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_key_reader(tx.clone());

    let mut app = App::new(providers, options);
    let res = run_app(&mut terminal, &mut app, tx, rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// Forward key presses into the update loop
///
/// crossterm reads block, so this runs on its own OS thread and stops once
/// the loop has dropped its receiver.
fn spawn_key_reader(tx: UnboundedSender<Message>) {
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                if tx.send(Message::Key(key)).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("reading terminal events: {}", e);
                return;
            }
        }
    });
}

/// Main application loop
async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    tx: UnboundedSender<Message>,
    mut rx: UnboundedReceiver<Message>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let Some(message) = rx.recv().await else {
            return Ok(());
        };
        if let Some(command) = app.update(message) {
            if !execute_command(command, &tx) {
                return Ok(());
            }
        }
    }
}

/// Start the side effect of `command`; returns false on quit
///
/// Results come back to the loop as messages.
pub fn execute_command(command: Command, tx: &UnboundedSender<Message>) -> bool {
    match command {
        Command::FetchDisks { provider, handle } => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = handle.list_unused_disks().await;
                // The loop may already be gone when the user quit meanwhile.
                let _ = tx.send(Message::DisksFetched { provider, result });
            });
            true
        }
        Command::DeleteDisk {
            provider,
            handle,
            disk,
        } => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = handle.delete(disk.as_ref()).await;
                let _ = tx.send(Message::DiskDeleted {
                    provider,
                    disk_id: disk.id().to_string(),
                    result,
                });
            });
            true
        }
        Command::Quit => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::{FakeDisk, FakeProvider};
    use crossterm::event::{KeyCode, KeyEvent};
    use std::sync::Arc;

    /// Feed messages through `app`, running commands until `rx` goes quiet
    async fn drive(app: &mut App, keys: &[KeyCode]) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for code in keys {
            tx.send(Message::Key(KeyEvent::from(*code))).unwrap();
            // Settle background work before the next key.
            while let Ok(Some(message)) =
                tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await
            {
                if let Some(command) = app.update(message) {
                    execute_command(command, &tx);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_delete_flow_against_fake_provider() {
        let fake = FakeProvider::named("GCP", "proj");
        let disks = vec![FakeDisk::new(&fake, "a"), FakeDisk::new(&fake, "b")];
        let fake = Arc::new(fake.with_disks(disks).failing_delete("a"));
        let handle: ProviderHandle = fake.clone();

        let mut app = App::new(vec![handle], ViewOptions::default());
        drive(
            &mut app,
            &[
                KeyCode::Enter,
                KeyCode::Char('a'),
                KeyCode::Char('d'),
                KeyCode::Char('y'),
            ],
        )
        .await;

        assert_eq!(fake.deleted(), vec!["b".to_string()]);
        match &app.screen {
            Screen::DeletingDisks(session) => {
                assert!(session.is_done());
                assert_eq!(session.failed(), 1);
            }
            other => panic!("unexpected screen {:?}", other),
        }

        drive(&mut app, &[KeyCode::Enter]).await;
        assert!(matches!(app.screen, Screen::ProviderView { provider: 0 }));
        assert_eq!(fake.list_calls(), 2);
    }

    #[test]
    fn test_quit_stops_loop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!execute_command(Command::Quit, &tx));
    }
}
