//! Application state management
//!
//! The interactive session is a state machine driven by [`Message`]s. Key
//! presses and background completions both arrive through [`App::update`],
//! which mutates state and returns at most one [`Command`] for the event
//! loop to run. Background work never touches `App` directly.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::disks::{Disks, SortKey};
use crate::error::Result;
use crate::filter::Filter;
use crate::provider::{DiskRef, ProviderHandle};

/// How fetched disk lists are narrowed and ordered before display
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub filter: Option<Filter>,
    pub sort: SortKey,
    pub extra_columns: Vec<String>,
    pub verbose: bool,
}

/// Input to the state machine
#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    DisksFetched {
        provider: usize,
        result: Result<Disks>,
    },
    DiskDeleted {
        provider: usize,
        disk_id: String,
        result: Result<()>,
    },
}

/// Side effect requested by the state machine
#[derive(Debug)]
pub enum Command {
    FetchDisks {
        provider: usize,
        handle: ProviderHandle,
    },
    DeleteDisk {
        provider: usize,
        handle: ProviderHandle,
        disk: DiskRef,
    },
    Quit,
}

/// Progress of one disk in a deletion session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteStatus {
    Pending,
    Deleting,
    Deleted,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DeleteItem {
    pub disk: DiskRef,
    pub status: DeleteStatus,
}

/// Disks queued for deletion from one provider
#[derive(Debug, Clone)]
pub struct DeleteSession {
    pub provider: usize,
    pub items: Vec<DeleteItem>,
    /// No deletion call is issued before the user confirms
    pub confirmed: bool,
}

impl DeleteSession {
    fn in_flight(&self) -> bool {
        self.items.iter().any(|i| i.status == DeleteStatus::Deleting)
    }

    fn next_pending(&mut self) -> Option<&mut DeleteItem> {
        self.items
            .iter_mut()
            .find(|i| i.status == DeleteStatus::Pending)
    }

    /// Every disk has a final status
    pub fn is_done(&self) -> bool {
        self.confirmed
            && self
                .items
                .iter()
                .all(|i| matches!(i.status, DeleteStatus::Deleted | DeleteStatus::Failed(_)))
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, DeleteStatus::Failed(_)))
            .count()
    }
}

/// Current screen
#[derive(Debug, Clone)]
pub enum Screen {
    ProviderList,
    FetchingDisks { provider: usize },
    ProviderView { provider: usize },
    DeletingDisks(DeleteSession),
}

/// Main application state
#[derive(Debug)]
pub struct App {
    pub providers: Vec<ProviderHandle>,
    pub options: ViewOptions,
    pub screen: Screen,
    /// Selected row in the provider list
    pub provider_cursor: usize,
    /// Selected row in the disk list
    pub disk_cursor: usize,
    /// IDs of disks marked for deletion in the current provider view
    pub marked: BTreeSet<String>,
    /// Disk lists cached for the session, by provider index
    pub cache: HashMap<usize, Disks>,
    /// Shown in place of the current screen until dismissed
    pub error: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(providers: Vec<ProviderHandle>, options: ViewOptions) -> Self {
        Self {
            providers,
            options,
            screen: Screen::ProviderList,
            provider_cursor: 0,
            disk_cursor: 0,
            marked: BTreeSet::new(),
            cache: HashMap::new(),
            error: None,
            should_quit: false,
        }
    }

    /// Disks of the provider being viewed or deleted from
    pub fn current_disks(&self) -> Option<&Disks> {
        let provider = match &self.screen {
            Screen::ProviderView { provider } => *provider,
            Screen::DeletingDisks(session) => session.provider,
            _ => return None,
        };
        self.cache.get(&provider)
    }

    /// Apply one message and return the side effect it requires
    pub fn update(&mut self, message: Message) -> Option<Command> {
        match message {
            Message::Key(key) => self.on_key(key),
            Message::DisksFetched { provider, result } => self.on_fetched(provider, result),
            Message::DiskDeleted {
                provider,
                disk_id,
                result,
            } => self.on_deleted(provider, &disk_id, result),
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return self.quit();
        }
        if self.error.is_some() {
            self.error = None;
            return None;
        }

        match self.screen.clone() {
            Screen::ProviderList => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.quit(),
                KeyCode::Up | KeyCode::Char('k') => {
                    self.provider_cursor = self.provider_cursor.saturating_sub(1);
                    None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if self.provider_cursor + 1 < self.providers.len() {
                        self.provider_cursor += 1;
                    }
                    None
                }
                KeyCode::Enter | KeyCode::Right => self.open_provider(self.provider_cursor),
                _ => None,
            },
            Screen::FetchingDisks { .. } => match key.code {
                KeyCode::Char('q') => self.quit(),
                // A listing still in flight is dropped when it arrives.
                KeyCode::Esc => {
                    self.screen = Screen::ProviderList;
                    None
                }
                _ => None,
            },
            Screen::ProviderView { provider } => self.on_view_key(provider, key.code),
            Screen::DeletingDisks(session) => self.on_delete_key(session, key.code),
        }
    }

    fn on_view_key(&mut self, provider: usize, code: KeyCode) -> Option<Command> {
        let count = self.cache.get(&provider).map(Disks::len).unwrap_or(0);
        match code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Esc | KeyCode::Left | KeyCode::Backspace => {
                self.marked.clear();
                self.screen = Screen::ProviderList;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.disk_cursor = self.disk_cursor.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.disk_cursor + 1 < count {
                    self.disk_cursor += 1;
                }
                None
            }
            KeyCode::Char(' ') => {
                if let Some(disk) = self.cache.get(&provider).and_then(|d| d.get(self.disk_cursor)) {
                    let id = disk.id().to_string();
                    if !self.marked.remove(&id) {
                        self.marked.insert(id);
                    }
                }
                None
            }
            KeyCode::Char('a') => {
                let all: BTreeSet<String> = self
                    .cache
                    .get(&provider)
                    .map(|d| d.iter().map(|disk| disk.id().to_string()).collect())
                    .unwrap_or_default();
                if self.marked == all {
                    self.marked.clear();
                } else {
                    self.marked = all;
                }
                None
            }
            KeyCode::Char('r') => self.refresh(provider),
            KeyCode::Char('d') | KeyCode::Char('x') | KeyCode::Delete => {
                self.start_delete(provider);
                None
            }
            _ => None,
        }
    }

    fn on_delete_key(&mut self, mut session: DeleteSession, code: KeyCode) -> Option<Command> {
        let provider = session.provider;
        if session.is_done() {
            return match code {
                KeyCode::Char('q') => self.quit(),
                _ => self.refresh(provider),
            };
        }

        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') if !session.confirmed => {
                session.confirmed = true;
                log::info!(
                    "deleting {} disks from {}",
                    session.items.len(),
                    self.providers[provider].info()
                );
                let command = self.next_delete(&mut session);
                self.screen = Screen::DeletingDisks(session);
                command
            }
            KeyCode::Char('n') | KeyCode::Esc | KeyCode::Char('q') => {
                // Remaining disks are skipped; an in-flight call still completes.
                self.refresh(provider)
            }
            _ => None,
        }
    }

    fn on_fetched(&mut self, provider: usize, result: Result<Disks>) -> Option<Command> {
        let waiting = matches!(self.screen, Screen::FetchingDisks { provider: p } if p == provider);
        if !waiting {
            log::debug!("dropping stale listing for provider {}", provider);
            return None;
        }

        match result {
            Ok(disks) => {
                let mut disks = match &self.options.filter {
                    Some(filter) => disks.filter(|d| filter.matches(d.as_ref())),
                    None => disks,
                };
                disks.sort(self.options.sort);
                self.cache.insert(provider, disks);
                self.disk_cursor = 0;
                self.marked.clear();
                self.screen = Screen::ProviderView { provider };
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.screen = Screen::ProviderList;
            }
        }
        None
    }

    fn on_deleted(&mut self, provider: usize, disk_id: &str, result: Result<()>) -> Option<Command> {
        let Screen::DeletingDisks(mut session) = self.screen.clone() else {
            log::debug!("deletion of {} finished after the session ended", disk_id);
            return None;
        };
        if session.provider != provider {
            return None;
        }

        if let Some(item) = session
            .items
            .iter_mut()
            .find(|i| i.status == DeleteStatus::Deleting && i.disk.id() == disk_id)
        {
            item.status = match result {
                Ok(()) => DeleteStatus::Deleted,
                Err(e) => {
                    log::warn!("{}", e);
                    DeleteStatus::Failed(e.to_string())
                }
            };
        }

        let command = self.next_delete(&mut session);
        self.screen = Screen::DeletingDisks(session);
        command
    }

    fn next_delete(&self, session: &mut DeleteSession) -> Option<Command> {
        if session.in_flight() {
            return None;
        }
        let provider = session.provider;
        let item = session.next_pending()?;
        item.status = DeleteStatus::Deleting;
        Some(Command::DeleteDisk {
            provider,
            handle: Arc::clone(&self.providers[provider]),
            disk: Arc::clone(&item.disk),
        })
    }

    fn start_delete(&mut self, provider: usize) {
        let Some(disks) = self.cache.get(&provider) else {
            return;
        };

        let selected: Vec<DiskRef> = if self.marked.is_empty() {
            disks.get(self.disk_cursor).cloned().into_iter().collect()
        } else {
            disks
                .iter()
                .filter(|d| self.marked.contains(d.id()))
                .cloned()
                .collect()
        };
        if selected.is_empty() {
            return;
        }

        self.screen = Screen::DeletingDisks(DeleteSession {
            provider,
            items: selected
                .into_iter()
                .map(|disk| DeleteItem {
                    disk,
                    status: DeleteStatus::Pending,
                })
                .collect(),
            confirmed: false,
        });
    }

    fn open_provider(&mut self, provider: usize) -> Option<Command> {
        if provider >= self.providers.len() {
            return None;
        }
        if self.cache.contains_key(&provider) {
            self.disk_cursor = 0;
            self.marked.clear();
            self.screen = Screen::ProviderView { provider };
            return None;
        }
        self.fetch(provider)
    }

    /// Discard the cached list of `provider` and fetch it again
    fn refresh(&mut self, provider: usize) -> Option<Command> {
        self.cache.remove(&provider);
        self.marked.clear();
        self.fetch(provider)
    }

    fn fetch(&mut self, provider: usize) -> Option<Command> {
        self.screen = Screen::FetchingDisks { provider };
        Some(Command::FetchDisks {
            provider,
            handle: Arc::clone(&self.providers[provider]),
        })
    }

    fn quit(&mut self) -> Option<Command> {
        self.should_quit = true;
        Some(Command::Quit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::meta::Meta;
    use crate::provider::fake::{FakeDisk, FakeProvider};

    fn key(code: KeyCode) -> Message {
        Message::Key(KeyEvent::from(code))
    }

    fn disks_of(provider: &FakeProvider, names: &[&str]) -> Disks {
        names
            .iter()
            .map(|n| Arc::new(FakeDisk::new(provider, n)) as DiskRef)
            .collect()
    }

    fn app_with_disks(names: &[&str]) -> App {
        let provider = FakeProvider::named("AWS", "prod");
        let disks = disks_of(&provider, names);
        let mut app = App::new(vec![Arc::new(provider)], ViewOptions::default());

        assert!(matches!(
            app.update(key(KeyCode::Enter)),
            Some(Command::FetchDisks { provider: 0, .. })
        ));
        assert!(matches!(app.screen, Screen::FetchingDisks { provider: 0 }));
        app.update(Message::DisksFetched {
            provider: 0,
            result: Ok(disks),
        });
        app
    }

    fn deleted_id(command: Option<Command>) -> String {
        match command {
            Some(Command::DeleteDisk { disk, .. }) => disk.id().to_string(),
            other => panic!("expected a deletion, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_then_view() {
        let app = app_with_disks(&["b", "a"]);
        assert!(matches!(app.screen, Screen::ProviderView { provider: 0 }));
        let names: Vec<&str> = app.current_disks().unwrap().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_cached_provider_is_not_refetched() {
        let mut app = app_with_disks(&["a"]);
        app.update(key(KeyCode::Esc));
        assert!(matches!(app.screen, Screen::ProviderList));
        assert!(app.update(key(KeyCode::Enter)).is_none());
        assert!(matches!(app.screen, Screen::ProviderView { provider: 0 }));

        assert!(matches!(
            app.update(key(KeyCode::Char('r'))),
            Some(Command::FetchDisks { .. })
        ));
        assert!(app.cache.is_empty());
    }

    #[test]
    fn test_fetch_error_is_shown_until_dismissed() {
        let provider: ProviderHandle = Arc::new(FakeProvider::named("GCP", "p"));
        let mut app = App::new(vec![provider], ViewOptions::default());
        app.update(key(KeyCode::Enter));
        app.update(Message::DisksFetched {
            provider: 0,
            result: Err(Error::Other("denied".to_string())),
        });

        assert_eq!(app.error.as_deref(), Some("denied"));
        assert!(matches!(app.screen, Screen::ProviderList));
        assert!(app.update(key(KeyCode::Char('q'))).is_none());
        assert!(app.error.is_none());
        assert!(!app.should_quit);
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut app = app_with_disks(&["a", "b"]);
        assert!(app.update(key(KeyCode::Char('d'))).is_none());
        match &app.screen {
            Screen::DeletingDisks(session) => {
                assert!(!session.confirmed);
                assert_eq!(session.items.len(), 1);
            }
            other => panic!("unexpected screen {:?}", other),
        }

        assert!(app.update(key(KeyCode::Enter)).is_none());
        assert!(matches!(
            app.update(key(KeyCode::Char('n'))),
            Some(Command::FetchDisks { provider: 0, .. })
        ));
        assert!(app.cache.is_empty());
    }

    #[test]
    fn test_sequential_deletion_continues_after_failure() {
        let mut app = app_with_disks(&["a", "b", "c"]);
        app.update(key(KeyCode::Char('a')));
        assert_eq!(app.marked.len(), 3);
        app.update(key(KeyCode::Char('d')));

        let first = deleted_id(app.update(key(KeyCode::Char('y'))));
        assert_eq!(first, "a");

        let second = deleted_id(app.update(Message::DiskDeleted {
            provider: 0,
            disk_id: first,
            result: Err(Error::Delete {
                disk: "a".to_string(),
                reason: "in use".to_string(),
            }),
        }));
        assert_eq!(second, "b");

        let third = deleted_id(app.update(Message::DiskDeleted {
            provider: 0,
            disk_id: second,
            result: Ok(()),
        }));
        assert_eq!(third, "c");

        assert!(app
            .update(Message::DiskDeleted {
                provider: 0,
                disk_id: third,
                result: Ok(()),
            })
            .is_none());

        match &app.screen {
            Screen::DeletingDisks(session) => {
                assert!(session.is_done());
                assert_eq!(session.failed(), 1);
            }
            other => panic!("unexpected screen {:?}", other),
        }

        assert!(matches!(
            app.update(key(KeyCode::Enter)),
            Some(Command::FetchDisks { provider: 0, .. })
        ));
        assert!(matches!(app.screen, Screen::FetchingDisks { provider: 0 }));
    }

    #[test]
    fn test_late_completion_after_cancel_is_ignored() {
        let mut app = app_with_disks(&["a", "b"]);
        app.update(key(KeyCode::Char(' ')));
        app.update(key(KeyCode::Char('d')));
        let id = deleted_id(app.update(key(KeyCode::Char('y'))));
        app.update(key(KeyCode::Esc));

        assert!(app
            .update(Message::DiskDeleted {
                provider: 0,
                disk_id: id,
                result: Ok(()),
            })
            .is_none());
        assert!(matches!(app.screen, Screen::FetchingDisks { provider: 0 }));
    }

    #[test]
    fn test_filter_applied_to_fetched_disks() {
        let provider = FakeProvider::named("Azure", "sub");
        let disks: Disks = [("keep", "x"), ("drop", "y")]
            .into_iter()
            .map(|(name, team)| {
                Arc::new(FakeDisk::new(&provider, name).meta(Meta::from_iter([("team", team)])))
                    as DiskRef
            })
            .collect();
        let options = ViewOptions {
            filter: Some(Filter::new("team", "x")),
            ..Default::default()
        };
        let mut app = App::new(vec![Arc::new(provider)], options);
        app.update(key(KeyCode::Enter));
        app.update(Message::DisksFetched {
            provider: 0,
            result: Ok(disks),
        });

        let shown = app.current_disks().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown.get(0).unwrap().name(), "keep");
        assert_eq!(app.providers[0].name(), "Azure");
    }

    #[test]
    fn test_escape_leaves_pending_fetch() {
        let provider: ProviderHandle = Arc::new(FakeProvider::named("GCP", "slow"));
        let mut app = App::new(vec![provider], ViewOptions::default());
        app.update(key(KeyCode::Enter));
        assert!(matches!(app.screen, Screen::FetchingDisks { provider: 0 }));

        assert!(app.update(key(KeyCode::Esc)).is_none());
        assert!(matches!(app.screen, Screen::ProviderList));
        assert!(!app.should_quit);

        app.update(Message::DisksFetched {
            provider: 0,
            result: Ok(Disks::new()),
        });
        assert!(matches!(app.screen, Screen::ProviderList));
        assert!(app.cache.is_empty());
    }

    #[test]
    fn test_delete_command_targets_session_provider() {
        let first = FakeProvider::named("AWS", "dev");
        let second = FakeProvider::named("AWS", "prod");
        let disks = disks_of(&second, &["x"]);
        let mut app = App::new(
            vec![Arc::new(first), Arc::new(second)],
            ViewOptions::default(),
        );
        app.update(key(KeyCode::Down));
        app.update(key(KeyCode::Enter));
        app.update(Message::DisksFetched {
            provider: 1,
            result: Ok(disks),
        });
        app.update(key(KeyCode::Char('d')));

        match app.update(key(KeyCode::Char('y'))) {
            Some(Command::DeleteDisk {
                provider,
                handle,
                disk,
            }) => {
                assert_eq!(provider, 1);
                assert_eq!(handle.id(), "prod");
                assert_eq!(disk.id(), "x");
            }
            other => panic!("expected a deletion, got {:?}", other),
        }
    }

    #[test]
    fn test_ctrl_c_quits_from_anywhere() {
        let mut app = app_with_disks(&["a"]);
        app.update(key(KeyCode::Char('d')));
        let command = app.update(Message::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert!(matches!(command, Some(Command::Quit)));
        assert!(app.should_quit);
    }
}
