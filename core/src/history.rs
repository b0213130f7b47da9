//! Navigation history.
//!
//! Two backends sit behind the [`History`] trait:
//!
//! - [`MemoryHistory`]: a closed stack used for server-side rendering. It is
//!   seeded with the requested path and never sees outside navigation.
//! - [`BrowserHistory`]: a view over a live [`NavigationBackend`] supplied by
//!   the host (the browser's own history binding).
//!
//! [`create_history`] picks one from a resolved [`EnvironmentMode`].

use crate::environment::EnvironmentMode;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors raised by history backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Browser mode was requested but the host offers no navigation binding
    #[error("Browser navigation backend is unavailable")]
    BackendUnavailable,

    /// The underlying navigation subsystem rejected an operation
    #[error("Navigation failed: {0}")]
    Navigation(String),
}

/// A single navigation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Path component, always starting with `/`
    pub pathname: String,
    /// Query string including the leading `?`, or empty
    pub search: String,
    /// Fragment including the leading `#`, or empty
    pub hash: String,
    /// Random key identifying this entry within its stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Location {
    /// Split a path into pathname, search, and hash.
    ///
    /// A lone `?` or `#` is dropped, an empty pathname becomes `/` and a
    /// relative one is taken from the root.
    ///
    /// ```
    /// use isostate_core::Location;
    ///
    /// let location = Location::parse("/search?q=rust#top");
    /// assert_eq!(location.pathname, "/search");
    /// assert_eq!(location.search, "?q=rust");
    /// assert_eq!(location.hash, "#top");
    /// ```
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let mut location = Self::split(path);
        if !location.pathname.starts_with('/') {
            location.pathname.insert(0, '/');
        }
        location
    }

    fn split(path: &str) -> Self {
        let (rest, hash) = match path.find('#') {
            Some(idx) => (&path[..idx], &path[idx..]),
            None => (path, ""),
        };
        let (pathname, search) = match rest.find('?') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        Self {
            pathname: pathname.to_string(),
            search: if search == "?" { String::new() } else { search.to_string() },
            hash: if hash == "#" { String::new() } else { hash.to_string() },
            key: None,
        }
    }

    /// Resolve `path` against `current`.
    ///
    /// An empty pathname keeps the current one (`"?page=2"` only changes the
    /// query), and a relative pathname is joined to the current directory.
    #[must_use]
    pub fn resolve(path: &str, current: &Self) -> Self {
        let mut location = Self::split(path);

        if location.pathname.is_empty() {
            location.pathname.clone_from(&current.pathname);
            if location.search.is_empty() && location.hash.is_empty() {
                location.search.clone_from(&current.search);
            }
        } else if !location.pathname.starts_with('/') {
            location.pathname = join_relative(&current.pathname, &location.pathname);
        }

        location
    }

    /// Attach an entry key
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Pathname, search, and hash joined back together
    #[must_use]
    pub fn href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

fn join_relative(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    if !base.ends_with('/') {
        segments.pop();
    }

    for segment in relative.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other),
        }
    }

    let mut joined = format!("/{}", segments.join("/"));
    if relative.ends_with('/') && joined.len() > 1 {
        joined.push('/');
    }
    joined
}

fn create_key() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// How the current entry was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NavigationKind {
    /// Initial entry or a move through the stack
    Pop,
    /// A new entry was appended
    Push,
    /// The current entry was overwritten
    Replace,
}

/// Notification delivered to history listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationChange {
    /// The new current location
    pub location: Location,
    /// How it was reached
    pub kind: NavigationKind,
}

/// Callback invoked after the history moved
pub type HistoryListener = Arc<dyn Fn(&LocationChange) + Send + Sync>;

/// Handle returned by [`History::listen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered navigation entries with a current position.
///
/// Listeners are called after internal locks are released, so a listener
/// may read the history or dispatch into a store.
pub trait History: Send + Sync {
    /// The current entry
    fn location(&self) -> Location;

    /// How the current entry was reached
    fn action(&self) -> NavigationKind;

    /// Number of entries in the stack
    fn length(&self) -> usize;

    /// All entries, for backends that own their stack.
    ///
    /// Live browser backends return `None`.
    fn entries(&self) -> Option<Vec<Location>>;

    /// Append an entry and make it current.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Navigation`] if the backend rejects the move.
    fn push(&self, path: &str) -> Result<(), HistoryError>;

    /// Overwrite the current entry.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Navigation`] if the backend rejects the move.
    fn replace(&self, path: &str) -> Result<(), HistoryError>;

    /// Move by `delta` entries.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Navigation`] if the backend rejects the move.
    fn go(&self, delta: isize) -> Result<(), HistoryError>;

    /// Move one entry back.
    ///
    /// # Errors
    ///
    /// See [`History::go`].
    fn back(&self) -> Result<(), HistoryError> {
        self.go(-1)
    }

    /// Move one entry forward.
    ///
    /// # Errors
    ///
    /// See [`History::go`].
    fn forward(&self) -> Result<(), HistoryError> {
        self.go(1)
    }

    /// Register a listener
    fn listen(&self, listener: HistoryListener) -> ListenerId;

    /// Remove a listener, returning whether it was registered
    fn unlisten(&self, id: ListenerId) -> bool;
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, HistoryListener)>>,
}

impl Listeners {
    fn add(&self, listener: HistoryListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    fn notify(&self, change: &LocationChange) {
        let snapshot: Vec<HistoryListener> =
            self.entries.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            listener(change);
        }
    }
}

struct MemoryStack {
    entries: Vec<Location>,
    index: usize,
    action: NavigationKind,
}

/// In-memory history for server-side rendering.
///
/// Owned by the store built for one request and discarded with it.
pub struct MemoryHistory {
    stack: Mutex<MemoryStack>,
    listeners: Listeners,
}

impl MemoryHistory {
    /// Create a history seeded with exactly one entry.
    ///
    /// An empty path is treated as `/`.
    #[must_use]
    pub fn new(initial_path: &str) -> Self {
        Self::with_entries(&[initial_path], 0)
    }

    /// Create a history seeded with several entries.
    ///
    /// `initial_index` is clamped to the stack; an empty list seeds `/`.
    #[must_use]
    pub fn with_entries(paths: &[&str], initial_index: usize) -> Self {
        let mut entries: Vec<Location> = paths
            .iter()
            .map(|path| Location::parse(path).with_key(create_key()))
            .collect();
        if entries.is_empty() {
            entries.push(Location::parse("/").with_key(create_key()));
        }
        let index = initial_index.min(entries.len() - 1);

        Self {
            stack: Mutex::new(MemoryStack {
                entries,
                index,
                action: NavigationKind::Pop,
            }),
            listeners: Listeners::default(),
        }
    }

    /// Index of the current entry
    #[must_use]
    pub fn index(&self) -> usize {
        self.stack.lock().index
    }

    /// Check if moving by `delta` stays inside the stack
    #[must_use]
    pub fn can_go(&self, delta: isize) -> bool {
        let stack = self.stack.lock();
        stack
            .index
            .checked_add_signed(delta)
            .is_some_and(|target| target < stack.entries.len())
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let stack = self.stack.lock();
        stack.entries[stack.index].clone()
    }

    fn action(&self) -> NavigationKind {
        self.stack.lock().action
    }

    fn length(&self) -> usize {
        self.stack.lock().entries.len()
    }

    fn entries(&self) -> Option<Vec<Location>> {
        Some(self.stack.lock().entries.clone())
    }

    fn push(&self, path: &str) -> Result<(), HistoryError> {
        let change = {
            let mut stack = self.stack.lock();
            let location =
                Location::resolve(path, &stack.entries[stack.index]).with_key(create_key());
            let next = stack.index + 1;
            stack.entries.truncate(next);
            stack.entries.push(location.clone());
            stack.index = next;
            stack.action = NavigationKind::Push;
            LocationChange {
                location,
                kind: NavigationKind::Push,
            }
        };

        tracing::trace!(href = %change.location.href(), "Memory history push");
        self.listeners.notify(&change);
        Ok(())
    }

    fn replace(&self, path: &str) -> Result<(), HistoryError> {
        let change = {
            let mut stack = self.stack.lock();
            let index = stack.index;
            let location = Location::resolve(path, &stack.entries[index]).with_key(create_key());
            stack.entries[index] = location.clone();
            stack.action = NavigationKind::Replace;
            LocationChange {
                location,
                kind: NavigationKind::Replace,
            }
        };

        tracing::trace!(href = %change.location.href(), "Memory history replace");
        self.listeners.notify(&change);
        Ok(())
    }

    fn go(&self, delta: isize) -> Result<(), HistoryError> {
        let change = {
            let mut stack = self.stack.lock();
            let last = stack.entries.len() - 1;
            let target = stack.index.saturating_add_signed(delta).min(last);
            if target == stack.index {
                return Ok(());
            }
            stack.index = target;
            stack.action = NavigationKind::Pop;
            LocationChange {
                location: stack.entries[target].clone(),
                kind: NavigationKind::Pop,
            }
        };

        tracing::trace!(delta, href = %change.location.href(), "Memory history go");
        self.listeners.notify(&change);
        Ok(())
    }

    fn listen(&self, listener: HistoryListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Callback a [`NavigationBackend`] invokes when the user moves through
/// the browser's own history (back/forward buttons).
pub type PopCallback = Box<dyn Fn(Location) + Send + Sync>;

/// The host's live navigation mechanism.
///
/// Implemented by the browser binding of the surrounding application; tests
/// use an in-process fake.
pub trait NavigationBackend: Send + Sync {
    /// The location the host is currently showing.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot report its location.
    fn current(&self) -> Result<Location, HistoryError>;

    /// Append an entry to the host history.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the entry.
    fn push_state(&self, location: &Location) -> Result<(), HistoryError>;

    /// Overwrite the current host entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the entry.
    fn replace_state(&self, location: &Location) -> Result<(), HistoryError>;

    /// Ask the host to move by `delta`; completion arrives through `on_pop`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the move.
    fn go(&self, delta: isize) -> Result<(), HistoryError>;

    /// Number of entries in the host history
    fn length(&self) -> usize;

    /// Register the pop callback
    fn on_pop(&self, callback: PopCallback);
}

struct BrowserShared {
    current: Mutex<(Location, NavigationKind)>,
    listeners: Listeners,
}

impl BrowserShared {
    fn record(&self, location: Location, kind: NavigationKind) {
        *self.current.lock() = (location.clone(), kind);
        self.listeners.notify(&LocationChange { location, kind });
    }
}

/// History bound to the host browser.
pub struct BrowserHistory {
    backend: Arc<dyn NavigationBackend>,
    shared: Arc<BrowserShared>,
}

impl BrowserHistory {
    /// Bind to a navigation backend, reading its current location.
    ///
    /// # Errors
    ///
    /// Propagates failures from the backend; these are fatal to store construction.
    pub fn new(backend: Arc<dyn NavigationBackend>) -> Result<Self, HistoryError> {
        let mut location = backend.current()?;
        if location.key.is_none() {
            location.key = Some(create_key());
        }

        let shared = Arc::new(BrowserShared {
            current: Mutex::new((location, NavigationKind::Pop)),
            listeners: Listeners::default(),
        });

        let on_pop = Arc::clone(&shared);
        backend.on_pop(Box::new(move |location| {
            tracing::trace!(href = %location.href(), "Browser history pop");
            on_pop.record(location, NavigationKind::Pop);
        }));

        Ok(Self { backend, shared })
    }
}

impl History for BrowserHistory {
    fn location(&self) -> Location {
        self.shared.current.lock().0.clone()
    }

    fn action(&self) -> NavigationKind {
        self.shared.current.lock().1
    }

    fn length(&self) -> usize {
        self.backend.length()
    }

    fn entries(&self) -> Option<Vec<Location>> {
        None
    }

    fn push(&self, path: &str) -> Result<(), HistoryError> {
        let location = Location::resolve(path, &self.location()).with_key(create_key());
        self.backend.push_state(&location)?;
        self.shared.record(location, NavigationKind::Push);
        Ok(())
    }

    fn replace(&self, path: &str) -> Result<(), HistoryError> {
        let location = Location::resolve(path, &self.location()).with_key(create_key());
        self.backend.replace_state(&location)?;
        self.shared.record(location, NavigationKind::Replace);
        Ok(())
    }

    fn go(&self, delta: isize) -> Result<(), HistoryError> {
        self.backend.go(delta)
    }

    fn listen(&self, listener: HistoryListener) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }
}

/// Build the history for `mode`.
///
/// - `Server`: a [`MemoryHistory`] holding only `initial_path` (`/` if empty)
/// - `Browser`: a [`BrowserHistory`] over `backend`; `initial_path` is
///   ignored because the host supplies the current location
///
/// # Errors
///
/// Returns [`HistoryError::BackendUnavailable`] in browser mode without a
/// backend, or propagates the backend's own failure.
pub fn create_history(
    mode: EnvironmentMode,
    initial_path: &str,
    backend: Option<Arc<dyn NavigationBackend>>,
) -> Result<Arc<dyn History>, HistoryError> {
    match mode {
        EnvironmentMode::Server => {
            tracing::debug!(initial_path, "Creating memory history");
            Ok(Arc::new(MemoryHistory::new(initial_path)))
        },
        EnvironmentMode::Browser => {
            let backend = backend.ok_or(HistoryError::BackendUnavailable)?;
            tracing::debug!("Creating browser history");
            Ok(Arc::new(BrowserHistory::new(backend)?))
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_parse_splits_components() {
        let location = Location::parse("/a/b?x=1#frag");
        assert_eq!(location.pathname, "/a/b");
        assert_eq!(location.search, "?x=1");
        assert_eq!(location.hash, "#frag");

        let bare = Location::parse("");
        assert_eq!(bare.pathname, "/");
        assert_eq!(Location::parse("/?#").href(), "/");
    }

    #[test]
    fn test_parse_roots_relative_paths() {
        assert_eq!(Location::parse("orders").pathname, "/orders");
        assert_eq!(Location::parse("?page=2").href(), "/?page=2");

        let history = MemoryHistory::new("orders/17#top");
        assert_eq!(history.location().href(), "/orders/17#top");
    }

    #[test]
    fn test_resolve_relative_and_query_only() {
        let current = Location::parse("/orders/17?tab=items");

        assert_eq!(Location::resolve("?tab=notes", &current).href(), "/orders/17?tab=notes");
        assert_eq!(Location::resolve("18", &current).href(), "/orders/18");
        assert_eq!(Location::resolve("../users", &current).href(), "/users");
        assert_eq!(Location::resolve("/root", &current).href(), "/root");
    }

    #[test]
    fn test_memory_push_truncates_forward_entries() {
        let history = MemoryHistory::new("/");
        history.push("/a").unwrap();
        history.push("/b").unwrap();
        history.back().unwrap();
        assert_eq!(history.location().pathname, "/a");

        history.push("/c").unwrap();
        let paths: Vec<String> =
            history.entries().unwrap().into_iter().map(|l| l.pathname).collect();
        assert_eq!(paths, vec!["/", "/a", "/c"]);
        assert_eq!(history.action(), NavigationKind::Push);
    }

    #[test]
    fn test_memory_go_clamps_and_skips_noop() {
        let history = MemoryHistory::with_entries(&["/one", "/two", "/three"], 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        history.listen(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        history.go(10).unwrap();
        assert_eq!(history.index(), 2);
        history.go(1).unwrap();
        history.go(-10).unwrap();
        assert_eq!(history.index(), 0);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(history.can_go(2));
        assert!(!history.can_go(-1));
    }

    #[test]
    fn test_unlisten_stops_notifications() {
        let history = MemoryHistory::new("/");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = history.listen(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        history.push("/x").unwrap();
        assert!(history.unlisten(id));
        history.push("/y").unwrap();
        assert!(!history.unlisten(id));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_read_history() {
        let history = Arc::new(MemoryHistory::new("/"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = Arc::clone(&history);
        let sink = Arc::clone(&seen);
        history.listen(Arc::new(move |change| {
            sink.lock().push((change.location.pathname.clone(), reader.length()));
        }));

        history.push("/next").unwrap();
        assert_eq!(*seen.lock(), vec![("/next".to_string(), 2)]);
    }

    #[test]
    fn test_browser_mode_requires_backend() {
        let result = create_history(EnvironmentMode::Browser, "/", None);
        assert!(matches!(result, Err(HistoryError::BackendUnavailable)));
    }

    proptest! {
        #[test]
        fn prop_server_history_holds_only_initial_path(
            path in "/[a-z0-9/_-]{0,24}(\\?[a-z0-9=&]{1,12})?(#[a-z0-9]{1,8})?"
        ) {
            let history = create_history(EnvironmentMode::Server, &path, None).unwrap();
            let entries = history.entries().unwrap();

            prop_assert_eq!(entries.len(), 1);
            prop_assert_eq!(entries[0].href(), path);
            prop_assert_eq!(history.location().href(), entries[0].href());
        }
    }

    #[test]
    fn test_server_history_default_path() {
        let history = create_history(EnvironmentMode::Server, "", None).unwrap();
        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href(), "/");
    }
}
