//! The session registry: single owner of every live connection's state.
//!
//! Topic membership is not stored anywhere else. "Who subscribes to T" is
//! answered by scanning sessions, so a topic exists exactly while some
//! session subscribes to it.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is a plain struct with no interior locking. The
//! broker owns it alongside the transfer table and game room, and the
//! server wraps all three in one mutex so routing always sees a consistent
//! snapshot.

use std::collections::{HashMap, HashSet};

use parley_protocol::Packet;
use parley_transport::{ConnectionId, TransportKind};

use crate::{Departed, PacketSender, PresenceStore, Session, SessionError, StoreError};

/// Tracks every live session and keeps the persisted presence lists in
/// step.
///
/// ## Lifecycle
///
/// ```text
/// on_connect() ──→ bind_username() ──→ subscribe()/unsubscribe()
///      │                 │
///      │                 ▼
///      │             logout() ──→ (anonymous again, still connected)
///      ▼
/// on_disconnect() ──→ [removed]
/// ```
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,

    /// Username → owning connection. Kept in sync with `sessions`.
    usernames: HashMap<String, ConnectionId>,

    store: Box<dyn PresenceStore>,
}

impl SessionRegistry {
    /// Creates an empty registry that mirrors presence into `store`.
    pub fn new(store: Box<dyn PresenceStore>) -> Self {
        Self {
            sessions: HashMap::new(),
            usernames: HashMap::new(),
            store,
        }
    }

    /// Truncates the persisted lists. Called once at startup.
    pub fn reset_store(&mut self) -> Result<(), StoreError> {
        self.store.reset()
    }

    /// Read access to the persisted lists.
    pub fn store(&self) -> &dyn PresenceStore {
        self.store.as_ref()
    }

    /// Registers a freshly accepted connection.
    pub fn on_connect(
        &mut self,
        id: ConnectionId,
        kind: TransportKind,
        outbound: PacketSender,
    ) -> ConnectionId {
        self.sessions.insert(id, Session::new(id, kind, outbound));
        tracing::debug!(%id, %kind, "session created");
        id
    }

    /// Removes a session and cleans its presence entries.
    ///
    /// Returns what the session held so the caller can release anything
    /// else tied to it. `None` if the session was already gone.
    pub fn on_disconnect(&mut self, id: ConnectionId) -> Option<Departed> {
        let session = self.sessions.remove(&id)?;
        let username = self.release_username(id, session.username);
        tracing::debug!(%id, ?username, "session removed");
        Some(Departed {
            id,
            username,
            topics: session.topics,
        })
    }

    /// Binds `name` to the session and marks it online.
    ///
    /// Logging in again under a different name releases the old one.
    /// Returns the previously bound name, if any.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — unknown connection
    /// - [`SessionError::MissingUsername`] — `name` is empty
    /// - [`SessionError::UsernameTaken`] — another connection holds `name`
    pub fn bind_username(
        &mut self,
        id: ConnectionId,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        if name.is_empty() {
            return Err(SessionError::MissingUsername);
        }
        if let Some(owner) = self.usernames.get(name) {
            if *owner != id {
                return Err(SessionError::UsernameTaken(name.to_string()));
            }
        }

        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if session.username == name {
            return Ok(None);
        }
        let previous = std::mem::replace(&mut session.username, name.to_string());
        let topics: Vec<String> = session.topics.iter().cloned().collect();

        let previous = self.release_username(id, previous);
        self.usernames.insert(name.to_string(), id);
        self.persist(|store| store.add_online(name));
        for topic in &topics {
            self.persist(|store| store.add_subscription(name, topic));
        }

        tracing::info!(%id, username = name, "user logged in");
        Ok(previous)
    }

    /// Unbinds the username and drops every subscription, leaving the
    /// connection open and anonymous.
    pub fn logout(&mut self, id: ConnectionId) -> Result<Departed, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        let name = std::mem::take(&mut session.username);
        let topics = std::mem::take(&mut session.topics);

        let username = self.release_username(id, name);
        if let Some(name) = &username {
            tracing::info!(%id, username = %name, "user logged out");
        }
        Ok(Departed { id, username, topics })
    }

    /// Adds `topic` to the session's set. Idempotent; returns `true` if the
    /// topic was newly added.
    ///
    /// # Errors
    /// [`SessionError::NotLoggedIn`] — presence mappings need a username.
    pub fn subscribe(&mut self, id: ConnectionId, topic: &str) -> Result<bool, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if !session.is_logged_in() {
            return Err(SessionError::NotLoggedIn(id));
        }
        let added = session.topics.insert(topic.to_string());
        let username = session.username.clone();

        if added {
            tracing::info!(%id, %username, topic, "subscribed");
            self.persist(|store| store.add_topic(topic));
            self.persist(|store| store.add_subscription(&username, topic));
        }
        Ok(added)
    }

    /// Removes `topic` from the session's set. Idempotent; returns `true`
    /// if the topic was present.
    pub fn unsubscribe(&mut self, id: ConnectionId, topic: &str) -> Result<bool, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if !session.is_logged_in() {
            return Err(SessionError::NotLoggedIn(id));
        }
        let removed = session.topics.remove(topic);
        let username = session.username.clone();

        if removed {
            tracing::info!(%id, %username, topic, "unsubscribed");
            self.persist(|store| store.remove_subscription(&username, topic));
        }
        Ok(removed)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.usernames.contains_key(username)
    }

    pub fn find_by_username(&self, username: &str) -> Option<ConnectionId> {
        self.usernames.get(username).copied()
    }

    pub fn is_subscribed(&self, id: ConnectionId, topic: &str) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|s| s.is_subscribed(topic))
    }

    pub fn topic_has_subscribers(&self, topic: &str) -> bool {
        self.sessions.values().any(|s| s.is_subscribed(topic))
    }

    /// Every session subscribed to `topic`, in ascending connection order.
    pub fn sessions_subscribed_to(&self, topic: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| s.is_subscribed(topic))
            .map(|s| s.id)
            .collect();
        ids.sort();
        ids
    }

    /// Sorted usernames of every logged-in session.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.usernames.keys().cloned().collect();
        users.sort();
        users
    }

    /// Union of every live session's topics, sorted.
    pub fn active_topics(&self) -> Vec<String> {
        let topics: HashSet<&String> =
            self.sessions.values().flat_map(|s| s.topics.iter()).collect();
        let mut topics: Vec<String> = topics.into_iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Queues `packet` for one connection. Returns `false` if it is gone.
    pub fn send(&self, id: ConnectionId, packet: Packet) -> bool {
        match self.sessions.get(&id) {
            Some(session) => session.send(packet),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops the username index entry and the presence entries for `name`.
    fn release_username(&mut self, id: ConnectionId, name: String) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        if self.usernames.get(&name) == Some(&id) {
            self.usernames.remove(&name);
        }
        self.persist(|store| store.remove_online(&name));
        self.persist(|store| store.remove_all_for_user(&name));
        Some(name)
    }

    /// Applies a presence update, logging instead of failing.
    fn persist(
        &mut self,
        update: impl FnOnce(&mut Box<dyn PresenceStore>) -> Result<(), StoreError>,
    ) {
        if let Err(e) = update(&mut self.store) {
            tracing::warn!(error = %e, "presence store update failed");
        }
    }
}
