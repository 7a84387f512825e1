//! Relay hub — registry of connected clients and groups, and message routing.
//!
//! DESIGN
//! ======
//! The hub is an explicit object constructed once at startup and shared as
//! `Arc<Hub>`; nothing reaches it through a global. A single `RwLock` guards
//! both the client map and the group map, so every structural mutation
//! (register, unregister, eviction, create/join) is serialized against every
//! other, while routing lookups and roster snapshots share the read side.
//!
//! Each client owns a bounded `mpsc` queue. The hub only ever `try_send`s
//! onto it, so a stalled consumer can never block the hub:
//! - General broadcast: a full (or closed) queue evicts the client.
//! - Targeted sends (private, group): a full queue drops that one message.
//!
//! Removing a client from the registry drops the hub's sender, which is what
//! closes the queue and lets the session's outbound pump finish.
//!
//! INVARIANTS
//! ==========
//! - A name is a key of `clients` iff that client can currently receive.
//! - Every group member is a key of `clients`. Removal prunes memberships in
//!   the same write-locked step, and create/join re-check that the sender is
//!   still registered before adding it.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::{self, Envelope, GroupInfo, Kind};

/// Outbound queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Smallest usable queue: registration queues the confirmation, a client
/// list and a group list before the session's outbound pump starts.
pub const MIN_QUEUE_CAPACITY: usize = 3;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HubError {
    #[error("name taken: {0}")]
    NameTaken(String),
}

/// Handle to a registered client, held by its session.
///
/// `session_id` tells successive sessions under the same name apart, so a
/// stale session can never unregister its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub name: String,
    pub session_id: Uuid,
}

struct ClientEntry {
    session_id: Uuid,
    tx: mpsc::Sender<Envelope>,
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enqueue {
    Queued,
    Full,
    Closed,
}

impl ClientEntry {
    fn try_enqueue(&self, envelope: Envelope) -> Enqueue {
        match self.tx.try_send(envelope) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }
}

/// A named group. Members are client names.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub creator: String,
    pub members: BTreeSet<String>,
}

impl Group {
    fn info(&self) -> GroupInfo {
        GroupInfo {
            name: self.name.clone(),
            creator: self.creator.clone(),
            members: self.members.iter().cloned().collect(),
        }
    }
}

#[derive(Default)]
struct Registry {
    clients: BTreeMap<String, ClientEntry>,
    groups: BTreeMap<String, Group>,
}

impl Registry {
    fn is_current(&self, client: &Client) -> bool {
        self.clients
            .get(&client.name)
            .is_some_and(|entry| entry.session_id == client.session_id)
    }

    /// Remove a client entry and all of its memberships. Returns whether the
    /// entry existed and belonged to `session_id`.
    fn remove_client(&mut self, name: &str, session_id: Uuid) -> bool {
        let owned = self
            .clients
            .get(name)
            .is_some_and(|entry| entry.session_id == session_id);
        if !owned {
            return false;
        }
        self.clients.remove(name);
        for group in self.groups.values_mut() {
            group.members.remove(name);
        }
        true
    }
}

/// Which rosters a broadcast pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Roster {
    Clients,
    Groups,
    Both,
}

impl Roster {
    fn clients(self) -> bool {
        matches!(self, Roster::Clients | Roster::Both)
    }

    fn groups(self) -> bool {
        matches!(self, Roster::Groups | Roster::Both)
    }
}

// =============================================================================
// HUB
// =============================================================================

pub struct Hub {
    registry: RwLock<Registry>,
    queue_capacity: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Hub {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self { registry: RwLock::new(Registry::default()), queue_capacity: queue_capacity.max(MIN_QUEUE_CAPACITY) }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Claim `name` and create the client's outbound queue.
    ///
    /// The existence check and the insert happen under one write lock, so of
    /// any number of concurrent claims on the same name exactly one wins. The
    /// confirmation envelope is queued before any roster traffic.
    ///
    /// # Errors
    ///
    /// Returns `HubError::NameTaken` if a connected client already owns `name`.
    pub async fn register(&self, name: &str) -> Result<(Client, mpsc::Receiver<Envelope>), HubError> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let client = Client { name: name.to_owned(), session_id: Uuid::new_v4() };

        {
            let mut registry = self.registry.write().await;
            if registry.clients.contains_key(name) {
                return Err(HubError::NameTaken(name.to_owned()));
            }
            // Fresh channel with capacity >= MIN_QUEUE_CAPACITY; cannot be full.
            let queued = tx.try_send(Envelope::registered(name)).is_ok();
            debug_assert!(queued, "confirmation must fit an empty queue");
            registry
                .clients
                .insert(client.name.clone(), ClientEntry { session_id: client.session_id, tx });
            info!(%name, session_id = %client.session_id, clients = registry.clients.len(), "hub: client registered");
        }

        self.broadcast_rosters(Roster::Both).await;
        Ok((client, rx))
    }

    /// Remove `client` from the registry and from every group, closing its
    /// queue. Idempotent; rosters are rebroadcast only when something was
    /// actually removed.
    pub async fn unregister(&self, client: &Client) {
        let removed = {
            let mut registry = self.registry.write().await;
            registry.remove_client(&client.name, client.session_id)
        };
        if !removed {
            return;
        }
        info!(name = %client.name, session_id = %client.session_id, "hub: client unregistered");
        self.broadcast_rosters(Roster::Both).await;
    }

    /// Whether `name` is currently registered.
    pub async fn is_registered(&self, name: &str) -> bool {
        self.registry.read().await.clients.contains_key(name)
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Decode one inbound frame from `client` and route it.
    ///
    /// Malformed frames, unknown kinds, and routing misses are dropped without
    /// any reply to the sender.
    pub async fn dispatch(&self, client: &Client, raw: &[u8]) {
        let mut envelope = match envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(name = %client.name, error = %e, "hub: dropped malformed frame");
                return;
            }
        };

        if !self.registry.read().await.is_current(client) {
            debug!(name = %client.name, "hub: dropped frame from unregistered session");
            return;
        }

        envelope.from = Some(client.name.clone());

        match envelope.kind {
            Kind::Private => {
                if let Some(to) = envelope.recipient() {
                    self.send_to_client(to, &envelope).await;
                }
                self.send_to_client(&client.name, &envelope).await;
            }
            Kind::CreateGroup => {
                if let Some(group_name) = envelope.group() {
                    self.create_group(client, group_name).await;
                }
                self.broadcast_group_list().await;
            }
            Kind::JoinGroup => {
                if let Some(group_name) = envelope.group() {
                    self.join_group(client, group_name).await;
                }
                self.broadcast_group_list().await;
            }
            Kind::GroupMessage => {
                if let Some(group_name) = envelope.group() {
                    self.send_to_group(group_name, &envelope).await;
                }
            }
            kind => debug!(name = %client.name, ?kind, "hub: ignored envelope kind"),
        }
    }

    async fn create_group(&self, client: &Client, group_name: &str) {
        let mut registry = self.registry.write().await;
        if !registry.is_current(client) || registry.groups.contains_key(group_name) {
            return;
        }
        registry.groups.insert(
            group_name.to_owned(),
            Group {
                name: group_name.to_owned(),
                creator: client.name.clone(),
                members: BTreeSet::from([client.name.clone()]),
            },
        );
        info!(group = %group_name, creator = %client.name, "hub: group created");
    }

    async fn join_group(&self, client: &Client, group_name: &str) {
        let mut registry = self.registry.write().await;
        if !registry.is_current(client) {
            return;
        }
        match registry.groups.get_mut(group_name) {
            Some(group) => {
                if group.members.insert(client.name.clone()) {
                    info!(group = %group_name, name = %client.name, "hub: joined group");
                }
            }
            None => debug!(group = %group_name, name = %client.name, "hub: join of unknown group ignored"),
        }
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Enqueue `envelope` for every connected client. Clients whose queue is
    /// full or closed are evicted. Returns the evicted names.
    pub async fn broadcast(&self, envelope: &Envelope) -> Vec<String> {
        let mut stalled: Vec<(String, Uuid)> = Vec::new();
        {
            let registry = self.registry.read().await;
            for (name, entry) in &registry.clients {
                if entry.try_enqueue(envelope.clone()) != Enqueue::Queued {
                    stalled.push((name.clone(), entry.session_id));
                }
            }
        }
        if stalled.is_empty() {
            return Vec::new();
        }

        let mut evicted = Vec::with_capacity(stalled.len());
        let mut registry = self.registry.write().await;
        for (name, session_id) in stalled {
            if registry.remove_client(&name, session_id) {
                warn!(%name, %session_id, kind = ?envelope.kind, "hub: evicted slow consumer");
                evicted.push(name);
            }
        }
        evicted
    }

    /// Enqueue `envelope` for one client. A full queue drops the message for
    /// that recipient only; an unknown name is a no-op.
    pub async fn send_to_client(&self, name: &str, envelope: &Envelope) {
        let registry = self.registry.read().await;
        let Some(entry) = registry.clients.get(name) else {
            debug!(to = %name, "hub: unknown recipient");
            return;
        };
        let outcome = entry.try_enqueue(envelope.clone());
        if outcome != Enqueue::Queued {
            debug!(to = %name, ?outcome, kind = ?envelope.kind, "hub: dropped targeted message");
        }
    }

    /// Enqueue `envelope` for every connected member of `group_name`,
    /// sender included. Same drop policy as `send_to_client`.
    pub async fn send_to_group(&self, group_name: &str, envelope: &Envelope) {
        let registry = self.registry.read().await;
        let Some(group) = registry.groups.get(group_name) else {
            debug!(group = %group_name, "hub: unknown group");
            return;
        };
        for member in &group.members {
            let Some(entry) = registry.clients.get(member) else {
                continue;
            };
            let outcome = entry.try_enqueue(envelope.clone());
            if outcome != Enqueue::Queued {
                debug!(group = %group_name, to = %member, ?outcome, "hub: dropped group message");
            }
        }
    }

    // =========================================================================
    // ROSTERS
    // =========================================================================

    /// Connected client names, ascending.
    pub async fn client_names(&self) -> Vec<String> {
        self.registry.read().await.clients.keys().cloned().collect()
    }

    /// All groups with their members, ascending by name.
    pub async fn groups(&self) -> Vec<GroupInfo> {
        self.registry
            .read()
            .await
            .groups
            .values()
            .map(Group::info)
            .collect()
    }

    pub async fn broadcast_client_list(&self) {
        self.broadcast_rosters(Roster::Clients).await;
    }

    pub async fn broadcast_group_list(&self) {
        self.broadcast_rosters(Roster::Groups).await;
    }

    /// Broadcast the requested rosters. An eviction changes both rosters, so
    /// any pass that evicted someone is followed by a full pass; each such
    /// pass shrinks the registry, so this terminates.
    async fn broadcast_rosters(&self, mut roster: Roster) {
        loop {
            let mut evicted = false;
            if roster.clients() {
                let list = Envelope::client_list(self.client_names().await);
                evicted |= !self.broadcast(&list).await.is_empty();
            }
            if roster.groups() {
                let list = Envelope::group_list(self.groups().await);
                evicted |= !self.broadcast(&list).await.is_empty();
            }
            if !evicted {
                return;
            }
            roster = Roster::Both;
        }
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
