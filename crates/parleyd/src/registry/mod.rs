//! Member registry and broadcast fan-out.
//!
//! The registry is the only shared state in the daemon: a set of active
//! members keyed by connection id, guarded by a single mutex. All mutation
//! (join, leave, eviction) and the snapshot taken for a broadcast go through
//! this type; the underlying container is never exposed.
//!
//! # Locking discipline
//!
//! The mutex is held only for map mutation and for taking a consistent
//! snapshot of the current members. Message delivery happens outside the
//! lock against the snapshot, accepting slightly stale membership: a member
//! that joins mid-broadcast misses that message, a member that left gets a
//! failed write and is evicted. The lock is never held across a call back
//! into registry code, so there is no reentrancy and no deadlock risk.
//!
//! # Delivery policy
//!
//! Broadcast is best effort. A write failure to one recipient evicts that
//! recipient (remove + shut down its connection) and never aborts delivery
//! to the rest; errors are logged, not surfaced. There is no queueing or
//! backpressure: a stalled recipient blocks the broadcaster for the
//! duration of that one send.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use parley_core::MemberName;

/// Identifier assigned to each accepted connection.
///
/// Stands in for the connection handle as registry identity; names are not
/// guaranteed unique, ids are.
pub type MemberId = u64;

/// An active chat member: the handshake name plus the write half of its
/// connection, shared with the member's own handler task.
pub struct Member<W> {
    name: MemberName,
    writer: Arc<Mutex<W>>,
}

/// Thread-safe set of active members plus the broadcast operation.
///
/// Generic over the writer type so tests can substitute in-memory duplex
/// streams for TCP write halves.
pub struct Registry<W> {
    members: Mutex<HashMap<MemberId, Member<W>>>,
}

impl<W> Default for Registry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Registry<W> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of registered members.
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Returns `true` when no members are registered.
    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Returns the display names of all registered members.
    ///
    /// Order is unspecified. Used for logging and as an observation point
    /// in tests.
    pub async fn member_names(&self) -> Vec<MemberName> {
        self.members
            .lock()
            .await
            .values()
            .map(|member| member.name.clone())
            .collect()
    }
}

impl<W> Registry<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Registers a new member.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateMember` if the id is already registered.
    ///   Ids come from an atomic counter, so this indicates a logic error;
    ///   callers log it loudly rather than recovering silently.
    pub async fn add(
        &self,
        id: MemberId,
        name: MemberName,
        writer: Arc<Mutex<W>>,
    ) -> Result<(), RegistryError> {
        let mut members = self.members.lock().await;
        if let Some(existing) = members.get(&id) {
            return Err(RegistryError::DuplicateMember {
                id,
                name: existing.name.clone(),
            });
        }
        members.insert(id, Member { name, writer });
        debug!(id, total = members.len(), "Member registered");
        Ok(())
    }

    /// Removes a member if present.
    ///
    /// Returns the removed member's name, or `None` when the id was not
    /// registered. Removal is idempotent: quit handling and eviction can
    /// race without error, and whichever runs second is a no-op.
    pub async fn remove(&self, id: MemberId) -> Option<MemberName> {
        let mut members = self.members.lock().await;
        let removed = members.remove(&id);
        if let Some(ref member) = removed {
            debug!(id, member = %member.name, remaining = members.len(), "Member removed");
        }
        removed.map(|member| member.name)
    }

    /// Delivers `payload` to every registered member except `sender`.
    ///
    /// Takes a snapshot of the membership under the lock, releases it, then
    /// writes to each recipient in turn. Recipients whose write fails are
    /// evicted afterwards; a failure to one never aborts delivery to the
    /// rest, and nothing is reported back to the sender.
    pub async fn broadcast(&self, sender: MemberId, payload: &[u8]) {
        let targets: Vec<(MemberId, MemberName, Arc<Mutex<W>>)> = {
            let members = self.members.lock().await;
            members
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, member)| (*id, member.name.clone(), Arc::clone(&member.writer)))
                .collect()
        };

        let mut unreachable = Vec::new();
        for (id, name, writer) in targets {
            let mut writer = writer.lock().await;
            let result = async {
                writer.write_all(payload).await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            }
            .await;

            if let Err(error) = result {
                warn!(id, member = %name, %error, "Failed to deliver message, evicting member");
                drop(writer);
                unreachable.push(id);
            }
        }

        for id in unreachable {
            self.evict(id).await;
        }
    }

    /// Removes a member whose connection proved unwritable and shuts the
    /// connection down. A member already removed by its own handler is
    /// skipped.
    async fn evict(&self, id: MemberId) {
        let member = {
            let mut members = self.members.lock().await;
            members.remove(&id)
        };

        if let Some(member) = member {
            let mut writer = member.writer.lock().await;
            if let Err(error) = writer.shutdown().await {
                debug!(id, %error, "Evicted member's connection already closed");
            }
        }
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A member with this connection id is already registered.
    ///
    /// Cannot occur in normal flow; treated as a logic-error signal.
    #[error("duplicate member id {id} (already registered as {name})")]
    DuplicateMember { id: MemberId, name: MemberName },
}
