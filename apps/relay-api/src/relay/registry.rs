//! Channel registry: channel name → live connections on that channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::connection::{CloseReason, Connection};

/// Shared registry of every channel's members.
///
/// Backed by `DashMap`, so each channel's member list is only ever mutated
/// while holding its shard's write guard. Register, unregister, and sweep are
/// therefore atomic per channel, and snapshots never see a half-applied
/// eviction. Channels whose last member leaves are dropped.
pub struct ChannelRegistry {
    channels: DashMap<String, Vec<Arc<Connection>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Add a connection to its channel.
    ///
    /// Any existing member with the same non-empty client id is removed and
    /// told to close before the new connection is appended. Returns the
    /// evicted connections.
    pub fn register(&self, connection: Arc<Connection>) -> Vec<Arc<Connection>> {
        let mut members = self
            .channels
            .entry(connection.channel.clone())
            .or_default();

        let evicted = if connection.client_id.is_empty() {
            Vec::new()
        } else {
            remove_where(&mut members, |m| m.client_id == connection.client_id)
        };
        for old in &evicted {
            old.close(CloseReason::REPLACED);
        }

        members.push(connection);
        evicted
    }

    /// Remove a connection by identity. Returns `false` if it was not a
    /// member (already evicted, reaped, or unregistered).
    pub fn unregister(&self, connection: &Connection) -> bool {
        let removed = match self.channels.get_mut(&connection.channel) {
            Some(mut members) => !remove_where(&mut members, |m| m.id == connection.id).is_empty(),
            None => false,
        };
        if removed {
            self.channels
                .remove_if(&connection.channel, |_, members| members.is_empty());
        }
        removed
    }

    /// Copy of the channel's current members. Empty for unknown channels.
    pub fn snapshot(&self, channel: &str) -> Vec<Arc<Connection>> {
        self.channels
            .get(channel)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Remove every member whose transport is no longer open, across all
    /// channels. Removed connections are told to close. Returns them.
    pub fn sweep_dead_connections(&self) -> Vec<Arc<Connection>> {
        let mut reaped = Vec::new();
        self.channels.retain(|_, members| {
            reaped.extend(remove_where(members, |m| m.is_dead()));
            !members.is_empty()
        });
        for conn in &reaped {
            conn.close(CloseReason::GOING_AWAY);
        }
        reaped
    }

    /// Member count per channel, sorted by channel name.
    pub fn occupancy(&self) -> BTreeMap<String, usize> {
        self.channels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    /// Total members across all channels.
    pub fn connection_count(&self) -> usize {
        self.channels.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Single removal path shared by eviction, unregister, and sweep.
fn remove_where(
    members: &mut Vec<Arc<Connection>>,
    mut predicate: impl FnMut(&Connection) -> bool,
) -> Vec<Arc<Connection>> {
    let mut removed = Vec::new();
    members.retain(|m| {
        if predicate(m.as_ref()) {
            removed.push(Arc::clone(m));
            false
        } else {
            true
        }
    });
    removed
}
