//! In-memory set of TLFs marked for background sync.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

use super::backend::SyncedTlfs;
use super::types::TlfId;

#[derive(Debug, Default)]
pub struct SyncedTlfSet {
    tlfs: RwLock<HashSet<TlfId>>,
}

impl SyncedTlfSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from canonical TLF names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tlfs = names
            .into_iter()
            .map(|name| TlfId::from_name(name.as_ref()))
            .collect();
        Self {
            tlfs: RwLock::new(tlfs),
        }
    }

    /// Marks or unmarks a TLF. Returns `true` if the state changed.
    pub fn set_synced(&self, tlf_id: TlfId, synced: bool) -> bool {
        let changed = if synced {
            self.tlfs.write().insert(tlf_id)
        } else {
            self.tlfs.write().remove(&tlf_id)
        };
        if changed {
            debug!(tlf_id = %tlf_id, synced, "TLF sync mode changed");
        }
        changed
    }

    pub fn synced(&self) -> Vec<TlfId> {
        let mut tlfs: Vec<_> = self.tlfs.read().iter().copied().collect();
        tlfs.sort();
        tlfs
    }

    pub fn len(&self) -> usize {
        self.tlfs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tlfs.read().is_empty()
    }
}

impl SyncedTlfs for SyncedTlfSet {
    fn is_synced(&self, tlf_id: &TlfId) -> bool {
        self.tlfs.read().contains(tlf_id)
    }
}
