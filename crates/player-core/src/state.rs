use std::sync::Arc;

use player_proto::protocol::PlayerSnapshot;
use tokio::sync::RwLock;

/// Shared, read-mostly copy of the latest published snapshot.
///
/// Only the core loop writes; socket clients read it to answer `Hello` and
/// `GetState` without a round trip through the event channel.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<PlayerSnapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: PlayerSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get(&self) -> PlayerSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn rev(&self) -> u64 {
        self.inner.read().await.rev
    }

    pub(crate) async fn replace(&self, snapshot: PlayerSnapshot) {
        *self.inner.write().await = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_the_same_snapshot() {
        let store = SnapshotStore::default();
        let reader = store.clone();
        store
            .replace(PlayerSnapshot {
                rev: 7,
                ..Default::default()
            })
            .await;
        assert_eq!(reader.rev().await, 7);
        assert_eq!(reader.get().await.rev, 7);
    }
}
