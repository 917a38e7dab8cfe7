use crate::engine::TorrentState;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Guards the torrent's observed lifecycle state and wakes waiters on every transition.
///
/// The Piece Controller never polls the engine directly; it only ever observes state
/// through this entity, which the Session Driver updates as `state-changed` alerts arrive.
#[derive(Debug)]
pub struct Status {
    state: Mutex<TorrentState>,
    notify: Notify,
}

impl Status {
    pub fn new(initial: TorrentState) -> Self {
        Self {
            state: Mutex::new(initial),
            notify: Notify::new(),
        }
    }

    /// The current lifecycle state.
    pub async fn get(&self) -> TorrentState {
        *self.state.lock().await
    }

    /// Records a new lifecycle state and wakes everyone waiting on [Status::wait_until_readable].
    pub async fn set(&self, state: TorrentState) {
        *self.state.lock().await = state;
        self.notify.notify_waiters();
    }

    /// Waits up to `timeout` for the state to become readable (downloading, finished or seeding).
    ///
    /// Returns `false` on timeout; a spurious `false` before the real transition lands is
    /// expected and the caller is responsible for retrying.
    pub async fn wait_until_readable(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                if self.get().await.is_readable() {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
        .is_ok()
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(TorrentState::QueuedForChecking)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_until_readable_already_readable() {
        let status = Status::new(TorrentState::Downloading);

        let result = status.wait_until_readable(Duration::from_millis(50)).await;

        assert!(result);
    }

    #[tokio::test]
    async fn test_wait_until_readable_times_out() {
        let status = Status::new(TorrentState::CheckingFiles);

        let result = status.wait_until_readable(Duration::from_millis(50)).await;

        assert!(!result);
    }

    #[tokio::test]
    async fn test_wait_until_readable_woken_by_set() {
        let status = std::sync::Arc::new(Status::new(TorrentState::Allocating));
        let waiter = status.clone();

        let handle = tokio::spawn(async move { waiter.wait_until_readable(Duration::from_secs(1)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        status.set(TorrentState::Downloading).await;

        assert!(handle.await.unwrap());
    }
}
