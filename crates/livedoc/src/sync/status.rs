//! The save indicator shown next to a view.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Synced,
    /// Holds the error message; the label stays generic.
    Failed(String),
}

impl SaveStatus {
    /// Text rendered in the view.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Saving => "Saving...",
            Self::Synced => "All Synced ✨",
            Self::Failed(_) => "Try again?",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Synced | Self::Failed(_))
    }
}

struct StatusState {
    status: SaveStatus,
    /// Bumped on every `reset`; outcomes carrying an older epoch are dropped.
    epoch: u64,
    /// Bumped on every accepted `show`; a clear timer only fires if no newer
    /// status replaced the one it was armed for.
    seq: u64,
}

/// Status shared by one view and the tasks it spawned.
#[derive(Clone)]
pub struct StatusLine {
    state: Arc<Mutex<StatusState>>,
    clear_after: Duration,
}

impl StatusLine {
    pub fn new(clear_after: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(StatusState {
                status: SaveStatus::Idle,
                epoch: 0,
                seq: 0,
            })),
            clear_after,
        }
    }

    pub fn get(&self) -> SaveStatus {
        self.state.lock().status.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Back to `Idle` and detach every outcome still in flight.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.epoch += 1;
        st.seq += 1;
        st.status = SaveStatus::Idle;
    }

    /// Show `status` if `epoch` is still current. Transient statuses clear
    /// themselves after the configured delay. Returns whether it was shown.
    pub fn show(&self, epoch: u64, status: SaveStatus) -> bool {
        let seq = {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return false;
            }
            st.seq += 1;
            st.status = status.clone();
            st.seq
        };

        if status.is_transient() {
            self.arm_clear(seq);
        }
        true
    }

    fn arm_clear(&self, seq: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::trace!("no runtime, status will not auto-clear");
            return;
        };
        let state = Arc::clone(&self.state);
        let after = self.clear_after;
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let mut st = state.lock();
            if st.seq == seq {
                st.status = SaveStatus::Idle;
            }
        });
    }
}

impl std::fmt::Debug for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("StatusLine")
            .field("status", &st.status)
            .field("epoch", &st.epoch)
            .field("clear_after", &self.clear_after)
            .finish()
    }
}
