//! Synchronizer options and the clock used for timestamp stamps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};

/// Default time a transient status (synced / failed) stays visible.
pub const DEFAULT_STATUS_CLEAR_AFTER: Duration = Duration::from_millis(2000);

// ============================================================================
// Clock
// ============================================================================

/// Source of the ISO-8601 strings written to `createdAt` / `updatedAt`.
pub trait Clock: Send + Sync {
    fn now_iso(&self) -> String;
}

/// Wall clock, UTC with millisecond precision (`2024-03-01T10:15:00.123Z`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_iso(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl FixedClock {
    pub fn new(iso: impl Into<String>) -> Self {
        Self(iso.into())
    }
}

impl Clock for FixedClock {
    fn now_iso(&self) -> String {
        self.0.clone()
    }
}

// ============================================================================
// SyncOptions
// ============================================================================

/// Configuration shared by the collection and document synchronizers.
#[derive(Clone, Default)]
pub struct SyncOptions {
    /// How long "All Synced" / "Try again?" stay visible (`None` = 2000 ms).
    pub status_clear_after: Option<Duration>,
    /// Debounce window for editor autosave (`None` = save only on request).
    pub autosave_after: Option<Duration>,
    /// Timestamp source (`None` = [`SystemClock`]).
    pub clock: Option<Arc<dyn Clock>>,
}

impl SyncOptions {
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_status_clear_after(mut self, after: Duration) -> Self {
        self.status_clear_after = Some(after);
        self
    }

    pub fn with_autosave(mut self, after: Duration) -> Self {
        self.autosave_after = Some(after);
        self
    }

    pub(crate) fn resolve(self) -> ResolvedOptions {
        ResolvedOptions {
            status_clear_after: self.status_clear_after.unwrap_or(DEFAULT_STATUS_CLEAR_AFTER),
            autosave_after: self.autosave_after,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("status_clear_after", &self.status_clear_after)
            .field("autosave_after", &self.autosave_after)
            .field("clock", &self.clock.as_ref().map(|_| "<clock>"))
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct ResolvedOptions {
    pub status_clear_after: Duration,
    pub autosave_after: Option<Duration>,
    pub clock: Arc<dyn Clock>,
}
