use crate::sink::SessionId;

/// User-facing "work in progress" affordance, shown while a session runs.
pub trait ActivityIndicator: Send + Sync {
    fn show(&self, session: SessionId, requested: u64);
    fn hide(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl ActivityIndicator for NoopIndicator {
    fn show(&self, _session: SessionId, _requested: u64) {}

    fn hide(&self) {}
}
