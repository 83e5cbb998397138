use std::time::{SystemTime, UNIX_EPOCH};

/// Injectable clock. Consensus uses the system clock; tests substitute a
/// stepped one, and an adjusted network-time source can be slotted in
/// without touching consumers.
pub trait TimeProvider: Send + Sync {
    /// Seconds since the unix epoch.
    fn now(&self) -> u64;
}

pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0)
    }
}
