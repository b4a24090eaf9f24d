use time::OffsetDateTime;

/// Wall-clock source used to stamp telemetry windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
