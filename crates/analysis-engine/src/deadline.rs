use std::time::{Duration, Instant};

/// Cooperative scan deadline, checked once per text unit
///
/// The engine never aborts a scan with an error; when the deadline passes the
/// scanner stops and returns what it has, marked incomplete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No time limit
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now().checked_add(budget))
    }

    pub fn is_expired(&self) -> bool {
        self.0.map_or(false, |at| Instant::now() >= at)
    }
}
