//! Last-seen pool records and the changes between them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::notify::Severity;
use crate::pool::Pool;

/// A change between two consecutive observations of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    StateChanged { previous: String, current: String },
    StatusChanged { status: String },
    ErrorsChanged { errors: String },
    ScrubStarted,
    ScrubCompleted,
}

impl PoolEvent {
    /// Stable numeric identity of the kind of change.
    pub fn id(&self) -> u32 {
        match self {
            Self::StateChanged { .. } => 1,
            Self::StatusChanged { .. } => 2,
            Self::ErrorsChanged { .. } => 3,
            Self::ScrubStarted => 4,
            Self::ScrubCompleted => 5,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::StateChanged { .. } | Self::ErrorsChanged { .. } => Severity::Critical,
            Self::StatusChanged { .. } => Severity::Warning,
            Self::ScrubStarted | Self::ScrubCompleted => Severity::Info,
        }
    }

    /// Human-readable message for `pool`.
    pub fn message(&self, pool: &str) -> String {
        match self {
            Self::StateChanged { previous, current } => {
                format!("Pool \"{pool}\" state changed: {previous} -> {current}")
            }
            Self::StatusChanged { status } => {
                format!("Pool \"{pool}\" new status: {}", single_line(status))
            }
            Self::ErrorsChanged { errors } => format!("Pool \"{pool}\" new errors: {errors}"),
            Self::ScrubStarted => format!("Pool \"{pool}\" scrub: started"),
            Self::ScrubCompleted => format!("Pool \"{pool}\" scrub: completed"),
        }
    }
}

/// Replace carriage returns, newlines and tabs with spaces.
pub fn single_line(raw: &str) -> String {
    raw.replace(['\r', '\n', '\t'], " ")
}

fn scanning(pool: &Pool) -> bool {
    pool.scanned > 0.0
}

/// Compare two observations of the same pool. The checks are independent;
/// any number of events may result.
pub fn detect_changes(previous: &Pool, current: &Pool) -> Vec<PoolEvent> {
    let mut events = Vec::new();

    if previous.state != current.state {
        events.push(PoolEvent::StateChanged {
            previous: previous.state.clone(),
            current: current.state.clone(),
        });
    }
    if previous.status != current.status {
        events.push(PoolEvent::StatusChanged {
            status: current.status.clone(),
        });
    }
    if previous.errors != current.errors {
        events.push(PoolEvent::ErrorsChanged {
            errors: current.errors.clone(),
        });
    }
    match (scanning(previous), scanning(current)) {
        (false, true) => events.push(PoolEvent::ScrubStarted),
        (true, false) => events.push(PoolEvent::ScrubCompleted),
        _ => {}
    }

    events
}

/// Most recent record of every pool seen so far.
#[derive(Debug, Default)]
pub struct PoolHistory {
    pools: Mutex<HashMap<String, Pool>>,
}

impl PoolHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `current` as the latest record for `name` and return what
    /// changed since the previous one. The first observation of a pool
    /// yields no events.
    ///
    /// Compare and replace happen under one lock, so concurrent updates for
    /// the same pool always diff against the newest stored record.
    pub fn record(&self, name: &str, current: Pool) -> Vec<PoolEvent> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        let events = pools
            .get(name)
            .map(|previous| detect_changes(previous, &current))
            .unwrap_or_default();
        pools.insert(name.to_owned(), current);
        events
    }

    pub fn get(&self, name: &str) -> Option<Pool> {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pool(state: &str, status: &str, errors: &str, scanned: f64) -> Pool {
        Pool {
            name: "tank".to_owned(),
            state: state.to_owned(),
            status: status.to_owned(),
            errors: errors.to_owned(),
            scanned,
            ..Pool::default()
        }
    }

    fn healthy() -> Pool {
        make_pool("ONLINE", "OK", "No known data errors", 0.0)
    }

    #[test]
    fn first_observation_is_silent() {
        let history = PoolHistory::new();
        assert!(history.record("tank", healthy()).is_empty());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn state_change_fires_once() {
        let history = PoolHistory::new();
        history.record("tank", healthy());

        let degraded = make_pool("DEGRADED", "OK", "No known data errors", 0.0);
        let events = history.record("tank", degraded.clone());
        assert_eq!(
            events,
            [PoolEvent::StateChanged {
                previous: "ONLINE".to_owned(),
                current: "DEGRADED".to_owned(),
            }]
        );
        assert_eq!(events[0].message("tank"), "Pool \"tank\" state changed: ONLINE -> DEGRADED");
        assert_eq!(events[0].severity(), Severity::Critical);

        assert!(history.record("tank", degraded).is_empty());
    }

    #[test]
    fn multiple_changes_fire_together() {
        let before = healthy();
        let after = make_pool("DEGRADED", "One or more devices\nis faulted.", "1 data error", 0.0);
        let ids: Vec<u32> = detect_changes(&before, &after).iter().map(PoolEvent::id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn status_message_is_single_line() {
        let event = PoolEvent::StatusChanged {
            status: "a\r\nb\tc".to_owned(),
        };
        assert_eq!(event.message("p"), "Pool \"p\" new status: a  b c");
        assert_eq!(event.severity(), Severity::Warning);
    }

    #[test]
    fn scrub_start_and_completion() {
        let idle = healthy();
        let running = make_pool("ONLINE", "OK", "No known data errors", 12.5);
        let further = make_pool("ONLINE", "OK", "No known data errors", 40.0);

        assert_eq!(detect_changes(&idle, &running), [PoolEvent::ScrubStarted]);
        assert!(detect_changes(&running, &further).is_empty());
        assert_eq!(detect_changes(&further, &idle), [PoolEvent::ScrubCompleted]);
        assert_eq!(PoolEvent::ScrubCompleted.message("tank"), "Pool \"tank\" scrub: completed");
    }

    #[test]
    fn new_errors_are_critical() {
        let errors = "2 data errors, use '-v' for a list";
        let events = detect_changes(&healthy(), &make_pool("ONLINE", "OK", errors, 0.0));
        assert_eq!(events, [PoolEvent::ErrorsChanged { errors: errors.to_owned() }]);

        let event = &events[0];
        assert_eq!(event.id(), 3);
        assert_eq!(event.severity(), Severity::Critical);
        assert_eq!(
            event.message("tank"),
            "Pool \"tank\" new errors: 2 data errors, use '-v' for a list"
        );
    }

    #[test]
    fn pools_are_tracked_independently() {
        let history = PoolHistory::new();
        history.record("tank", healthy());
        history.record("backup", make_pool("FAULTED", "OK", "", 0.0));

        assert!(history.record("tank", healthy()).is_empty());
        assert_eq!(history.get("backup").map(|p| p.state).as_deref(), Some("FAULTED"));
        assert_eq!(history.get("missing"), None);
    }
}
