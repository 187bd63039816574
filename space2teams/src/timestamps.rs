use std::collections::HashSet;

/// Hands out destination timestamps in whole seconds, never the same second twice.
///
/// The destination keeps one-second precision, so two messages posted within
/// the same second would collide. Taken seconds are remembered for the whole
/// run and a colliding message is moved forward to the next free second.
#[derive(Debug, Default)]
pub struct TimestampDeduplicator {
    taken: HashSet<i64>,
}

impl TimestampDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the first free second at or after `created_ms`.
    pub fn assign(&mut self, created_ms: i64) -> i64 {
        let mut seconds = created_ms.div_euclid(1000);

        while self.taken.contains(&seconds) {
            seconds += 1;
        }
        self.taken.insert(seconds);

        seconds
    }
}
