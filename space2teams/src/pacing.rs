use std::time::Duration;

/// Client-side throttling and provisioning waits.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Messages sent between two throttling pauses.
    pub messages_per_second: usize,
    pub message_pause: Duration,
    /// Wait for the destination to make new teams, channels and members visible.
    pub provisioning_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            messages_per_second: 5,
            message_pause: Duration::from_secs(2),
            provisioning_pause: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    /// No waiting at all, for tests and dry fakes.
    pub fn immediate() -> Self {
        Self {
            messages_per_second: 5,
            message_pause: Duration::ZERO,
            provisioning_pause: Duration::ZERO,
        }
    }

    /// Rough time needed to send `messages` messages at this pace.
    pub fn estimate(&self, messages: u64) -> Duration {
        let per_second = self.messages_per_second.max(1) as u64;
        let pauses = messages / per_second;
        Duration::from_secs_f64(messages as f64 / per_second as f64)
            + self.message_pause * pauses as u32
    }
}

/// `HH:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}
