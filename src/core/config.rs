use std::time::Duration;

/// Default quiet period before a batch of file system events is delivered
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Default capacity of a watcher's notification channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for wordwatch
#[derive(Debug, Clone)]
pub struct Config {
    /// How long the OS watcher waits for the file system to settle before
    /// delivering a batch of change events
    pub debounce: Duration,
    /// Capacity of each watcher's notification channel
    pub channel_capacity: usize,
    /// Descend into symlinked directories while walking trees
    pub follow_links: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            follow_links: false,
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the notification channel capacity (at least 1)
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Follow symlinked directories during tree walks
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }
}
