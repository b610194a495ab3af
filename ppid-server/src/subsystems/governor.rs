//! Per-chat cooldown and human-like reply pacing.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tokio::time::Instant;

use ppid_core::config::PacingConfig;

/// Cooldown entries idle longer than this are dropped by [`Governor::prune`].
const PRUNE_AFTER: Duration = Duration::from_secs(30);

pub struct Governor {
    config: PacingConfig,
    last_accepted: DashMap<String, Instant>,
}

impl Governor {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            last_accepted: DashMap::new(),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.config.cooldown_ms)
    }

    /// `true` when `chat_id` is outside its cooldown window. An accepted
    /// call starts a new window; a rejected one leaves it untouched.
    pub fn try_acquire(&self, chat_id: &str) -> bool {
        self.try_acquire_at(chat_id, Instant::now())
    }

    /// Cooldown check for a message that arrived at `at`. Windows are
    /// measured between arrivals, not between handling times.
    pub fn try_acquire_at(&self, chat_id: &str, at: Instant) -> bool {
        match self.last_accepted.entry(chat_id.to_string()) {
            Entry::Occupied(mut e) => {
                if at.saturating_duration_since(*e.get()) >= self.cooldown() {
                    e.insert(at);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(e) => {
                e.insert(at);
                true
            }
        }
    }

    /// Uniform random pause before a generated reply.
    pub fn human_delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Typing indicator duration, proportional to the reply and capped.
    pub fn typing_delay(&self, chars: usize) -> Duration {
        let ms = (chars as u64).saturating_mul(self.config.typing_ms_per_char);
        Duration::from_millis(ms.min(self.config.typing_cap_ms))
    }

    pub fn prune(&self) {
        let keep = PRUNE_AFTER.max(self.cooldown());
        let now = Instant::now();
        self.last_accepted
            .retain(|_, at| now.duration_since(*at) < keep);
    }

    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }
}
