//! Activity-based standby
//!
//! Capture consumers poll `FRAMEBUFFER_ID`; every read counts as activity.
//! Outputs nobody has polled for the idle timeout go to standby, and the next
//! read brings them back. Standby is advisory: the buffer and its ID stay
//! valid either way.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::DEFAULT_IDLE_TIMEOUT;
use crate::registry::{Registry, VirtualOutput};
use crate::types::PowerState;

/// Active/standby state machine for virtual outputs
#[derive(Debug, Clone, Copy)]
pub struct PowerController {
    idle_timeout: Duration,
}

impl Default for PowerController {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl PowerController {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Record a framebuffer ID read. Returns true if the output woke up.
    pub fn record_access(&self, output: &mut VirtualOutput, now: Instant) -> bool {
        output.mark_accessed(now);
        if output.power() == PowerState::Standby {
            output.set_power(PowerState::Active);
            info!("{} active", output.name());
            return true;
        }
        false
    }

    /// Move idle outputs to standby. Returns the names that changed.
    pub fn tick(&self, registry: &mut Registry, now: Instant) -> Vec<String> {
        let mut entered = Vec::new();
        for output in registry.iter_mut() {
            if output.power() != PowerState::Active {
                continue;
            }
            let idle = now.saturating_duration_since(output.last_access());
            if idle >= self.idle_timeout {
                output.set_power(PowerState::Standby);
                debug!("{} idle for {:.1}s", output.name(), idle.as_secs_f64());
                info!("{} standby", output.name());
                entered.push(output.name().to_string());
            }
        }
        entered
    }
}
