use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::DeviceState;
use crate::mqtt::{Publisher, TELEMETRY_TOPIC};

/// Result of a single telemetry tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    Dropped,
}

pub struct TelemetryLoop {
    state: Arc<DeviceState>,
    publisher: Publisher,
    interval: Duration,
}

impl TelemetryLoop {
    pub fn new(state: Arc<DeviceState>, publisher: Publisher, interval: Duration) -> Self {
        Self {
            state,
            publisher,
            interval,
        }
    }

    /// Sample the device and publish once. Never waits on the broker.
    pub fn tick(&self) -> TickOutcome {
        let sample = self.state.sample_and_advance();
        match self.publisher.publish_json(TELEMETRY_TOPIC, &sample) {
            Ok(()) => TickOutcome::Published,
            Err(_) => TickOutcome::Dropped,
        }
    }

    /// Tick on a fixed cadence until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Telemetry loop started (every {:?})", self.interval);

        let (mut published, mut dropped) = (0u64, 0u64);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    match self.tick() {
                        TickOutcome::Published => published += 1,
                        TickOutcome::Dropped => dropped += 1,
                    }
                }
            }
        }
        debug!("Telemetry loop stopped ({} published, {} dropped)", published, dropped);
    }
}
