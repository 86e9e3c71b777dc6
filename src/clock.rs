use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::actions::Action;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Sends `Action::Tick` at a fixed period until the receiving side goes away
pub struct Ticker {
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl Ticker {
    pub fn new(clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self { clock, period }
    }

    pub fn spawn(self, tx: UnboundedSender<Action>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(Action::Tick(self.clock.now())).is_err() {
                    debug!("tick receiver dropped, stopping ticker");
                    break;
                }
            }
        })
    }
}
