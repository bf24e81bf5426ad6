//! Tick scheduler
//!
//! Each furnace that has something to count (a heating cycle or an open
//! downtime) gets one repeating tick task. Tasks only send the furnace id over
//! a channel; the event loop that owns the store applies the tick, so all
//! mutation stays on a single task.

use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::furnace::FurnaceId;
use crate::presentation::PresentationSink;
use crate::store::FurnaceStore;

/// Default tick period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct TickScheduler {
    period: Duration,
    tx: UnboundedSender<FurnaceId>,
    tasks: HashMap<FurnaceId, CancellationToken>,
}

impl TickScheduler {
    /// Create a scheduler and the receiving end of its ticks
    #[must_use]
    pub fn new(period: Duration) -> (Self, UnboundedReceiver<FurnaceId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            period,
            tx,
            tasks: HashMap::new(),
        };
        (scheduler, rx)
    }

    /// Start ticking a furnace, replacing any tick source it already has
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&mut self, id: FurnaceId) {
        self.stop(id);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let period = self.period;

        tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = ticks.tick() => {
                        if tx.send(id).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        debug!("Tick source started for furnace {}", id);
        self.tasks.insert(id, token);
    }

    /// Stop ticking a furnace; no-op if it has no tick source
    pub fn stop(&mut self, id: FurnaceId) {
        if let Some(token) = self.tasks.remove(&id) {
            token.cancel();
            debug!("Tick source stopped for furnace {}", id);
        }
    }

    #[must_use]
    pub fn is_active(&self, id: FurnaceId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Match tick sources to what the store needs
    ///
    /// Running sources are left alone so their phase is not reset.
    pub fn sync<S: PresentationSink>(&mut self, store: &FurnaceStore<S>) {
        for id in FurnaceId::ALL {
            match (store.needs_tick(id), self.is_active(id)) {
                (true, false) => self.start(id),
                (false, true) => self.stop(id),
                _ => {}
            }
        }
    }

    pub fn shutdown(&mut self) {
        for id in FurnaceId::ALL {
            self.stop(id);
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
