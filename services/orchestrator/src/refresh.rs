//! Automatic refresh of the displayed quote. While a quote sits idle it is
//! replaced wholesale on a fixed cadence; the loop skips entirely while an
//! execution attempt is in flight, so a refresh can never race an
//! in-progress signature.

use crate::quote::{Quote, QuoteResolver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shared slot holding the quote currently on display.
#[derive(Clone, Default)]
pub struct QuoteSlot {
    current: Arc<RwLock<Option<Quote>>>,
    executing: Arc<AtomicBool>,
}

impl QuoteSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, quote: Quote) {
        *self.current.write().await = Some(quote);
    }

    pub async fn get(&self) -> Option<Quote> {
        self.current.read().await.clone()
    }

    /// Remove and return the quote for execution; the slot stays empty so
    /// the refresh loop has nothing to touch until reset.
    pub async fn take(&self) -> Option<Quote> {
        self.current.write().await.take()
    }

    pub async fn clear(&self) {
        *self.current.write().await = None;
    }

    pub fn set_executing(&self, executing: bool) {
        self.executing.store(executing, Ordering::SeqCst);
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }
}

/// Spawn the refresh loop. Abort the returned handle to stop it.
pub fn spawn_auto_refresh(
    resolver: Arc<QuoteResolver>,
    slot: QuoteSlot,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; swallow it so the first
        // refresh happens one full interval after display.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if slot.is_executing() {
                debug!("skipping quote refresh during execution");
                continue;
            }
            let Some(current) = slot.get().await else {
                continue;
            };
            match resolver.refresh(&current).await {
                Ok(fresh) => {
                    debug!(age_secs = current.age().as_secs(), "quote auto-refreshed");
                    slot.set(fresh).await;
                }
                Err(err) => {
                    // Keep showing the old quote; the freshness gate will
                    // still block signing once it lapses.
                    warn!(%err, "quote auto-refresh failed");
                }
            }
        }
    })
}
