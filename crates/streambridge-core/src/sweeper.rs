//! Idle session eviction.
//!
//! A recurring background task that scans the registry and deletes sessions
//! with a live binding that have not been polled within the idle window.
//! Sessions that never created a binding hold no broker resources and are
//! left alone.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::manager::SessionManager;

pub struct IdleSweeper {
    manager: Arc<SessionManager>,
}

impl IdleSweeper {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Spawn the sweep loop. It ticks at the configured interval until the
    /// shutdown channel fires.
    pub fn start(self: Arc<Self>, shutdown_rx: oneshot::Receiver<()>) -> JoinHandle<()> {
        let sweep_interval = self.manager.config().sweep_interval;
        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            let mut shutdown_rx = shutdown_rx;

            info!(interval = ?sweep_interval, "idle sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("idle sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Run one sweep cycle over a registry snapshot. Returns the number of
    /// sessions evicted.
    pub async fn sweep_once(&self) -> usize {
        let idle_timeout = self.manager.config().idle_timeout;
        debug!("looking for timed-out consumers");

        let mut evicted = 0;
        for session in self.manager.registry().snapshot().await {
            let timed_out = {
                let state = session.state.lock().await;
                state.binding.is_some() && state.last_poll.elapsed() >= idle_timeout
            };
            if !timed_out {
                continue;
            }
            debug!(consumer = %session.id, "consumer timed out, evicting");
            // A concurrent explicit delete may have won; that is fine.
            if self
                .manager
                .delete_session(&session.group, &session.instance_id)
                .await
                .is_ok()
            {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "idle sweep evicted consumers");
        }
        evicted
    }
}
