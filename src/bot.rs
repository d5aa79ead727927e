//! Top-level run loop: inbound stream → coordinator → delivery.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::channels::{ChannelManager, IncomingMessage, Outbound};
use crate::error::Error;
use crate::outreach::Coordinator;

/// Owns the channels and feeds every inbound message to the coordinator.
///
/// Messages from different jids are handled concurrently. Messages from the
/// same jid are handled one at a time, in arrival order.
pub struct Bot {
    coordinator: Arc<Coordinator>,
    channels: Arc<ChannelManager>,
    jid_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Bot {
    pub fn new(coordinator: Arc<Coordinator>, channels: Arc<ChannelManager>) -> Self {
        Self {
            coordinator,
            channels,
            jid_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        let mut message_stream = if self.channels.is_empty() {
            tracing::warn!("No channels configured; only the matcher will run");
            ChannelManager::idle_stream()
        } else {
            self.channels.start_all().await?
        };
        self.channels.health_check_all().await;

        tracing::info!("Outreach bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let lock = self.lock_for(&message.user_id).await;
            let coordinator = self.coordinator.clone();
            let channels = self.channels.clone();
            let jid_locks = self.jid_locks.clone();
            tokio::spawn(async move {
                {
                    let _guard = lock.lock().await;
                    handle_message(&coordinator, &channels, &message).await;
                }
                release_lock(&jid_locks, &message.user_id, lock).await;
            });
        }

        self.channels.shutdown_all().await;
        Ok(())
    }

    async fn lock_for(&self, jid: &str) -> Arc<Mutex<()>> {
        self.jid_locks
            .lock()
            .await
            .entry(jid.to_string())
            .or_default()
            .clone()
    }
}

/// Drop the per-jid lock once no other task holds or waits on it.
async fn release_lock(
    locks: &Mutex<HashMap<String, Arc<Mutex<()>>>>,
    jid: &str,
    lock: Arc<Mutex<()>>,
) {
    let mut locks = locks.lock().await;
    // One reference in the map, one here.
    if Arc::strong_count(&lock) == 2 {
        locks.remove(jid);
    }
}

/// Typing bracket around one message. Typing stops even when handling fails.
pub async fn handle_message(
    coordinator: &Coordinator,
    channels: &ChannelManager,
    message: &IncomingMessage,
) {
    let jid = message.user_id.as_str();
    channels.remember_route(jid, &message.channel).await;

    if let Err(e) = channels.start_typing(jid).await {
        tracing::debug!(jid, error = %e, "Typing indicator failed");
    }

    match coordinator.handle_inbound(message).await {
        Ok(Some(reply)) if !reply.trim().is_empty() => {
            if let Err(e) = channels.send_text(jid, &reply).await {
                tracing::warn!(jid, error = %e, "Reply delivery failed");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::error!(jid, error = %e, "Error handling message"),
    }

    if let Err(e) = channels.stop_typing(jid).await {
        tracing::debug!(jid, error = %e, "Typing indicator failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lock_for(
        locks: &Mutex<HashMap<String, Arc<Mutex<()>>>>,
        jid: &str,
    ) -> Arc<Mutex<()>> {
        locks.lock().await.entry(jid.to_string()).or_default().clone()
    }

    #[tokio::test]
    async fn idle_jid_locks_are_dropped() {
        let locks = Mutex::new(HashMap::new());

        let first = lock_for(&locks, "alice").await;
        let queued = lock_for(&locks, "alice").await;
        assert!(Arc::ptr_eq(&first, &queued));

        // Another message for the same jid is still waiting.
        release_lock(&locks, "alice", first).await;
        assert!(locks.lock().await.contains_key("alice"));

        release_lock(&locks, "alice", queued).await;
        assert!(locks.lock().await.is_empty());
    }
}
