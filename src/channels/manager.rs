//! Owns the running channels and routes outbound traffic by jid.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::RwLock;

use crate::channels::{Channel, MessageStream, Outbound, Presence};
use crate::error::ChannelError;

/// Fans in every channel's stream and sends replies back on the channel
/// each jid was last seen on.
///
/// Jids with no recorded route (fan-out targets who never wrote to the bot)
/// go to the first registered channel.
#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Arc<dyn Channel>>,
    routes: RwLock<HashMap<String, String>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Arc<dyn Channel>) {
        tracing::info!(channel = channel.name(), "Channel registered");
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start every channel and merge their streams.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            streams.push(channel.start().await?);
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Record that `jid` is reachable on `channel`.
    ///
    /// Only jids seen off the default channel are kept, so the table stays
    /// as small as the non-default audience.
    pub async fn remember_route(&self, jid: &str, channel: &str) {
        let is_default = self.channels.first().is_some_and(|c| c.name() == channel);
        let mut routes = self.routes.write().await;
        if is_default {
            routes.remove(jid);
        } else if routes.get(jid).map(String::as_str) != Some(channel) {
            routes.insert(jid.to_string(), channel.to_string());
        }
    }

    async fn route(&self, jid: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        let name = self.routes.read().await.get(jid).cloned();
        let by_name = name.and_then(|n| self.channels.iter().find(|c| c.name() == n).cloned());
        by_name
            .or_else(|| self.channels.first().cloned())
            .ok_or_else(|| ChannelError::NoRoute(jid.to_string()))
    }

    pub async fn health_check_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.health_check().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel health check failed");
            }
        }
    }

    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
    }

    /// Stream that never yields; used when no channel is configured.
    pub fn idle_stream() -> MessageStream {
        Box::pin(stream::pending())
    }
}

#[async_trait]
impl Outbound for ChannelManager {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), ChannelError> {
        self.route(jid).await?.send_text(jid, text).await
    }

    async fn start_typing(&self, jid: &str) -> Result<(), ChannelError> {
        self.route(jid)
            .await?
            .send_presence(jid, Presence::Typing)
            .await
    }

    async fn stop_typing(&self, jid: &str) -> Result<(), ChannelError> {
        self.route(jid)
            .await?
            .send_presence(jid, Presence::Paused)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt;

    use super::*;
    use crate::channels::IncomingMessage;

    /// Channel that records sends and emits a fixed set of messages.
    struct FakeChannel {
        name: &'static str,
        inbound: Vec<&'static str>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeChannel {
        fn new(name: &'static str, inbound: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                inbound,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Channel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let msgs: Vec<_> = self
                .inbound
                .iter()
                .map(|t| IncomingMessage::new(self.name, "u1", *t))
                .collect();
            Ok(Box::pin(stream::iter(msgs)))
        }

        async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_presence(&self, _: &str, _: Presence) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn merges_streams() {
        let mut manager = ChannelManager::new();
        manager.add(FakeChannel::new("a", vec!["one", "two"]));
        manager.add(FakeChannel::new("b", vec!["three"]));
        let stream = manager.start_all().await.unwrap();
        let msgs: Vec<IncomingMessage> = stream.collect().await;
        assert_eq!(msgs.len(), 3);
    }

    #[tokio::test]
    async fn routes_to_last_seen_channel_else_default() {
        let a = FakeChannel::new("a", vec![]);
        let b = FakeChannel::new("b", vec![]);
        let mut manager = ChannelManager::new();
        manager.add(a.clone());
        manager.add(b.clone());

        manager.remember_route("alice", "b").await;
        manager.send_text("alice", "hi").await.unwrap();
        manager.send_text("stranger", "hello").await.unwrap();

        assert_eq!(b.sent.lock().unwrap().as_slice(), &[("alice".to_string(), "hi".to_string())]);
        assert_eq!(a.sent.lock().unwrap()[0].0, "stranger");
    }

    #[tokio::test]
    async fn default_channel_routes_are_not_stored() {
        let a = FakeChannel::new("a", vec![]);
        let b = FakeChannel::new("b", vec![]);
        let mut manager = ChannelManager::new();
        manager.add(a.clone());
        manager.add(b.clone());

        manager.remember_route("alice", "b").await;
        manager.remember_route("bob", "a").await;
        assert_eq!(manager.routes.read().await.len(), 1);

        // Moving back to the default channel drops the entry.
        manager.remember_route("alice", "a").await;
        assert!(manager.routes.read().await.is_empty());
        manager.send_text("alice", "hi").await.unwrap();
        assert_eq!(a.sent.lock().unwrap()[0].0, "alice");
        assert!(b.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_channels_is_no_route() {
        let manager = ChannelManager::new();
        let err = manager.send_text("x", "y").await.unwrap_err();
        assert!(matches!(err, ChannelError::NoRoute(_)));
    }
}
