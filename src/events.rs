//! Outbound notifications toward whatever renders the timer.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::progress::SessionReward;
use crate::timer::{TimerMode, TimerSnapshot};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompletedEvent {
    pub session_id: Option<String>,
    pub mode: TimerMode,
    pub task_name: Option<String>,
    /// Seconds.
    pub duration: u64,
    pub reward: Option<SessionReward>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum TimerEvent {
    StateChanged(TimerSnapshot),
    SessionCompleted(SessionCompletedEvent),
    PlaylistExhausted,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: TimerEvent);
}

/// Fan-out sink. Emitting with no subscribers is fine; slow subscribers
/// lag and skip.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<TimerEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: TimerEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let sink = BroadcastSink::new();
        sink.emit(TimerEvent::PlaylistExhausted);

        let mut first = sink.subscribe();
        let mut second = sink.subscribe();
        sink.emit(TimerEvent::PlaylistExhausted);

        assert_eq!(first.recv().await.unwrap(), TimerEvent::PlaylistExhausted);
        assert_eq!(second.recv().await.unwrap(), TimerEvent::PlaylistExhausted);
    }

    #[test]
    fn test_event_wire_shape() {
        let value = serde_json::to_value(TimerEvent::PlaylistExhausted).unwrap();
        assert_eq!(value["type"], "playlistExhausted");
    }
}
