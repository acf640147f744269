//! Slot holding the most recent raw inbound message.

use chrono::{DateTime, Utc};
use critcast_protocol::Frame;

/// The last frame received, whether or not it was routed.
#[derive(Debug, Clone, Default)]
pub struct LastMessage {
    latest: Option<(Frame, DateTime<Utc>)>,
}

impl LastMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slot with `frame`, stamped with the current time.
    pub fn replace(&mut self, frame: Frame) {
        self.latest = Some((frame, Utc::now()));
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.latest.as_ref().map(|(frame, _)| frame)
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.latest.as_ref().map(|(_, at)| *at)
    }

    /// `[HH:MM:SS] {pretty json}`, or `None` when empty.
    pub fn render(&self) -> Option<String> {
        let (frame, at) = self.latest.as_ref()?;
        let body = serde_json::to_string_pretty(frame).unwrap_or_else(|_| frame.event.clone());
        Some(format!("[{}] {body}", at.format("%H:%M:%S")))
    }
}
