// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound frame classification.

use std::sync::Arc;

use parley_core::{ChatError, ChatEvent, Codec, ConnectedEvent, Frame};

/// What the machine should do with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Route to the error handler.
    Error(ChatError),
    /// The server accepted the connection.
    Ack(ConnectedEvent),
    /// Deliver to listeners.
    Event(ChatEvent),
}

/// Decodes frames for one connection at a time.
///
/// Until the connection ack has been seen, every frame must be that ack.
pub struct EventDispatcher {
    codec: Arc<dyn Codec>,
    ack_received: bool,
}

impl EventDispatcher {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        EventDispatcher {
            codec,
            ack_received: false,
        }
    }

    /// A new transport opened; require a fresh ack.
    pub fn expect_ack(&mut self) {
        self.ack_received = false;
    }

    pub fn dispatch(&mut self, raw: &str) -> Dispatch {
        let decoded = if self.ack_received {
            self.codec.decode(raw)
        } else {
            self.codec.decode_ack(raw)
        };

        match decoded {
            Ok(Frame::Error(err)) => Dispatch::Error(err),
            Ok(Frame::Event(ChatEvent::Connected(ack))) => {
                self.ack_received = true;
                Dispatch::Ack(ack)
            }
            Ok(Frame::Event(event)) => Dispatch::Event(event),
            Err(e) => {
                tracing::debug!("failed to decode frame: {}", e);
                Dispatch::Error(e.into_chat_error())
            }
        }
    }
}
