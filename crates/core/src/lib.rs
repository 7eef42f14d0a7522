// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! parley-core: domain types for the parley chat session core.
//!
//! This crate provides the wire protocol, error classification, entity model,
//! sync checkpoint and persistence boundary shared by the `parley` client.

pub mod chat_error;
pub mod checkpoint;
pub mod clock;
pub mod codec;
pub mod error;
pub mod model;
pub mod protocol;
pub mod store;

pub use chat_error::{ChatError, ErrorClass, ErrorCode};
pub use checkpoint::SyncCheckpoint;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, Frame, JsonCodec, ParseError};
pub use error::{Error, Result};
pub use model::{
    split_cid, Attachment, Channel, Message, MutationKind, PendingMutation, Reaction, SyncStatus,
    UploadState, User,
};
pub use protocol::{
    ChannelEvent, ChatEvent, ConnectedEvent, ErrorBody, ErrorEnvelope, HealthEvent,
    MarkAllReadEvent, MessageEvent, ReactionEvent, TypingEvent,
};
pub use store::{SqliteStore, Store};
