// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Messages exchanged between handlers.
//!
//! A [`Message`] is an immutable payload plus timing metadata. The payload
//! carries a [`PayloadKind`] (what it is) and a [`Location`] (where its bytes
//! live). The runtime only ever looks at those two tags; the bytes themselves
//! belong to the handlers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::ports::Capabilities;

/// What a payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Video,
    Audio,
    Data,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Video => write!(f, "video"),
            PayloadKind::Audio => write!(f, "audio"),
            PayloadKind::Data => write!(f, "data"),
        }
    }
}

/// Where a payload's bytes reside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Host (CPU) memory.
    Host,
    /// Memory owned by a compute device pool.
    Device { pool: u32 },
}

impl Location {
    /// The capability a port must declare to carry this location.
    pub fn capability(&self) -> Capabilities {
        match self {
            Location::Host => Capabilities::HOST,
            Location::Device { .. } => Capabilities::DEVICE,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host => write!(f, "host"),
            Location::Device { pool } => write!(f, "device:{}", pool),
        }
    }
}

/// Payload bytes tagged with kind and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    kind: PayloadKind,
    location: Location,
    data: Bytes,
}

impl Payload {
    pub fn new(kind: PayloadKind, location: Location, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            location,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Kind-specific metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaInfo {
    Video { width: u32, height: u32 },
    Audio { channels: u16, sample_rate: u32 },
    Data,
}

impl MediaInfo {
    pub fn kind(&self) -> PayloadKind {
        match self {
            MediaInfo::Video { .. } => PayloadKind::Video,
            MediaInfo::Audio { .. } => PayloadKind::Audio,
            MediaInfo::Data => PayloadKind::Data,
        }
    }
}

/// Immutable payload plus metadata.
///
/// Cloning is cheap: the bytes are reference counted. The sequence number is
/// stamped by the output port that accepts the message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    payload: Payload,
    timestamp: f64,
    sequence_number: u64,
    info: MediaInfo,
}

impl Message {
    /// Host-resident video frame.
    pub fn video(data: impl Into<Bytes>, width: u32, height: u32, timestamp: f64) -> Self {
        Self::host(MediaInfo::Video { width, height }, data, timestamp)
    }

    /// Host-resident audio chunk.
    pub fn audio(data: impl Into<Bytes>, channels: u16, sample_rate: u32, timestamp: f64) -> Self {
        Self::host(
            MediaInfo::Audio {
                channels,
                sample_rate,
            },
            data,
            timestamp,
        )
    }

    /// Host-resident generic data.
    pub fn generic(data: impl Into<Bytes>, timestamp: f64) -> Self {
        Self::host(MediaInfo::Data, data, timestamp)
    }

    fn host(info: MediaInfo, data: impl Into<Bytes>, timestamp: f64) -> Self {
        Self {
            payload: Payload::new(info.kind(), Location::Host, data),
            timestamp,
            sequence_number: 0,
            info,
        }
    }

    /// Same message with its payload placed at `location` and replaced by `data`.
    ///
    /// Used by location adapters after moving the bytes.
    pub fn relocated(&self, location: Location, data: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::new(self.payload.kind, location, data),
            timestamp: self.timestamp,
            sequence_number: self.sequence_number,
            info: self.info,
        }
    }

    /// Re-tag the location without touching the bytes.
    pub fn at(mut self, location: Location) -> Self {
        self.payload.location = location;
        self
    }

    pub(crate) fn with_sequence(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn kind(&self) -> PayloadKind {
        self.payload.kind
    }

    pub fn location(&self) -> Location {
        self.payload.location
    }

    pub fn data(&self) -> &Bytes {
        &self.payload.data
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn info(&self) -> MediaInfo {
        self.info
    }

    /// `(width, height)` for video messages.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.info {
            MediaInfo::Video { width, height } => Some((width, height)),
            _ => None,
        }
    }

    /// `(channels, sample_rate)` for audio messages.
    pub fn audio_format(&self) -> Option<(u16, u32)> {
        match self.info {
            MediaInfo::Audio {
                channels,
                sample_rate,
            } => Some((channels, sample_rate)),
            _ => None,
        }
    }
}
