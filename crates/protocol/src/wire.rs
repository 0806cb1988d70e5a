//! Wire-Format fuer TCP-Verbindungen zum Relay
//!
//! Jeder Frame ist ein u32-Laengenfeld (big-endian) gefolgt von einem
//! JSON-Payload:
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE), ohne Laengenfeld | JSON      |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Das Framing selbst uebernimmt `LengthDelimitedCodec`; `FrameCodec`
//! legt nur die typisierte (De-)Serialisierung darueber.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Maximale Payload-Groesse eines Relay-Frames (64 KiB)
///
/// Signaling-Nachrichten tragen nur Deskriptoren und Kandidaten.
pub const MAX_FRAME_GROESSE: usize = 64 * 1024;

fn json_fehler(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("Ungueltiges JSON im Frame: {e}"))
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Typisierter Codec fuer `Framed<TcpStream, _>`
///
/// Relay-Client und Relay-Server verwenden beide `FrameCodec<RelayFrame>`.
pub struct FrameCodec<T> {
    laenge: LengthDelimitedCodec,
    _typ: PhantomData<fn() -> T>,
}

impl<T> FrameCodec<T> {
    pub fn new() -> Self {
        Self::mit_max_groesse(MAX_FRAME_GROESSE)
    }

    /// Codec mit eigener Obergrenze fuer die Payload-Groesse
    pub fn mit_max_groesse(max: usize) -> Self {
        Self {
            laenge: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(max)
                .new_codec(),
            _typ: PhantomData,
        }
    }

    pub fn max_groesse(&self) -> usize {
        self.laenge.max_frame_length()
    }
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FrameCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("max_groesse", &self.max_groesse())
            .finish()
    }
}

impl<T: DeserializeOwned> Decoder for FrameCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<T>> {
        match self.laenge.decode(src)? {
            Some(payload) => serde_json::from_slice(&payload).map(Some).map_err(json_fehler),
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for FrameCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> io::Result<()> {
        let json = serde_json::to_vec(&item).map_err(json_fehler)?;
        self.laenge.encode(Bytes::from(json), dst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
