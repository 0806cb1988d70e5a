//! tandem-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert die Nachrichten, die zwischen zwei Tandem-Knoten
//! ausgetauscht werden:
//!
//! - `signal` – Verhandlungsnachrichten (Offer/Answer/Candidate) ueber das Relay
//! - `app`    – Anwendungsnachrichten (Identitaet, Zustand) ueber den Datenkanal
//! - `wire`   – Length-Prefix-Framing fuer TCP-Verbindungen

pub mod app;
pub mod error;
pub mod signal;
pub mod wire;

pub use app::{decode, encode_identity, encode_state, AppMessage};
pub use error::DecodeError;
pub use signal::{IceCandidate, RelayFrame, SdpDescriptor, SdpType, SignalKind, SignalMessage};
