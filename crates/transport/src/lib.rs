//! tandem-transport – Peer-Transport und Datenkanaele
//!
//! Der Transport ist eine Sans-IO-Naht: Der Negotiator gibt Befehle
//! (`TransportCommand`) ab, das Backend meldet Ergebnisse als Ereignisse
//! (`TransportEvent`) ueber einen Kanal zurueck. `ausfuehren` blockiert nie.
//!
//! ## Architektur
//!
//! ```text
//! SessionNegotiator ──TransportCommand──> PeerTransport (Backend)
//!                                               |
//!           Node-Schleife <──TransportEvent─────+
//!                 |
//!                 +-- Verbunden { kanal } ──> ChannelMultiplexer
//! ```
//!
//! ## Backends
//! - `MemoryTransport` – prozessintern, deterministisch (Tests)
//! - `TcpTransport`    – Initiator lauscht, Responder verbindet sich
//! - `WebRtcTransport` – echte ICE/DTLS/SCTP-Datenkanaele (Feature `webrtc`)

pub mod error;
pub mod memory;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod tcp;

use bytes::Bytes;
use tandem_core::PeerId;
use tandem_protocol::{IceCandidate, SdpDescriptor};

pub use error::{TransportError, TransportResult};
pub use memory::{MemoryNetz, MemoryTransport};
#[cfg(feature = "webrtc")]
pub use rtc::WebRtcTransport;
pub use tcp::TcpTransport;

// ---------------------------------------------------------------------------
// Datenkanal
// ---------------------------------------------------------------------------

/// Schwache Referenz auf einen registrierten Datenkanal
///
/// Wird vom Multiplexer vergeben und in der Peer-Sitzung gehalten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelRef(pub u64);

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kanal#{}", self.0)
    }
}

/// Handle auf einen bidirektionalen Datenkanal zu genau einem Peer
///
/// Innerhalb eines Kanals bleibt die Reihenfolge erhalten (FIFO).
/// `senden` reiht nur ein und blockiert nie.
pub trait DataChannel: Send {
    /// Gibt true zurueck solange der Kanal Daten annimmt
    fn ist_offen(&self) -> bool;

    /// Reiht eine Nachricht zum Versand ein
    fn senden(&self, daten: Bytes) -> TransportResult<()>;
}

// ---------------------------------------------------------------------------
// Befehle und Ereignisse
// ---------------------------------------------------------------------------

/// Befehl des Negotiators an das Transport-Backend
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    /// Lokales Offer fuer `peer_id` erzeugen (Initiator)
    AngebotErstellen { peer_id: PeerId },
    /// Entferntes Offer anwenden und ein Answer erzeugen (Responder)
    AntwortErstellen {
        peer_id: PeerId,
        angebot: SdpDescriptor,
    },
    /// Entferntes Answer anwenden (Initiator)
    AntwortAnwenden {
        peer_id: PeerId,
        antwort: SdpDescriptor,
    },
    /// Entfernten Konnektivitaets-Kandidaten anwenden
    KandidatHinzufuegen {
        peer_id: PeerId,
        kandidat: IceCandidate,
    },
    /// Verbindung zu `peer_id` abbauen
    Schliessen { peer_id: PeerId },
}

impl TransportCommand {
    /// Peer, auf den sich der Befehl bezieht
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::AngebotErstellen { peer_id }
            | Self::AntwortErstellen { peer_id, .. }
            | Self::AntwortAnwenden { peer_id, .. }
            | Self::KandidatHinzufuegen { peer_id, .. }
            | Self::Schliessen { peer_id } => peer_id,
        }
    }
}

/// Ereignis eines Transport-Backends
pub enum TransportEvent {
    /// Lokaler Deskriptor (Offer oder Answer) ist bereit zum Versand
    LokaleBeschreibung {
        peer_id: PeerId,
        beschreibung: SdpDescriptor,
    },
    /// Lokaler Kandidat ist bereit zum Versand
    LokalerKandidat {
        peer_id: PeerId,
        kandidat: IceCandidate,
    },
    /// Transport ist bereit, der Datenkanal wird uebergeben
    Verbunden {
        peer_id: PeerId,
        kanal: Box<dyn DataChannel>,
    },
    /// Datenkanal ist offen (genau einmal pro Kanal)
    KanalOffen { peer_id: PeerId },
    /// Nachricht auf dem Datenkanal empfangen
    KanalNachricht { peer_id: PeerId, daten: Bytes },
    /// Datenkanal wurde geschlossen (genau einmal pro Kanal)
    KanalGeschlossen { peer_id: PeerId },
    /// Verhandlung oder Verbindung ist gescheitert
    Fehlgeschlagen { peer_id: PeerId, grund: String },
}

impl TransportEvent {
    /// Peer, auf den sich das Ereignis bezieht
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::LokaleBeschreibung { peer_id, .. }
            | Self::LokalerKandidat { peer_id, .. }
            | Self::Verbunden { peer_id, .. }
            | Self::KanalOffen { peer_id }
            | Self::KanalNachricht { peer_id, .. }
            | Self::KanalGeschlossen { peer_id }
            | Self::Fehlgeschlagen { peer_id, .. } => peer_id,
        }
    }
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LokaleBeschreibung {
                peer_id,
                beschreibung,
            } => f
                .debug_struct("LokaleBeschreibung")
                .field("peer_id", peer_id)
                .field("typ", &beschreibung.typ)
                .finish(),
            Self::LokalerKandidat { peer_id, kandidat } => f
                .debug_struct("LokalerKandidat")
                .field("peer_id", peer_id)
                .field("kandidat", &kandidat.candidate)
                .finish(),
            Self::Verbunden { peer_id, kanal } => f
                .debug_struct("Verbunden")
                .field("peer_id", peer_id)
                .field("offen", &kanal.ist_offen())
                .finish(),
            Self::KanalOffen { peer_id } => {
                f.debug_struct("KanalOffen").field("peer_id", peer_id).finish()
            }
            Self::KanalNachricht { peer_id, daten } => f
                .debug_struct("KanalNachricht")
                .field("peer_id", peer_id)
                .field("bytes", &daten.len())
                .finish(),
            Self::KanalGeschlossen { peer_id } => f
                .debug_struct("KanalGeschlossen")
                .field("peer_id", peer_id)
                .finish(),
            Self::Fehlgeschlagen { peer_id, grund } => f
                .debug_struct("Fehlgeschlagen")
                .field("peer_id", peer_id)
                .field("grund", grund)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// PeerTransport
// ---------------------------------------------------------------------------

/// Transport-Backend, das Befehle des Negotiators ausfuehrt
///
/// Ergebnisse kommen asynchron als `TransportEvent` ueber den Empfaenger,
/// den das Backend bei der Erstellung zurueckgibt.
pub trait PeerTransport {
    fn ausfuehren(&mut self, befehl: TransportCommand);
}

impl<T: PeerTransport + ?Sized> PeerTransport for Box<T> {
    fn ausfuehren(&mut self, befehl: TransportCommand) {
        (**self).ausfuehren(befehl)
    }
}
