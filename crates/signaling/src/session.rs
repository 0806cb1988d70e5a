//! Peer-Sitzung – Zustand einer Verbindung zu genau einem entfernten Peer
//!
//! ## Zustandsmaschine
//! ```text
//! New -> Negotiating -> Connected -> Closed
//!  |         |              |
//!  +---------+--------------+------> Failed
//! ```
//!
//! Closed und Failed sind Endzustaende; der Negotiator entfernt die
//! Sitzung danach aus seiner Tabelle. Die Rolle steht ab der Erstellung fest.

use std::time::Instant;
use tandem_core::PeerId;
use tandem_protocol::IceCandidate;
use tandem_transport::ChannelRef;

use crate::error::{SignalingError, SignalingResult};

/// Rolle des lokalen Knotens in einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Erzeugt das Offer
    Initiator,
    /// Beantwortet ein Offer
    Responder,
}

/// Zustand des Peer-Transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Negotiating,
    Connected,
    Closed,
    Failed,
}

impl TransportState {
    /// Gibt true zurueck fuer Closed und Failed
    pub fn ist_beendet(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Prueft ob der Uebergang `self -> nach` erlaubt ist
    pub fn uebergang_erlaubt(self, nach: TransportState) -> bool {
        use TransportState::*;
        matches!(
            (self, nach),
            (New, Negotiating)
                | (Negotiating, Connected)
                | (New | Negotiating | Connected, Closed)
                | (New | Negotiating | Connected, Failed)
        )
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Maximale Anzahl gepufferter Kandidaten je Peer
pub const MAX_GEPUFFERTE_KANDIDATEN: usize = 64;

/// Sitzung zu einem entfernten Peer
#[derive(Debug, Clone)]
pub struct PeerSession {
    peer_id: PeerId,
    rolle: Role,
    zustand: TransportState,
    kanal: Option<ChannelRef>,
    pub(crate) remote_beschreibung_gesetzt: bool,
    pub(crate) gepufferte_kandidaten: Vec<IceCandidate>,
    pub(crate) verhandlung_seit: Option<Instant>,
}

impl PeerSession {
    /// Neue Sitzung im Zustand New
    pub fn neu(peer_id: PeerId, rolle: Role) -> Self {
        Self {
            peer_id,
            rolle,
            zustand: TransportState::New,
            kanal: None,
            remote_beschreibung_gesetzt: false,
            gepufferte_kandidaten: Vec::new(),
            verhandlung_seit: None,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn rolle(&self) -> Role {
        self.rolle
    }

    pub fn zustand(&self) -> TransportState {
        self.zustand
    }

    /// Referenz auf den Datenkanal (nur im Zustand Connected gesetzt)
    pub fn kanal(&self) -> Option<ChannelRef> {
        self.kanal
    }

    /// Anzahl der Kandidaten, die auf die entfernte Beschreibung warten
    pub fn gepufferte_kandidaten(&self) -> usize {
        self.gepufferte_kandidaten.len()
    }

    /// Fuehrt einen Zustandsuebergang aus
    ///
    /// # Fehler
    /// `Protokollverletzung` wenn der Uebergang nicht erlaubt ist
    pub(crate) fn uebergang(&mut self, nach: TransportState) -> SignalingResult<()> {
        if !self.zustand.uebergang_erlaubt(nach) {
            return Err(SignalingError::protokoll(format!(
                "Uebergang {} -> {} fuer {} nicht erlaubt",
                self.zustand, nach, self.peer_id
            )));
        }
        tracing::debug!(peer_id = %self.peer_id, von = %self.zustand, nach = %nach, "Sitzungszustand");
        self.zustand = nach;
        if nach != TransportState::Negotiating {
            self.verhandlung_seit = None;
        }
        Ok(())
    }

    pub(crate) fn verbunden(&mut self, kanal: ChannelRef) -> SignalingResult<()> {
        self.uebergang(TransportState::Connected)?;
        self.kanal = Some(kanal);
        Ok(())
    }

    /// Puffert einen Kandidaten; gibt false zurueck wenn der Puffer voll ist
    pub(crate) fn kandidat_puffern(&mut self, kandidat: IceCandidate) -> bool {
        if self.gepufferte_kandidaten.len() >= MAX_GEPUFFERTE_KANDIDATEN {
            return false;
        }
        self.gepufferte_kandidaten.push(kandidat);
        true
    }
}
