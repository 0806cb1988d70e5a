//! Signaling-Protokoll (Verhandlung ueber das Relay)
//!
//! Definiert die Nachrichten, die zwei Knoten ueber den externen
//! Signaling-Kanal austauschen, um die Peer-Verbindung aufzubauen.
//!
//! ## Design
//! - JSON-kompatibel zum Browser-Format (`RTCSessionDescriptionInit`,
//!   `RTCIceCandidateInit`)
//! - `sdp` und `candidate` bleiben im Umschlag opake JSON-Objekte und
//!   werden erst vom Negotiator geprueft. Ein kaputter Deskriptor laesst
//!   damit die Sitzung scheitern, nicht das Relay.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tandem_core::PeerId;

use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// Nachrichtentyp
// ---------------------------------------------------------------------------

/// Art einer Signaling-Nachricht
///
/// Unbekannte Typen bleiben erhalten, damit der Negotiator sie als
/// `UnbekannterNachrichtentyp` melden kann statt beim Parsen zu scheitern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    Unbekannt(String),
}

impl From<String> for SignalKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "candidate" => Self::Candidate,
            _ => Self::Unbekannt(s),
        }
    }
}

impl From<SignalKind> for String {
    fn from(k: SignalKind) -> Self {
        match k {
            SignalKind::Offer => "offer".into(),
            SignalKind::Answer => "answer".into(),
            SignalKind::Candidate => "candidate".into(),
            SignalKind::Unbekannt(s) => s,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offer => f.write_str("offer"),
            Self::Answer => f.write_str("answer"),
            Self::Candidate => f.write_str("candidate"),
            Self::Unbekannt(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Deskriptoren
// ---------------------------------------------------------------------------

/// Art eines Session-Deskriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session-Deskriptor (`{ "type": "offer", "sdp": "..." }`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpDescriptor {
    #[serde(rename = "type")]
    pub typ: SdpType,
    pub sdp: String,
}

impl SdpDescriptor {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            typ: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            typ: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    fn als_json(&self) -> Value {
        json!({ "type": self.typ, "sdp": self.sdp })
    }
}

/// Konnektivitaets-Kandidat (`RTCIceCandidateInit`-kompatibel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Kandidat ohne Media-Zuordnung
    pub fn neu(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }

    fn als_json(&self) -> Value {
        json!(self)
    }
}

// ---------------------------------------------------------------------------
// Umschlag
// ---------------------------------------------------------------------------

/// Signaling-Nachricht, wie sie ueber das Relay laeuft
///
/// ```text
/// { type: "offer"|"answer"|"candidate", from?: string, to: string, sdp?: object, candidate?: object }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
    pub to: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
}

impl SignalMessage {
    /// Erstellt ein Offer an `to`
    pub fn offer(to: PeerId, beschreibung: &SdpDescriptor) -> Self {
        Self {
            kind: SignalKind::Offer,
            from: None,
            to,
            sdp: Some(beschreibung.als_json()),
            candidate: None,
        }
    }

    /// Erstellt ein Answer an `to`
    pub fn answer(to: PeerId, beschreibung: &SdpDescriptor) -> Self {
        Self {
            kind: SignalKind::Answer,
            from: None,
            to,
            sdp: Some(beschreibung.als_json()),
            candidate: None,
        }
    }

    /// Erstellt eine Kandidaten-Nachricht an `to`
    pub fn candidate(to: PeerId, kandidat: &IceCandidate) -> Self {
        Self {
            kind: SignalKind::Candidate,
            from: None,
            to,
            sdp: None,
            candidate: Some(kandidat.als_json()),
        }
    }

    /// Setzt den Absender (Relay-Seite)
    pub fn mit_absender(mut self, from: PeerId) -> Self {
        self.from = Some(from);
        self
    }

    /// Liest den Session-Deskriptor aus dem `sdp`-Feld
    pub fn beschreibung(&self) -> Result<SdpDescriptor, DecodeError> {
        let wert = self.sdp.clone().ok_or(DecodeError::FehlendesFeld("sdp"))?;
        Ok(serde_json::from_value(wert)?)
    }

    /// Liest den Kandidaten aus dem `candidate`-Feld
    pub fn kandidat(&self) -> Result<IceCandidate, DecodeError> {
        let wert = self
            .candidate
            .clone()
            .ok_or(DecodeError::FehlendesFeld("candidate"))?;
        Ok(serde_json::from_value(wert)?)
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Relay-Frames (TCP-Relay)
// ---------------------------------------------------------------------------

/// Frame zwischen Knoten und Relay-Server
///
/// Der erste Frame einer Verbindung muss `Register` sein. Danach werden
/// nur noch `Signal`-Frames weitergeleitet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum RelayFrame {
    Register { peer_id: PeerId },
    Signal { message: SignalMessage },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
