//! Anwendungsprotokoll (Datenkanal)
//!
//! Zwei Nachrichtenarten laufen ueber den Datenkanal:
//!
//! ```text
//! { "type": "identity", "username": string }
//! { "type": "state", "state": { "x": number, "y": number } }
//! ```
//!
//! Keine Bestaetigungen, keine Sequenznummern: pro Feld gilt
//! last-write-wins beim Empfaenger.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tandem_core::Position;

use crate::error::DecodeError;

/// Dekodierte Anwendungsnachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppMessage {
    /// Identitaets-Ankuendigung
    Identity {
        #[serde(rename = "username")]
        display_name: String,
    },
    /// Zustands-Update
    State {
        #[serde(rename = "state")]
        position: Position,
    },
}

impl AppMessage {
    /// Wert des `type`-Felds
    pub fn typ(&self) -> &'static str {
        match self {
            Self::Identity { .. } => "identity",
            Self::State { .. } => "state",
        }
    }

    /// Kodiert die Nachricht fuer den Datenkanal
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Identity { display_name } => encode_identity(display_name),
            Self::State { position } => encode_state(*position),
        }
    }
}

/// Kodiert eine Identitaets-Ankuendigung
pub fn encode_identity(display_name: &str) -> Bytes {
    let wert = json!({ "type": "identity", "username": display_name });
    Bytes::from(wert.to_string())
}

/// Kodiert ein Zustands-Update
///
/// Nicht-endliche Koordinaten werden als `null` kodiert und beim
/// Empfaenger als Dekodierfehler verworfen.
pub fn encode_state(position: Position) -> Bytes {
    let wert = json!({ "type": "state", "state": { "x": position.x, "y": position.y } });
    Bytes::from(wert.to_string())
}

/// Dekodiert eine Nachricht vom Datenkanal
///
/// # Fehler
/// - `Format` bei ungueltigem JSON oder falscher Payload-Struktur
/// - `FehlendesFeld` wenn `type` fehlt oder kein String ist
/// - `UnbekannterTyp` bei anderem `type` als `identity` / `state`
pub fn decode(bytes: &[u8]) -> Result<AppMessage, DecodeError> {
    let wert: Value = serde_json::from_slice(bytes)?;

    let typ = wert
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::FehlendesFeld("type"))?
        .to_string();

    match typ.as_str() {
        "identity" | "state" => Ok(serde_json::from_value(wert)?),
        _ => Err(DecodeError::UnbekannterTyp(typ)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zustand_hin_und_zurueck() {
        for p in [
            Position::neu(0.0, 0.0),
            Position::neu(-12.5, 1e9),
            Position::neu(400.0, 250.0),
        ] {
            assert_eq!(decode(&encode_state(p)).unwrap(), AppMessage::State { position: p });
        }
    }

    #[test]
    fn zustand_mit_vollen_nachkommastellen() {
        for p in [
            Position::neu(943.9727437095257, -126.30655775241803),
            Position::neu(0.1 + 0.2, 1.0 / 3.0),
            Position::neu(f64::MAX, f64::MIN_POSITIVE),
        ] {
            assert_eq!(decode(&encode_state(p)).unwrap(), AppMessage::State { position: p });
        }
    }

    #[test]
    fn identitaet_hin_und_zurueck_auch_leer() {
        for name in ["", "Moritz", "ümlaut \"quoted\" 🚲"] {
            assert_eq!(
                decode(&encode_identity(name)).unwrap(),
                AppMessage::Identity {
                    display_name: name.to_string()
                }
            );
        }
    }

    #[test]
    fn wire_format_feldnamen() {
        let wert: Value = serde_json::from_slice(&encode_identity("anna")).unwrap();
        assert_eq!(wert, json!({ "type": "identity", "username": "anna" }));

        let wert: Value = serde_json::from_slice(&encode_state(Position::neu(1.0, 2.0))).unwrap();
        assert_eq!(wert, json!({ "type": "state", "state": { "x": 1.0, "y": 2.0 } }));
    }

    #[test]
    fn browser_nachricht_mit_ganzzahlen() {
        let msg = decode(br#"{"type":"state","state":{"x":400,"y":250}}"#).unwrap();
        assert_eq!(msg, AppMessage::State { position: Position::neu(400.0, 250.0) });
    }

    #[test]
    fn kaputte_bytes_sind_dekodierfehler() {
        assert!(matches!(decode(b"\xff\xfe"), Err(DecodeError::Format(_))));
        assert!(matches!(decode(b"{\"type\":"), Err(DecodeError::Format(_))));
        assert!(matches!(decode(b""), Err(DecodeError::Format(_))));
        assert_eq!(decode(b"[1,2,3]"), Err(DecodeError::FehlendesFeld("type")));
        assert_eq!(decode(br#"{"type":5}"#), Err(DecodeError::FehlendesFeld("type")));
        assert!(matches!(
            decode(br#"{"type":"state","state":{"x":1}}"#),
            Err(DecodeError::Format(_))
        ));
        assert!(matches!(
            decode(br#"{"type":"identity","username":42}"#),
            Err(DecodeError::Format(_))
        ));
    }

    #[test]
    fn unbekannter_typ() {
        assert_eq!(
            decode(br#"{"type":"chat","text":"hi"}"#),
            Err(DecodeError::UnbekannterTyp("chat".into()))
        );
    }

    #[test]
    fn nicht_endliche_koordinaten_werden_verworfen() {
        let bytes = encode_state(Position::neu(f64::NAN, 1.0));
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn typ_und_encode() {
        let msg = AppMessage::Identity {
            display_name: "x".into(),
        };
        assert_eq!(msg.typ(), "identity");
        assert_eq!(decode(&msg.encode()).unwrap(), msg);
    }
}
