//! Dekodierfehler fuer Signaling- und Anwendungsnachrichten

use tandem_core::TandemError;
use thiserror::Error;

/// Fehler beim Dekodieren einer eingehenden Nachricht
///
/// Wird immer lokal behandelt: die betroffene Nachricht wird verworfen,
/// der Kanal bleibt bestehen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Kein gueltiges JSON oder falsche Umschlag-Struktur
    #[error("Ungueltiges Format: {0}")]
    Format(String),

    /// Pflichtfeld fehlt
    #[error("Feld fehlt: {0}")]
    FehlendesFeld(&'static str),

    /// Unbekannter Wert im `type`-Feld
    #[error("Unbekannter Typ: {0}")]
    UnbekannterTyp(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Format(e.to_string())
    }
}

impl From<DecodeError> for TandemError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::UnbekannterTyp(typ) => TandemError::UnbekannterNachrichtentyp(typ),
            andere => TandemError::Dekodierung(andere.to_string()),
        }
    }
}
