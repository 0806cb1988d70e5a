//! Fehlertypen fuer den Peer-Transport

use tandem_core::TandemError;
use thiserror::Error;

/// Fehlertyp fuer Transport-Backends und Datenkanaele
#[derive(Debug, Error)]
pub enum TransportError {
    /// Kanal ist geschlossen oder noch nicht offen
    #[error("Datenkanal nicht offen")]
    KanalGeschlossen,

    /// Nachricht ueberschreitet die Framegrenze des Backends
    #[error("Nachricht zu gross: {laenge} Bytes (max {max})")]
    ZuGross { laenge: usize, max: usize },

    /// Deskriptor passt nicht zum Backend
    #[error("Ungueltiger Deskriptor: {0}")]
    Deskriptor(String),

    /// Kein Peer mit dieser Kennung bekannt
    #[error("Unbekannter Peer: {0}")]
    UnbekannterPeer(String),

    /// IO-Fehler (Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus dem WebRTC-Stack
    #[error("WebRTC-Fehler: {0}")]
    WebRtc(String),
}

impl From<TransportError> for TandemError {
    fn from(e: TransportError) -> Self {
        TandemError::TransportNichtVerfuegbar(e.to_string())
    }
}

/// Result-Typ fuer den Peer-Transport
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geschlossener_kanal_ist_nicht_fatal() {
        let e: TandemError = TransportError::KanalGeschlossen.into();
        assert!(matches!(e, TandemError::TransportNichtVerfuegbar(_)));
        assert!(!e.ist_fatal());
    }
}
