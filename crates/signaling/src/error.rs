//! Fehlertypen fuer Relay und Sitzungsverhandlung

use tandem_core::TandemError;
use tandem_protocol::DecodeError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Teil
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Nachricht passt nicht zum Zustand der Sitzung
    #[error("Protokollverletzung: {0}")]
    Protokollverletzung(String),

    /// Unbekannter `type` im Signaling-Umschlag
    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterNachrichtentyp(String),

    /// Deskriptor oder Kandidat nicht lesbar
    #[error("Ungueltiger Deskriptor: {0}")]
    Deskriptor(#[from] DecodeError),

    /// Verbindung zum Relay ist beendet
    #[error("Relay-Verbindung geschlossen")]
    RelayGeschlossen,

    /// Relay-Server hat die Registrierung abgelehnt oder nicht erhalten
    #[error("Registrierung fehlgeschlagen: {0}")]
    Registrierung(String),
}

impl SignalingError {
    /// Erstellt eine Protokollverletzung
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokollverletzung(msg.into())
    }
}

impl From<SignalingError> for TandemError {
    fn from(e: SignalingError) -> Self {
        match e {
            SignalingError::Protokollverletzung(m) => TandemError::Protokollverletzung(m),
            SignalingError::UnbekannterNachrichtentyp(t) => TandemError::UnbekannterNachrichtentyp(t),
            SignalingError::Deskriptor(d) => d.into(),
            SignalingError::RelayGeschlossen => {
                TandemError::TransportNichtVerfuegbar("Relay geschlossen".into())
            }
            andere => TandemError::Intern(andere.to_string()),
        }
    }
}

/// Result-Typ fuer den Signaling-Teil
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laufzeitfehler_sind_nicht_fatal() {
        let fehler: Vec<TandemError> = vec![
            SignalingError::protokoll("Answer ohne Offer").into(),
            SignalingError::UnbekannterNachrichtentyp("renegotiate".into()).into(),
            SignalingError::Deskriptor(DecodeError::FehlendesFeld("sdp")).into(),
        ];
        assert!(fehler.iter().all(|f| !f.ist_fatal()));
        assert!(matches!(fehler[0], TandemError::Protokollverletzung(_)));
        assert!(matches!(fehler[1], TandemError::UnbekannterNachrichtentyp(_)));
        assert!(matches!(fehler[2], TandemError::Dekodierung(_)));
    }
}
