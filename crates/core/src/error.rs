//! Fehlertypen fuer Tandem
//!
//! Zentraler Fehler-Enum fuer die prozessweite Fehler-Taxonomie.
//! Untermodule definieren eigene Fehler und koennen via `From` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Tandem
pub type Result<T> = std::result::Result<T, TandemError>;

/// Alle moeglichen Fehler im Tandem-System
#[derive(Debug, Error)]
pub enum TandemError {
    // --- Verhandlung ---
    /// Nachricht ausserhalb der erwarteten Reihenfolge (z.B. Answer ohne Offer)
    #[error("Protokollverletzung: {0}")]
    Protokollverletzung(String),

    /// Unbekannter `type` im Umschlag (Signaling oder Anwendung)
    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterNachrichtentyp(String),

    // --- Anwendung ---
    /// Payload ist kein gueltiger Umschlag
    #[error("Dekodierung fehlgeschlagen: {0}")]
    Dekodierung(String),

    // --- Transport ---
    /// Senden auf geschlossenem oder unbekanntem Kanal
    #[error("Transport nicht verfuegbar: {0}")]
    TransportNichtVerfuegbar(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TandemError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler den Prozess beenden muss
    ///
    /// Die vier Laufzeit-Kategorien werden lokal behandelt: loggen,
    /// Nachricht verwerfen, weitermachen.
    pub fn ist_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Protokollverletzung(_)
                | Self::UnbekannterNachrichtentyp(_)
                | Self::Dekodierung(_)
                | Self::TransportNichtVerfuegbar(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = TandemError::Protokollverletzung("Answer ohne Offer".into());
        assert_eq!(e.to_string(), "Protokollverletzung: Answer ohne Offer");
    }

    #[test]
    fn laufzeitfehler_sind_nicht_fatal() {
        assert!(!TandemError::Protokollverletzung("x".into()).ist_fatal());
        assert!(!TandemError::UnbekannterNachrichtentyp("x".into()).ist_fatal());
        assert!(!TandemError::Dekodierung("x".into()).ist_fatal());
        assert!(!TandemError::TransportNichtVerfuegbar("x".into()).ist_fatal());
        assert!(TandemError::intern("kaputt").ist_fatal());
        assert!(TandemError::Konfiguration("x".into()).ist_fatal());
    }
}
