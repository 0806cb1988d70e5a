//! Lokale Entitaet – wird nur von lokaler Eingabe veraendert

use bytes::Bytes;
use tandem_core::{Direction, Position};
use tandem_protocol::{encode_identity, encode_state};

/// Startposition der lokalen Entitaet
pub const START_POSITION: Position = Position { x: 400.0, y: 250.0 };

/// Schrittweite pro Eingabe
pub const STANDARD_GESCHWINDIGKEIT: f64 = 3.0;

/// Die eigene Entitaet des Knotens
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntity {
    pub position: Position,
    /// Wird bei jeder Identitaets-Ankuendigung neu gelesen
    pub display_name: String,
    pub speed: f64,
}

impl LocalEntity {
    pub fn neu(display_name: impl Into<String>) -> Self {
        Self {
            position: START_POSITION,
            display_name: display_name.into(),
            speed: STANDARD_GESCHWINDIGKEIT,
        }
    }

    /// Bewegt die Entitaet einen Schritt und gibt das Zustands-Update zurueck
    pub fn bewegen(&mut self, richtung: Direction) -> Bytes {
        let (dx, dy) = richtung.delta(self.speed);
        self.position = self.position.verschoben(dx, dy);
        encode_state(self.position)
    }

    /// Aktueller Zustand als Nachricht
    pub fn zustand(&self) -> Bytes {
        encode_state(self.position)
    }

    /// Identitaets-Ankuendigung mit dem aktuellen Namen
    pub fn identitaet(&self) -> Bytes {
        encode_identity(&self.display_name)
    }
}
