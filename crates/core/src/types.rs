//! Gemeinsame Identifikations- und Werttypen fuer Tandem
//!
//! Peer-IDs sind opake Strings (vom Relay oder per Konvention vergeben).
//! Das Newtype-Pattern verhindert Verwechslungen mit Benutzernamen.

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PeerId
// ---------------------------------------------------------------------------

/// Opake Peer-Kennung
///
/// `Ord` ist lexikographisch und wird fuer den Glare-Tie-Break verwendet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Erstellt eine PeerId aus einem beliebigen String
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Erzeugt eine zufaellige PeerId (`peer_` + 8 Hex-Zeichen)
    pub fn zufaellig() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("peer_{}", &uuid[..8]))
    }

    /// Gibt die Kennung als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// Zeichenvorrat fuer Raum-Codes (Basis 36, Grossbuchstaben)
const RAUM_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Laenge eines Raum-Codes
pub const RAUM_CODE_LAENGE: usize = 6;

/// Sechsstelliger Raum-Code, der beim Erstellen eines Raums angezeigt wird
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Erzeugt einen neuen zufaelligen Raum-Code
    pub fn generieren() -> Self {
        let mut rng = rand::rng();
        let code = (0..RAUM_CODE_LAENGE)
            .map(|_| RAUM_ALPHABET[rng.random_range(0..RAUM_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// 2D-Position einer Entitaet (Wertebereich unbeschraenkt)
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn neu(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Gibt eine um (dx, dy) verschobene Position zurueck
    pub fn verschoben(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// RGB-Farbe einer entfernten Entitaet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Farbe fuer Entitaeten, die per Identitaets-Nachricht entstehen
    pub const FALLBACK: Color = Color {
        r: 0xff,
        g: 0xff,
        b: 0xff,
    };

    pub const fn neu(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pseudo-zufaellige Farbe, keine Kollisionserkennung
    pub fn zufaellig() -> Self {
        Self {
            r: rand::random::<u8>(),
            g: rand::random::<u8>(),
            b: rand::random::<u8>(),
        }
    }

    /// CSS-Hex-Darstellung, z.B. `#00ffff`
    pub fn als_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Bewegungsrichtung einer lokalen Eingabe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Hoch,
    Runter,
    Links,
    Rechts,
}

impl Direction {
    /// Ordnet die Tasten w/a/s/d einer Richtung zu
    pub fn aus_taste(taste: char) -> Option<Self> {
        match taste {
            'w' => Some(Self::Hoch),
            's' => Some(Self::Runter),
            'a' => Some(Self::Links),
            'd' => Some(Self::Rechts),
            _ => None,
        }
    }

    /// Verschiebung fuer einen Schritt mit der gegebenen Geschwindigkeit
    ///
    /// Die y-Achse zeigt nach unten (Bildschirmkoordinaten).
    pub fn delta(&self, geschwindigkeit: f64) -> (f64, f64) {
        match self {
            Self::Hoch => (0.0, -geschwindigkeit),
            Self::Runter => (0.0, geschwindigkeit),
            Self::Links => (-geschwindigkeit, 0.0),
            Self::Rechts => (geschwindigkeit, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_eindeutig() {
        let a = PeerId::zufaellig();
        let b = PeerId::zufaellig();
        assert_ne!(a, b, "Zwei neue PeerIds muessen verschieden sein");
        assert!(a.as_str().starts_with("peer_"));
    }

    #[test]
    fn peer_id_ist_transparent_serialisiert() {
        let id = PeerId::new("remote_peer_1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"remote_peer_1\"");
        let id2: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn peer_id_ordnung_ist_lexikographisch() {
        assert!(PeerId::from("alpha") < PeerId::from("beta"));
        assert!(PeerId::from("peer_10") < PeerId::from("peer_9"));
    }

    #[test]
    fn raum_code_format() {
        let code = RoomCode::generieren();
        assert_eq!(code.as_str().len(), RAUM_CODE_LAENGE);
        assert!(code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn position_standard_ist_ursprung() {
        assert_eq!(Position::default(), Position::neu(0.0, 0.0));
        assert_eq!(Position::neu(1.0, 2.0).verschoben(-3.0, 0.5), Position::neu(-2.0, 2.5));
    }

    #[test]
    fn farbe_hex() {
        assert_eq!(Color::neu(0, 255, 255).als_hex(), "#00ffff");
        assert_eq!(Color::FALLBACK.als_hex(), "#ffffff");
    }

    #[test]
    fn richtung_aus_taste() {
        assert_eq!(Direction::aus_taste('w'), Some(Direction::Hoch));
        assert_eq!(Direction::aus_taste('a'), Some(Direction::Links));
        assert_eq!(Direction::aus_taste('s'), Some(Direction::Runter));
        assert_eq!(Direction::aus_taste('d'), Some(Direction::Rechts));
        assert_eq!(Direction::aus_taste('q'), None);
    }

    #[test]
    fn richtung_delta() {
        assert_eq!(Direction::Hoch.delta(3.0), (0.0, -3.0));
        assert_eq!(Direction::Rechts.delta(3.0), (3.0, 0.0));
    }
}
