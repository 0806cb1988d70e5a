//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass Knoten und Relay ohne
//! Konfigurationsdatei lauffaehig sind.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tandem_core::{PeerId, Position};
use tandem_signaling::{NegotiatorConfig, RelayConfig};

/// Standard-Pfad der Konfigurationsdatei
pub const STANDARD_PFAD: &str = "tandem.toml";

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Lokaler Knoten und Spielfigur
    pub knoten: KnotenEinstellungen,
    /// Sitzungsaufbau
    pub sitzung: SitzungEinstellungen,
    /// Signaling-Relay
    pub relay: RelayEinstellungen,
    /// Peer-Transport
    pub transport: TransportEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Lokaler Knoten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnotenEinstellungen {
    /// Eigene Peer-Kennung (leer = zufaellig)
    pub peer_id: Option<String>,
    /// Anzeigename, wird dem Peer nach Kanal-Oeffnung angekuendigt
    pub username: String,
    /// Schrittweite pro Eingabe
    pub geschwindigkeit: f64,
    /// Startposition der eigenen Figur
    pub start_x: f64,
    pub start_y: f64,
    /// Tick-Intervall des Event-Loops in Millisekunden
    pub tick_ms: u64,
}

impl Default for KnotenEinstellungen {
    fn default() -> Self {
        Self {
            peer_id: None,
            username: "Spieler".into(),
            geschwindigkeit: 3.0,
            start_x: 400.0,
            start_y: 250.0,
            tick_ms: 50,
        }
    }
}

/// Rolle beim Sitzungsaufbau
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modus {
    /// Raum erstellen, Offer an `remote_peer_id` senden (Initiator)
    Erstellen,
    /// Auf ein Offer warten (Responder)
    Beitreten,
}

/// Sitzungsaufbau
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungEinstellungen {
    pub modus: Modus,
    /// Kennung des Peers, dem beim Erstellen das Offer gilt
    pub remote_peer_id: String,
    /// Timeout der Verhandlung in Sekunden (0 = kein Timeout)
    pub verhandlungs_timeout_s: u64,
}

impl Default for SitzungEinstellungen {
    fn default() -> Self {
        Self {
            modus: Modus::Beitreten,
            remote_peer_id: "remote_peer_1".into(),
            verhandlungs_timeout_s: 30,
        }
    }
}

/// Signaling-Relay (Client und Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Adresse, zu der sich der Knoten verbindet
    pub adresse: String,
    /// Bind-Adresse des Relay-Servers
    pub bind_adresse: String,
    /// Maximale gleichzeitig registrierte Peers
    pub max_peers: usize,
    /// Sekunden bis zum ersten `Register`-Frame
    pub registrierungs_timeout_s: u64,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            adresse: "127.0.0.1:9870".into(),
            bind_adresse: "0.0.0.0:9870".into(),
            max_peers: 256,
            registrierungs_timeout_s: 10,
        }
    }
}

/// Transport-Backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Direkte TCP-Verbindung, Initiator lauscht
    Tcp,
    /// WebRTC-Datenkanal (Feature `webrtc`)
    Webrtc,
}

/// Peer-Transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportEinstellungen {
    pub backend: Backend,
    /// IP fuer den TCP-Listener, wird auch als Kandidat angekuendigt
    pub bind_ip: IpAddr,
    /// STUN-Server fuer WebRTC
    pub stun_server: Vec<String>,
}

impl Default for TransportEinstellungen {
    fn default() -> Self {
        Self {
            backend: Backend::Tcp,
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            stun_server: vec!["stun:stun.l.google.com:19302".into()],
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl NodeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !(self.knoten.geschwindigkeit.is_finite() && self.knoten.geschwindigkeit > 0.0) {
            anyhow::bail!("knoten.geschwindigkeit muss positiv sein");
        }
        if self.knoten.tick_ms == 0 {
            anyhow::bail!("knoten.tick_ms muss groesser als 0 sein");
        }
        if self.sitzung.modus == Modus::Erstellen && self.sitzung.remote_peer_id.trim().is_empty() {
            anyhow::bail!("sitzung.remote_peer_id fehlt im Modus 'erstellen'");
        }
        if self.knoten.peer_id.as_deref() == Some(self.sitzung.remote_peer_id.as_str())
            && self.sitzung.modus == Modus::Erstellen
        {
            anyhow::bail!("sitzung.remote_peer_id ist die eigene Kennung");
        }
        Ok(())
    }

    /// Eigene Peer-Kennung; zufaellig wenn nicht konfiguriert
    pub fn lokale_peer_id(&self) -> PeerId {
        match self.knoten.peer_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => PeerId::from(id),
            _ => PeerId::zufaellig(),
        }
    }

    pub fn start_position(&self) -> Position {
        Position::neu(self.knoten.start_x, self.knoten.start_y)
    }

    pub fn tick_intervall(&self) -> Duration {
        Duration::from_millis(self.knoten.tick_ms)
    }

    pub fn negotiator_config(&self) -> NegotiatorConfig {
        let timeout = self.sitzung.verhandlungs_timeout_s;
        NegotiatorConfig {
            verhandlungs_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_peers: self.relay.max_peers,
            registrierungs_timeout: Duration::from_secs(self.relay.registrierungs_timeout_s),
        }
    }
}
