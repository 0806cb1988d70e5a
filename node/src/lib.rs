//! tandem-node – Bibliotheks-Root
//!
//! Der `Node` verbindet Negotiator, Kanal-Multiplexer, Entity-Store und
//! lokale Entitaet. Alle Ereignisse laufen durch `Node::verarbeiten`;
//! `laufen` ist der asynchrone Treiber dafuer auf einem einzigen Thread.
//!
//! ## Ereignisfluss
//! ```text
//! Relay ----------> NodeEvent::Signal    --> SessionNegotiator
//! Transport ------> NodeEvent::Transport --> Negotiator / Multiplexer / Store
//! stdin ----------> NodeEvent::Eingabe   --> LocalEntity --> broadcast
//! Intervall ------> NodeEvent::Tick      --> Verhandlungs-Timeouts
//! ```

pub mod config;

use std::time::{Duration, Instant};
use tandem_core::{Direction, PeerId, RoomCode};
use tandem_protocol::SignalMessage;
use tandem_signaling::{NegotiatorConfig, SessionNegotiator, SignalingRelay, SignalingResult};
use tandem_sync::{nachricht_empfangen, ChannelMultiplexer, EntityStore, LocalEntity, RemoteEntity};
use tandem_transport::{PeerTransport, TransportCommand, TransportEvent};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

// ---------------------------------------------------------------------------
// Ereignisse
// ---------------------------------------------------------------------------

/// Eingangsereignis des Knotens
#[derive(Debug)]
pub enum NodeEvent {
    /// Signaling-Nachricht vom Relay
    Signal(SignalMessage),
    /// Ereignis des Transport-Backends
    Transport(TransportEvent),
    /// Ein Bewegungsschritt der lokalen Figur
    Eingabe(Direction),
    /// Neuer Anzeigename
    NameGeaendert(String),
    /// Takt des Event-Loops
    Tick(Instant),
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Ein Tandem-Knoten
pub struct Node<R, T> {
    negotiator: SessionNegotiator<R, T>,
    multiplexer: ChannelMultiplexer,
    store: EntityStore,
    lokal: LocalEntity,
}

impl<R: SignalingRelay, T: PeerTransport> Node<R, T> {
    pub fn neu(lokal_id: PeerId, relay: R, transport: T, lokal: LocalEntity, config: NegotiatorConfig) -> Self {
        Self {
            negotiator: SessionNegotiator::neu(lokal_id, relay, transport, config),
            multiplexer: ChannelMultiplexer::neu(),
            store: EntityStore::neu(),
            lokal,
        }
    }

    /// Erstellt einen Raum und startet die Verhandlung mit `remote` als Initiator
    pub fn raum_erstellen(&mut self, remote: PeerId) -> SignalingResult<RoomCode> {
        let code = RoomCode::generieren();
        self.negotiator.create_session(remote.clone())?;
        tracing::info!(raum = %code, remote = %remote, "Raum erstellt");
        Ok(code)
    }

    /// Schliesst die Sitzung zu `peer_id`
    pub fn sitzung_schliessen(&mut self, peer_id: &PeerId) -> bool {
        self.negotiator.close_session(peer_id)
    }

    /// Einziger Eintrittspunkt fuer alle Ereignisse
    ///
    /// Fehler werden geloggt und die betroffene Nachricht verworfen.
    pub fn verarbeiten(&mut self, ereignis: NodeEvent) {
        match ereignis {
            NodeEvent::Signal(nachricht) => {
                let von = nachricht.from.clone();
                let typ = nachricht.kind.clone();
                if let Err(e) = self.negotiator.accept_message(nachricht) {
                    tracing::warn!(von = ?von, typ = %typ, fehler = %e, "Signaling-Nachricht verworfen");
                }
            }
            NodeEvent::Transport(ereignis) => self.transport_ereignis(ereignis),
            NodeEvent::Eingabe(richtung) => {
                let update = self.lokal.bewegen(richtung);
                let empfaenger = self.multiplexer.broadcast(update);
                tracing::trace!(
                    x = self.lokal.position.x,
                    y = self.lokal.position.y,
                    empfaenger,
                    "Lokale Bewegung"
                );
            }
            NodeEvent::NameGeaendert(name) => {
                tracing::debug!(name = %name, "Anzeigename geaendert");
                self.lokal.display_name = name;
            }
            NodeEvent::Tick(jetzt) => {
                for peer_id in self.negotiator.abgelaufene_verhandlungen(jetzt) {
                    self.multiplexer.on_channel_close(&peer_id, &mut self.store);
                }
            }
        }
    }

    fn transport_ereignis(&mut self, ereignis: TransportEvent) {
        match ereignis {
            TransportEvent::Verbunden { peer_id, kanal } => {
                let kanal_ref = self.multiplexer.on_transport_connected(peer_id.clone(), kanal);
                if !self.negotiator.transport_verbunden(&peer_id, kanal_ref) {
                    // Keine passende Sitzung mehr (z.B. Timeout): Kanal sofort abbauen
                    self.multiplexer.on_channel_close(&peer_id, &mut self.store);
                    self.negotiator
                        .transport_mut()
                        .ausfuehren(TransportCommand::Schliessen { peer_id });
                }
            }
            TransportEvent::KanalOffen { peer_id } => {
                let lokal = &self.lokal;
                self.multiplexer.on_channel_open(&peer_id, || lokal.identitaet());
            }
            TransportEvent::KanalNachricht { peer_id, daten } => {
                if let Err(e) = nachricht_empfangen(&mut self.store, &peer_id, &daten) {
                    tracing::warn!(peer_id = %peer_id, fehler = %e, "Kanal-Nachricht verworfen");
                }
            }
            andere => {
                if let TransportEvent::KanalGeschlossen { peer_id }
                | TransportEvent::Fehlgeschlagen { peer_id, .. } = &andere
                {
                    self.multiplexer.on_channel_close(peer_id, &mut self.store);
                }
                if let Err(e) = self.negotiator.transport_ereignis(&andere) {
                    tracing::warn!(peer_id = %andere.peer_id(), fehler = %e, "Transport-Ereignis nicht zugestellt");
                }
            }
        }
    }

    /// Entfernte Entitaeten in Einfuegereihenfolge
    pub fn snapshot(&self) -> Vec<RemoteEntity> {
        self.store.snapshot()
    }

    pub fn lokal(&self) -> &LocalEntity {
        &self.lokal
    }

    pub fn negotiator(&self) -> &SessionNegotiator<R, T> {
        &self.negotiator
    }

    pub fn multiplexer(&self) -> &ChannelMultiplexer {
        &self.multiplexer
    }

    /// Textdarstellung fuer die Konsole: eigene Figur, dann alle Peers
    pub fn anzeige(&self) -> String {
        let mut zeilen = vec![format!(
            "* {} ({:.0}, {:.0})",
            self.lokal.display_name, self.lokal.position.x, self.lokal.position.y
        )];
        for e in self.store.iter() {
            zeilen.push(format!(
                "  {} [{}] ({:.0}, {:.0}) {}",
                e.display_name.as_deref().unwrap_or("?"),
                e.peer_id,
                e.position.x,
                e.position.y,
                e.color.als_hex()
            ));
        }
        zeilen.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Konsolen-Eingabe
// ---------------------------------------------------------------------------

/// Ausgewertete Eingabezeile
#[derive(Debug, Clone, PartialEq)]
pub enum Befehl {
    /// Ein oder mehrere Schritte (`w`/`a`/`s`/`d`)
    Bewegen(Vec<Direction>),
    /// `/name <neuer Name>`
    Name(String),
    /// `/quit` oder `q`
    Beenden,
    Unbekannt,
}

/// Wertet eine Eingabezeile aus
pub fn befehl_lesen(zeile: &str) -> Befehl {
    let zeile = zeile.trim();
    if zeile == "q" || zeile == "/quit" {
        return Befehl::Beenden;
    }
    if let Some(name) = zeile.strip_prefix("/name ") {
        return Befehl::Name(name.trim().to_string());
    }
    let schritte: Option<Vec<Direction>> = zeile.chars().map(Direction::aus_taste).collect();
    match schritte {
        Some(schritte) if !schritte.is_empty() => Befehl::Bewegen(schritte),
        _ => Befehl::Unbekannt,
    }
}

// ---------------------------------------------------------------------------
// Treiber
// ---------------------------------------------------------------------------

/// Eingangsquellen des Event-Loops
pub struct Eingaenge {
    pub signale: mpsc::UnboundedReceiver<SignalMessage>,
    pub transport: mpsc::UnboundedReceiver<TransportEvent>,
    pub eingaben: mpsc::UnboundedReceiver<NodeEvent>,
}

/// Treibt den Knoten bis `shutdown_rx` ein `true`-Signal empfaengt
///
/// Die Anzeige wird nach jedem Tick ausgegeben, wenn sie sich geaendert hat.
pub async fn laufen<R: SignalingRelay, T: PeerTransport>(
    node: &mut Node<R, T>,
    mut eingaenge: Eingaenge,
    tick_intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut anzeigen: impl FnMut(&str),
) {
    let mut tick = tokio::time::interval(tick_intervall);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut letzte_anzeige = String::new();

    loop {
        tokio::select! {
            Some(nachricht) = eingaenge.signale.recv() => {
                node.verarbeiten(NodeEvent::Signal(nachricht));
            }
            Some(ereignis) = eingaenge.transport.recv() => {
                node.verarbeiten(NodeEvent::Transport(ereignis));
            }
            Some(eingabe) = eingaenge.eingaben.recv() => {
                node.verarbeiten(eingabe);
            }
            jetzt = tick.tick() => {
                node.verarbeiten(NodeEvent::Tick(jetzt.into_std()));
                let anzeige = node.anzeige();
                if anzeige != letzte_anzeige {
                    anzeigen(&anzeige);
                    letzte_anzeige = anzeige;
                }
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Knoten: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bewegungstasten() {
        assert_eq!(
            befehl_lesen("wd\n"),
            Befehl::Bewegen(vec![Direction::Hoch, Direction::Rechts])
        );
        assert_eq!(befehl_lesen("s"), Befehl::Bewegen(vec![Direction::Runter]));
    }

    #[test]
    fn sonderbefehle() {
        assert_eq!(befehl_lesen("/name  Moritz "), Befehl::Name("Moritz".into()));
        assert_eq!(befehl_lesen("q"), Befehl::Beenden);
        assert_eq!(befehl_lesen("/quit"), Befehl::Beenden);
    }

    #[test]
    fn unbekannte_eingaben() {
        assert_eq!(befehl_lesen(""), Befehl::Unbekannt);
        assert_eq!(befehl_lesen("wx"), Befehl::Unbekannt);
        assert_eq!(befehl_lesen("/hilfe"), Befehl::Unbekannt);
    }
}
