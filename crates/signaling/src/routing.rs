//! Vermittlung – Leitet Signaling-Nachrichten zwischen registrierten Peers weiter
//!
//! Gemeinsamer Kern von `MemoryRelay` und `RelayServer`. Der Absender
//! wird beim Weiterleiten gestempelt (`from`), unabhaengig davon was der
//! Peer selbst angegeben hat. Nachrichten an noch nicht registrierte
//! Peers landen in einem begrenzten Postfach und werden bei der
//! Registrierung zugestellt.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::PeerId;
use tandem_protocol::SignalMessage;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Maximale Anzahl zurueckgestellter Nachrichten pro Empfaenger
const POSTFACH_GROESSE: usize = 64;

/// Maximale Anzahl Postfaecher fuer nicht registrierte Empfaenger
const MAX_POSTFAECHER: usize = 256;

// ---------------------------------------------------------------------------
// Zustellung
// ---------------------------------------------------------------------------

/// Ergebnis einer Weiterleitung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    /// Direkt an den registrierten Empfaenger uebergeben
    Zugestellt,
    /// Empfaenger unbekannt, im Postfach abgelegt
    Zurueckgestellt,
    /// Postfach voll, Nachricht verworfen
    Verworfen,
}

struct Registrierung {
    generation: u64,
    tx: mpsc::UnboundedSender<SignalMessage>,
}

// ---------------------------------------------------------------------------
// Vermittlung
// ---------------------------------------------------------------------------

/// Routing-Tabelle fuer Signaling-Nachrichten
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct Vermittlung {
    inner: Arc<VermittlungInner>,
}

#[derive(Default)]
struct VermittlungInner {
    peers: DashMap<PeerId, Registrierung>,
    postfach: DashMap<PeerId, Vec<SignalMessage>>,
    naechste_generation: AtomicU64,
}

impl Vermittlung {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert einen Peer und gibt seine Empfangs-Queue zurueck
    ///
    /// Eine bestehende Registrierung unter derselben Kennung wird ersetzt;
    /// deren Queue endet. Zurueckgestellte Nachrichten werden sofort zugestellt.
    pub fn registrieren(&self, peer_id: PeerId) -> (u64, mpsc::UnboundedReceiver<SignalMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.inner.naechste_generation.fetch_add(1, Ordering::Relaxed);

        if let Some((_, postfach)) = self.inner.postfach.remove(&peer_id) {
            tracing::debug!(
                peer_id = %peer_id,
                anzahl = postfach.len(),
                "Zurueckgestellte Nachrichten zugestellt"
            );
            for nachricht in postfach {
                let _ = tx.send(nachricht);
            }
        }

        let alt = self
            .inner
            .peers
            .insert(peer_id.clone(), Registrierung { generation, tx });
        if alt.is_some() {
            tracing::warn!(peer_id = %peer_id, "Peer-Kennung neu registriert, alte Verbindung ersetzt");
        } else {
            tracing::info!(peer_id = %peer_id, "Peer registriert");
        }

        (generation, rx)
    }

    /// Entfernt die Registrierung, sofern sie noch zur Generation gehoert
    pub fn abmelden(&self, peer_id: &PeerId, generation: u64) {
        let entfernt = self
            .inner
            .peers
            .remove_if(peer_id, |_, r| r.generation == generation);
        if entfernt.is_some() {
            tracing::info!(peer_id = %peer_id, "Peer abgemeldet");
        }
    }

    /// Leitet eine Nachricht an `nachricht.to` weiter und stempelt den Absender
    pub fn weiterleiten(&self, von: &PeerId, nachricht: SignalMessage) -> Zustellung {
        let nachricht = nachricht.mit_absender(von.clone());
        let an = nachricht.to.clone();

        let nachricht = match self.inner.peers.get(&an) {
            Some(r) => match r.tx.send(nachricht) {
                Ok(()) => {
                    tracing::trace!(von = %von, an = %an, "Signaling-Nachricht weitergeleitet");
                    return Zustellung::Zugestellt;
                }
                Err(mpsc::error::SendError(n)) => n,
            },
            None => nachricht,
        };

        if !self.inner.postfach.contains_key(&an) && self.inner.postfach.len() >= MAX_POSTFAECHER {
            tracing::warn!(von = %von, an = %an, "Zu viele Postfaecher, Nachricht verworfen");
            return Zustellung::Verworfen;
        }

        let mut postfach = self.inner.postfach.entry(an.clone()).or_default();
        if postfach.len() >= POSTFACH_GROESSE {
            tracing::warn!(von = %von, an = %an, "Postfach voll, Nachricht verworfen");
            return Zustellung::Verworfen;
        }
        postfach.push(nachricht);
        tracing::debug!(von = %von, an = %an, "Empfaenger unbekannt, Nachricht zurueckgestellt");
        Zustellung::Zurueckgestellt
    }

    /// Prueft ob ein Peer registriert ist
    pub fn ist_registriert(&self, peer_id: &PeerId) -> bool {
        self.inner.peers.contains_key(peer_id)
    }

    /// Anzahl registrierter Peers
    pub fn anzahl(&self) -> usize {
        self.inner.peers.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
