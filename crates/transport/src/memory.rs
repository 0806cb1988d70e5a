//! Prozessinterner Transport
//!
//! Alle `MemoryTransport`-Instanzen eines `MemoryNetz` sehen sich
//! gegenseitig. Sobald der Initiator das Answer anwendet, wird ein
//! Kanalpaar verdrahtet und beide Seiten erhalten `Verbunden` und
//! `KanalOffen`. Die Reihenfolge der Ereignisse ist deterministisch.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_core::PeerId;
use tandem_protocol::{IceCandidate, SdpDescriptor, SdpType};
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::{DataChannel, PeerTransport, TransportCommand, TransportEvent};

/// Deskriptor-Inhalt des Memory-Backends
const MEMORY_SDP: &str = "tandem-memory v1";

// ---------------------------------------------------------------------------
// MemoryNetz
// ---------------------------------------------------------------------------

/// Gemeinsames Netz aller Memory-Transporte
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct MemoryNetz {
    inner: Arc<Mutex<NetzInner>>,
}

#[derive(Default)]
struct NetzInner {
    /// Ereignis-Sender je Teilnehmer
    teilnehmer: HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>,
    /// Offen-Flag je verdrahtetem Paar
    kanaele: HashMap<(PeerId, PeerId), Arc<AtomicBool>>,
}

fn paar_schluessel(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl MemoryNetz {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Erstellt einen Transport fuer `lokal` und gibt seinen Ereignis-Empfaenger zurueck
    pub fn transport(
        &self,
        lokal: PeerId,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().teilnehmer.insert(lokal.clone(), tx.clone());
        tracing::debug!(peer_id = %lokal, "Memory-Transport registriert");
        (
            MemoryTransport {
                lokal,
                netz: self.clone(),
                events: tx,
            },
            rx,
        )
    }

    /// Anzahl der aktuell verdrahteten Kanalpaare
    pub fn offene_kanaele(&self) -> usize {
        self.inner
            .lock()
            .kanaele
            .values()
            .filter(|k| k.load(Ordering::SeqCst))
            .count()
    }
}

// ---------------------------------------------------------------------------
// MemoryKanal
// ---------------------------------------------------------------------------

/// Eine Richtung eines verdrahteten Kanalpaars
struct MemoryKanal {
    absender: PeerId,
    ziel: mpsc::UnboundedSender<TransportEvent>,
    offen: Arc<AtomicBool>,
}

impl DataChannel for MemoryKanal {
    fn ist_offen(&self) -> bool {
        self.offen.load(Ordering::SeqCst)
    }

    fn senden(&self, daten: Bytes) -> TransportResult<()> {
        if !self.ist_offen() {
            return Err(TransportError::KanalGeschlossen);
        }
        self.ziel
            .send(TransportEvent::KanalNachricht {
                peer_id: self.absender.clone(),
                daten,
            })
            .map_err(|_| TransportError::KanalGeschlossen)
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// Transport-Backend fuer Tests und lokale Demos
pub struct MemoryTransport {
    lokal: PeerId,
    netz: MemoryNetz,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryTransport {
    fn melden(&self, ereignis: TransportEvent) {
        // Empfaenger weg heisst: Knoten faehrt herunter
        let _ = self.events.send(ereignis);
    }

    fn fehlschlagen(&self, peer_id: PeerId, grund: impl Into<String>) {
        let grund = grund.into();
        tracing::warn!(peer_id = %peer_id, grund = %grund, "Memory-Transport fehlgeschlagen");
        self.melden(TransportEvent::Fehlgeschlagen { peer_id, grund });
    }

    fn beschreibung_und_kandidat(&self, peer_id: PeerId, beschreibung: SdpDescriptor) {
        self.melden(TransportEvent::LokaleBeschreibung {
            peer_id: peer_id.clone(),
            beschreibung,
        });
        self.melden(TransportEvent::LokalerKandidat {
            peer_id,
            kandidat: IceCandidate::neu(format!("memory {}", self.lokal)),
        });
    }

    /// Verdrahtet das Kanalpaar zwischen `self` und `peer_id`
    fn verdrahten(&self, peer_id: PeerId) {
        let mut netz = self.netz.inner.lock();
        let gegenseite = netz.teilnehmer.get(&peer_id).cloned();
        let Some(gegenseite) = gegenseite else {
            drop(netz);
            self.fehlschlagen(peer_id, "Gegenseite nicht im Memory-Netz");
            return;
        };

        let offen = Arc::new(AtomicBool::new(true));
        netz.kanaele
            .insert(paar_schluessel(&self.lokal, &peer_id), Arc::clone(&offen));
        drop(netz);

        let zur_gegenseite = MemoryKanal {
            absender: self.lokal.clone(),
            ziel: gegenseite.clone(),
            offen: Arc::clone(&offen),
        };
        let zu_uns = MemoryKanal {
            absender: peer_id.clone(),
            ziel: self.events.clone(),
            offen,
        };

        self.melden(TransportEvent::Verbunden {
            peer_id: peer_id.clone(),
            kanal: Box::new(zur_gegenseite),
        });
        let _ = gegenseite.send(TransportEvent::Verbunden {
            peer_id: self.lokal.clone(),
            kanal: Box::new(zu_uns),
        });
        self.melden(TransportEvent::KanalOffen {
            peer_id: peer_id.clone(),
        });
        let _ = gegenseite.send(TransportEvent::KanalOffen {
            peer_id: self.lokal.clone(),
        });

        tracing::debug!(lokal = %self.lokal, peer_id = %peer_id, "Memory-Kanal verdrahtet");
    }

    fn schliessen(&self, peer_id: PeerId) {
        let mut netz = self.netz.inner.lock();
        let schluessel = paar_schluessel(&self.lokal, &peer_id);
        let Some(offen) = netz.kanaele.remove(&schluessel) else {
            return;
        };
        let gegenseite = netz.teilnehmer.get(&peer_id).cloned();
        drop(netz);

        if !offen.swap(false, Ordering::SeqCst) {
            return;
        }
        self.melden(TransportEvent::KanalGeschlossen {
            peer_id: peer_id.clone(),
        });
        if let Some(gegenseite) = gegenseite {
            let _ = gegenseite.send(TransportEvent::KanalGeschlossen {
                peer_id: self.lokal.clone(),
            });
        }
        tracing::debug!(lokal = %self.lokal, peer_id = %peer_id, "Memory-Kanal geschlossen");
    }
}

impl PeerTransport for MemoryTransport {
    fn ausfuehren(&mut self, befehl: TransportCommand) {
        tracing::trace!(lokal = %self.lokal, befehl = ?befehl, "Memory-Transport");
        match befehl {
            TransportCommand::AngebotErstellen { peer_id } => {
                self.beschreibung_und_kandidat(peer_id, SdpDescriptor::offer(MEMORY_SDP));
            }
            TransportCommand::AntwortErstellen { peer_id, angebot } => {
                if angebot.typ != SdpType::Offer || angebot.sdp != MEMORY_SDP {
                    self.fehlschlagen(peer_id, "Offer passt nicht zum Memory-Backend");
                    return;
                }
                self.beschreibung_und_kandidat(peer_id, SdpDescriptor::answer(MEMORY_SDP));
            }
            TransportCommand::AntwortAnwenden { peer_id, antwort } => {
                if antwort.typ != SdpType::Answer || antwort.sdp != MEMORY_SDP {
                    self.fehlschlagen(peer_id, "Answer passt nicht zum Memory-Backend");
                    return;
                }
                self.verdrahten(peer_id);
            }
            TransportCommand::KandidatHinzufuegen { .. } => {}
            TransportCommand::Schliessen { peer_id } => self.schliessen(peer_id),
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.netz.inner.lock().teilnehmer.remove(&self.lokal);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alle(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut v = Vec::new();
        while let Ok(e) = rx.try_recv() {
            v.push(e);
        }
        v
    }

    fn verbundenes_paar() -> (
        MemoryNetz,
        (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>),
        (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>),
        Box<dyn DataChannel>,
        Box<dyn DataChannel>,
    ) {
        let netz = MemoryNetz::neu();
        let (mut a, mut rx_a) = netz.transport(PeerId::from("a"));
        let (b, mut rx_b) = netz.transport(PeerId::from("b"));

        a.ausfuehren(TransportCommand::AntwortAnwenden {
            peer_id: PeerId::from("b"),
            antwort: SdpDescriptor::answer(MEMORY_SDP),
        });

        let kanal_a = match alle(&mut rx_a).remove(0) {
            TransportEvent::Verbunden { kanal, .. } => kanal,
            e => panic!("Verbunden erwartet, war {:?}", e),
        };
        let kanal_b = match alle(&mut rx_b).remove(0) {
            TransportEvent::Verbunden { kanal, .. } => kanal,
            e => panic!("Verbunden erwartet, war {:?}", e),
        };
        (netz, (a, rx_a), (b, rx_b), kanal_a, kanal_b)
    }

    #[test]
    fn angebot_erzeugt_beschreibung_und_kandidat() {
        let netz = MemoryNetz::neu();
        let (mut t, mut rx) = netz.transport(PeerId::from("a"));

        t.ausfuehren(TransportCommand::AngebotErstellen {
            peer_id: PeerId::from("b"),
        });

        let events = alle(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            TransportEvent::LokaleBeschreibung { beschreibung, .. } if beschreibung.typ == SdpType::Offer
        ));
        assert!(matches!(&events[1], TransportEvent::LokalerKandidat { .. }));
    }

    #[test]
    fn fremdes_offer_scheitert() {
        let netz = MemoryNetz::neu();
        let (mut t, mut rx) = netz.transport(PeerId::from("b"));

        t.ausfuehren(TransportCommand::AntwortErstellen {
            peer_id: PeerId::from("a"),
            angebot: SdpDescriptor::offer("v=0 irgendwas"),
        });

        let events = alle(&mut rx);
        assert!(matches!(&events[..], [TransportEvent::Fehlgeschlagen { .. }]));
    }

    #[test]
    fn antwort_verdrahtet_beide_seiten() {
        let netz = MemoryNetz::neu();
        let (mut a, mut rx_a) = netz.transport(PeerId::from("a"));
        let (_b, mut rx_b) = netz.transport(PeerId::from("b"));

        a.ausfuehren(TransportCommand::AntwortAnwenden {
            peer_id: PeerId::from("b"),
            antwort: SdpDescriptor::answer(MEMORY_SDP),
        });

        let ea = alle(&mut rx_a);
        let eb = alle(&mut rx_b);
        assert!(matches!(&ea[..], [TransportEvent::Verbunden { .. }, TransportEvent::KanalOffen { .. }]));
        assert!(matches!(&eb[..], [TransportEvent::Verbunden { .. }, TransportEvent::KanalOffen { .. }]));
        assert_eq!(eb[0].peer_id(), &PeerId::from("a"));
        assert_eq!(netz.offene_kanaele(), 1);
    }

    #[test]
    fn antwort_ohne_gegenseite_scheitert() {
        let netz = MemoryNetz::neu();
        let (mut a, mut rx_a) = netz.transport(PeerId::from("a"));

        a.ausfuehren(TransportCommand::AntwortAnwenden {
            peer_id: PeerId::from("niemand"),
            antwort: SdpDescriptor::answer(MEMORY_SDP),
        });

        assert!(matches!(&alle(&mut rx_a)[..], [TransportEvent::Fehlgeschlagen { .. }]));
    }

    #[test]
    fn nachrichten_kommen_in_reihenfolge_an() {
        let (_netz, (_a, _rx_a), (_b, mut rx_b), kanal_a, _kanal_b) = verbundenes_paar();

        for i in 0..5u8 {
            kanal_a.senden(Bytes::from(vec![i])).unwrap();
        }

        let empfangen: Vec<u8> = alle(&mut rx_b)
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::KanalNachricht { peer_id, daten } => {
                    assert_eq!(peer_id, PeerId::from("a"));
                    Some(daten[0])
                }
                _ => None,
            })
            .collect();
        assert_eq!(empfangen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn schliessen_meldet_beiden_seiten_genau_einmal() {
        let (netz, (_a, mut rx_a), (mut b, mut rx_b), kanal_a, kanal_b) = verbundenes_paar();
        alle(&mut rx_a);
        alle(&mut rx_b);

        b.ausfuehren(TransportCommand::Schliessen {
            peer_id: PeerId::from("a"),
        });
        b.ausfuehren(TransportCommand::Schliessen {
            peer_id: PeerId::from("a"),
        });

        assert!(matches!(&alle(&mut rx_a)[..], [TransportEvent::KanalGeschlossen { .. }]));
        assert!(matches!(&alle(&mut rx_b)[..], [TransportEvent::KanalGeschlossen { .. }]));
        assert!(!kanal_a.ist_offen());
        assert!(matches!(
            kanal_b.senden(Bytes::from_static(b"x")),
            Err(TransportError::KanalGeschlossen)
        ));
        assert_eq!(netz.offene_kanaele(), 0);
    }

    #[test]
    fn schliessen_ohne_kanal_ist_still() {
        let netz = MemoryNetz::neu();
        let (mut a, mut rx_a) = netz.transport(PeerId::from("a"));
        a.ausfuehren(TransportCommand::Schliessen {
            peer_id: PeerId::from("b"),
        });
        assert!(alle(&mut rx_a).is_empty());
    }
}
