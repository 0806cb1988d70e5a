//! Kanal-Multiplexer – Registry der Datenkanaele pro Peer
//!
//! Der Multiplexer besitzt die Kanal-Handles, die das Transport-Backend
//! mit `Verbunden` uebergibt, und vergibt dafuer `ChannelRef`s.
//!
//! ## Zustellung
//! - `send`: gezielt an einen Peer, nur wenn der Kanal offen ist
//! - `broadcast`: an alle offenen Kanaele, geschlossene werden uebersprungen
//!
//! Nichts wird gepuffert oder wiederholt. Ein Fehlschlag wird geloggt
//! und verworfen; der Aufrufer sieht nur `false`.

use bytes::Bytes;
use std::collections::HashMap;
use tandem_core::PeerId;
use tandem_transport::{ChannelRef, DataChannel};

use crate::error::{SyncError, SyncResult};
use crate::store::EntityStore;

// ---------------------------------------------------------------------------
// Registrierung
// ---------------------------------------------------------------------------

struct Registrierung {
    kanal: Box<dyn DataChannel>,
    kanal_ref: ChannelRef,
    /// `on_channel_open` bereits ausgeloest
    offen_gemeldet: bool,
}

// ---------------------------------------------------------------------------
// ChannelMultiplexer
// ---------------------------------------------------------------------------

/// Registry aller Datenkanaele des Knotens
#[derive(Default)]
pub struct ChannelMultiplexer {
    kanaele: HashMap<PeerId, Registrierung>,
    naechste_ref: u64,
}

impl ChannelMultiplexer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert den Kanal eines frisch verbundenen Peers
    ///
    /// Ein vorhandener Kanal fuer denselben Peer wird ersetzt.
    pub fn on_transport_connected(&mut self, peer_id: PeerId, kanal: Box<dyn DataChannel>) -> ChannelRef {
        self.naechste_ref += 1;
        let kanal_ref = ChannelRef(self.naechste_ref);

        let alt = self.kanaele.insert(
            peer_id.clone(),
            Registrierung {
                kanal,
                kanal_ref,
                offen_gemeldet: false,
            },
        );
        match alt {
            Some(alt) => tracing::debug!(
                peer_id = %peer_id,
                alt = %alt.kanal_ref,
                neu = %kanal_ref,
                "Kanal ersetzt"
            ),
            None => tracing::debug!(peer_id = %peer_id, kanal = %kanal_ref, "Kanal registriert"),
        }
        kanal_ref
    }

    fn zustellen(&self, peer_id: &PeerId, daten: Bytes) -> SyncResult<()> {
        let registrierung = self
            .kanaele
            .get(peer_id)
            .filter(|r| r.kanal.ist_offen())
            .ok_or_else(|| SyncError::TransportNichtVerfuegbar(peer_id.clone()))?;
        registrierung
            .kanal
            .senden(daten)
            .map_err(|_| SyncError::TransportNichtVerfuegbar(peer_id.clone()))
    }

    /// Sendet an einen Peer; gibt false zurueck wenn kein offener Kanal existiert
    pub fn send(&self, peer_id: &PeerId, daten: Bytes) -> bool {
        match self.zustellen(peer_id, daten) {
            Ok(()) => {
                tracing::trace!(peer_id = %peer_id, "Nachricht gesendet");
                true
            }
            Err(e) => {
                tracing::warn!(peer_id = %peer_id, fehler = %e, "Nachricht verworfen");
                false
            }
        }
    }

    /// Sendet an alle offenen Kanaele und gibt die Anzahl der Empfaenger zurueck
    pub fn broadcast(&self, daten: Bytes) -> usize {
        let mut zugestellt = 0;
        for (peer_id, registrierung) in &self.kanaele {
            if !registrierung.kanal.ist_offen() {
                continue;
            }
            if self.send(peer_id, daten.clone()) {
                zugestellt += 1;
            }
        }
        zugestellt
    }

    /// Kanal ist offen: sendet genau einmal die eigene Identitaet an diesen Peer
    ///
    /// `identitaet` wird nur aufgerufen, wenn tatsaechlich gesendet wird.
    /// Gibt false zurueck bei unbekanntem Peer oder wiederholtem Aufruf.
    pub fn on_channel_open(&mut self, peer_id: &PeerId, identitaet: impl FnOnce() -> Bytes) -> bool {
        let Some(registrierung) = self.kanaele.get_mut(peer_id) else {
            tracing::warn!(peer_id = %peer_id, "Kanal offen ohne Registrierung");
            return false;
        };
        if registrierung.offen_gemeldet {
            return false;
        }
        registrierung.offen_gemeldet = true;
        tracing::info!(peer_id = %peer_id, kanal = %registrierung.kanal_ref, "Kanal offen");

        self.send(peer_id, identitaet())
    }

    /// Kanal ist geschlossen: Registrierung und Entitaet entfernen
    ///
    /// Idempotent; gibt true zurueck wenn etwas entfernt wurde.
    pub fn on_channel_close(&mut self, peer_id: &PeerId, store: &mut EntityStore) -> bool {
        let registrierung = self.kanaele.remove(peer_id);
        let entfernt = store.evict(peer_id);
        if let Some(r) = &registrierung {
            tracing::info!(peer_id = %peer_id, kanal = %r.kanal_ref, "Kanal geschlossen");
        }
        registrierung.is_some() || entfernt
    }

    pub fn kanal_ref(&self, peer_id: &PeerId) -> Option<ChannelRef> {
        self.kanaele.get(peer_id).map(|r| r.kanal_ref)
    }

    pub fn ist_offen(&self, peer_id: &PeerId) -> bool {
        self.kanaele.get(peer_id).is_some_and(|r| r.kanal.ist_offen())
    }

    /// Anzahl der offenen Kanaele
    pub fn anzahl_offen(&self) -> usize {
        self.kanaele.values().filter(|r| r.kanal.ist_offen()).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tandem_core::Position;
    use tandem_transport::{TransportError, TransportResult};

    #[derive(Clone, Default)]
    struct TestKanal {
        gesendet: Arc<Mutex<Vec<Bytes>>>,
        geschlossen: Arc<AtomicBool>,
    }

    impl DataChannel for TestKanal {
        fn ist_offen(&self) -> bool {
            !self.geschlossen.load(Ordering::SeqCst)
        }

        fn senden(&self, daten: Bytes) -> TransportResult<()> {
            if !self.ist_offen() {
                return Err(TransportError::KanalGeschlossen);
            }
            self.gesendet.lock().push(daten);
            Ok(())
        }
    }

    fn peer(id: &str) -> PeerId {
        PeerId::from(id)
    }

    #[test]
    fn send_ohne_kanal_liefert_false() {
        let m = ChannelMultiplexer::neu();
        assert!(!m.send(&peer("b"), Bytes::from_static(b"x")));
    }

    #[test]
    fn broadcast_ohne_kanaele_tut_nichts() {
        let m = ChannelMultiplexer::neu();
        assert_eq!(m.broadcast(Bytes::from_static(b"x")), 0);
    }

    #[test]
    fn broadcast_ueberspringt_geschlossene_kanaele() {
        let mut m = ChannelMultiplexer::neu();
        let offen = TestKanal::default();
        let zu = TestKanal::default();
        zu.geschlossen.store(true, Ordering::SeqCst);
        m.on_transport_connected(peer("b"), Box::new(offen.clone()));
        m.on_transport_connected(peer("c"), Box::new(zu.clone()));

        assert_eq!(m.broadcast(Bytes::from_static(b"hallo")), 1);
        assert_eq!(offen.gesendet.lock().len(), 1);
        assert!(zu.gesendet.lock().is_empty());
        assert_eq!(m.anzahl_offen(), 1);
    }

    #[test]
    fn reihenfolge_im_kanal_bleibt_erhalten() {
        let mut m = ChannelMultiplexer::neu();
        let k = TestKanal::default();
        m.on_transport_connected(peer("b"), Box::new(k.clone()));
        for i in 0..5u8 {
            assert!(m.send(&peer("b"), Bytes::from(vec![i])));
        }
        let gesendet: Vec<u8> = k.gesendet.lock().iter().map(|b| b[0]).collect();
        assert_eq!(gesendet, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn neu_registrieren_ersetzt_kanal() {
        let mut m = ChannelMultiplexer::neu();
        let alt = TestKanal::default();
        let neu = TestKanal::default();
        let r1 = m.on_transport_connected(peer("b"), Box::new(alt.clone()));
        let r2 = m.on_transport_connected(peer("b"), Box::new(neu.clone()));
        assert_ne!(r1, r2);
        assert_eq!(m.kanal_ref(&peer("b")), Some(r2));

        m.send(&peer("b"), Bytes::from_static(b"x"));
        assert!(alt.gesendet.lock().is_empty());
        assert_eq!(neu.gesendet.lock().len(), 1);
    }

    #[test]
    fn kanal_offen_sendet_identitaet_genau_einmal() {
        let mut m = ChannelMultiplexer::neu();
        let b = TestKanal::default();
        let c = TestKanal::default();
        m.on_transport_connected(peer("b"), Box::new(b.clone()));
        m.on_transport_connected(peer("c"), Box::new(c.clone()));

        assert!(m.on_channel_open(&peer("b"), || Bytes::from_static(b"ich")));
        assert!(!m.on_channel_open(&peer("b"), || panic!("darf nicht erneut kodieren")));

        assert_eq!(b.gesendet.lock().as_slice(), &[Bytes::from_static(b"ich")]);
        assert!(c.gesendet.lock().is_empty(), "Nur an den geoeffneten Peer");
    }

    #[test]
    fn kanal_offen_ohne_registrierung() {
        let mut m = ChannelMultiplexer::neu();
        assert!(!m.on_channel_open(&peer("b"), || Bytes::new()));
    }

    #[test]
    fn kanal_geschlossen_entfernt_entitaet_idempotent() {
        let mut m = ChannelMultiplexer::neu();
        let mut store = EntityStore::neu();
        m.on_transport_connected(peer("b"), Box::new(TestKanal::default()));
        store.apply_identity(&peer("b"), "Moritz".into());
        store.apply_state(&peer("b"), Position::neu(3.0, 4.0));

        assert!(m.on_channel_close(&peer("b"), &mut store));
        assert!(store.get(&peer("b")).is_none());
        assert!(!m.ist_offen(&peer("b")));

        assert!(!m.on_channel_close(&peer("b"), &mut store));
        assert!(!m.send(&peer("b"), Bytes::from_static(b"x")));
    }
}
