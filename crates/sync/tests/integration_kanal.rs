//! Integration-Tests: Multiplexer und Store ueber echte Memory-Kanaele

use tandem_core::{Direction, PeerId, Position};
use tandem_protocol::SdpDescriptor;
use tandem_sync::{nachricht_empfangen, ChannelMultiplexer, EntityStore, LocalEntity};
use tandem_transport::{MemoryNetz, PeerTransport, TransportCommand, TransportEvent};

/// Zwei Seiten mit je Multiplexer, Store und lokaler Entitaet
struct Seite {
    id: PeerId,
    multiplexer: ChannelMultiplexer,
    store: EntityStore,
    lokal: LocalEntity,
}

impl Seite {
    fn neu(id: &str, name: &str) -> Self {
        Self {
            id: PeerId::from(id),
            multiplexer: ChannelMultiplexer::neu(),
            store: EntityStore::neu(),
            lokal: LocalEntity::neu(name),
        }
    }

    fn verarbeiten(&mut self, ereignis: TransportEvent) {
        match ereignis {
            TransportEvent::Verbunden { peer_id, kanal } => {
                self.multiplexer.on_transport_connected(peer_id, kanal);
            }
            TransportEvent::KanalOffen { peer_id } => {
                let lokal = &self.lokal;
                self.multiplexer.on_channel_open(&peer_id, || lokal.identitaet());
            }
            TransportEvent::KanalNachricht { peer_id, daten } => {
                nachricht_empfangen(&mut self.store, &peer_id, &daten).unwrap();
            }
            TransportEvent::KanalGeschlossen { peer_id } => {
                self.multiplexer.on_channel_close(&peer_id, &mut self.store);
            }
            _ => {}
        }
    }
}

#[test]
fn identitaet_und_zustand_ueber_memory_kanal() {
    let netz = MemoryNetz::neu();
    let mut a = Seite::neu("host", "Moritz");
    let mut b = Seite::neu("remote_peer_1", "Gast");
    let (mut transport_a, mut rx_a) = netz.transport(a.id.clone());
    let (_transport_b, mut rx_b) = netz.transport(b.id.clone());

    transport_a.ausfuehren(TransportCommand::AntwortAnwenden {
        peer_id: b.id.clone(),
        antwort: SdpDescriptor::answer("tandem-memory v1"),
    });

    let pumpen = |seite: &mut Seite, rx: &mut tokio::sync::mpsc::UnboundedReceiver<TransportEvent>| {
        while let Ok(e) = rx.try_recv() {
            seite.verarbeiten(e);
        }
    };

    // Verbunden + KanalOffen auf beiden Seiten, Identitaeten laufen los
    pumpen(&mut a, &mut rx_a);
    pumpen(&mut b, &mut rx_b);
    pumpen(&mut a, &mut rx_a);

    let bei_b = b.store.get(&a.id).unwrap();
    assert_eq!(bei_b.display_name.as_deref(), Some("Moritz"));
    assert_eq!(bei_b.position, Position::neu(0.0, 0.0));
    assert_eq!(a.store.get(&b.id).unwrap().display_name.as_deref(), Some("Gast"));

    // Bewegung wird an alle offenen Kanaele verteilt
    let update = a.lokal.bewegen(Direction::Links);
    assert_eq!(a.multiplexer.broadcast(update), 1);
    pumpen(&mut b, &mut rx_b);
    assert_eq!(b.store.get(&a.id).unwrap().position, Position::neu(397.0, 250.0));

    // Schliessen entfernt die Entitaet auf beiden Seiten
    transport_a.ausfuehren(TransportCommand::Schliessen { peer_id: b.id.clone() });
    pumpen(&mut a, &mut rx_a);
    pumpen(&mut b, &mut rx_b);
    assert!(a.store.snapshot().is_empty());
    assert!(b.store.snapshot().is_empty());
    assert_eq!(a.multiplexer.broadcast(a.lokal.zustand()), 0);
}
