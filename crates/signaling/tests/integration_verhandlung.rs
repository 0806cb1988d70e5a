//! Integration-Tests: Zwei Negotiators ueber MemoryRelay und MemoryTransport

use tandem_core::PeerId;
use tandem_protocol::{SdpDescriptor, SignalMessage};
use tandem_signaling::{
    MemoryRelay, NegotiatorConfig, Role, SessionNegotiator, SignalingRelay, TransportState, Vermittlung,
};
use tandem_transport::{
    ChannelRef, DataChannel, MemoryNetz, MemoryTransport, TransportEvent,
};
use tokio::sync::mpsc;

struct Knoten {
    negotiator: SessionNegotiator<MemoryRelay, MemoryTransport>,
    signale: mpsc::UnboundedReceiver<SignalMessage>,
    ereignisse: mpsc::UnboundedReceiver<TransportEvent>,
    kanaele: Vec<Box<dyn DataChannel>>,
    fehler: usize,
}

impl Knoten {
    fn neu(vermittlung: &Vermittlung, netz: &MemoryNetz, id: &str) -> Self {
        let (relay, signale) = MemoryRelay::verbinden(vermittlung, PeerId::from(id));
        let (transport, ereignisse) = netz.transport(PeerId::from(id));
        Self {
            negotiator: SessionNegotiator::neu(
                PeerId::from(id),
                relay,
                transport,
                NegotiatorConfig::default(),
            ),
            signale,
            ereignisse,
            kanaele: Vec::new(),
            fehler: 0,
        }
    }

    /// Verarbeitet alle anstehenden Nachrichten; gibt true zurueck wenn etwas passiert ist
    fn pumpen(&mut self) -> bool {
        let mut etwas = false;
        while let Ok(nachricht) = self.signale.try_recv() {
            etwas = true;
            if self.negotiator.accept_message(nachricht).is_err() {
                self.fehler += 1;
            }
        }
        while let Ok(ereignis) = self.ereignisse.try_recv() {
            etwas = true;
            match ereignis {
                TransportEvent::Verbunden { peer_id, kanal } => {
                    self.kanaele.push(kanal);
                    let kanal_ref = ChannelRef(self.kanaele.len() as u64);
                    self.negotiator.transport_verbunden(&peer_id, kanal_ref);
                }
                andere => {
                    if self.negotiator.transport_ereignis(&andere).is_err() {
                        self.fehler += 1;
                    }
                }
            }
        }
        etwas
    }
}

fn bis_ruhe(a: &mut Knoten, b: &mut Knoten) {
    for _ in 0..32 {
        let x = a.pumpen();
        let y = b.pumpen();
        if !x && !y {
            return;
        }
    }
    panic!("Verhandlung kommt nicht zur Ruhe");
}

#[test]
fn initiator_und_responder_verbinden_sich() {
    let vermittlung = Vermittlung::neu();
    let netz = MemoryNetz::neu();
    let mut host = Knoten::neu(&vermittlung, &netz, "host");
    let mut remote = Knoten::neu(&vermittlung, &netz, "remote_peer_1");

    host.negotiator
        .create_session(PeerId::from("remote_peer_1"))
        .unwrap();
    bis_ruhe(&mut host, &mut remote);

    let s = host.negotiator.sitzung(&PeerId::from("remote_peer_1")).unwrap();
    assert_eq!(s.rolle(), Role::Initiator);
    assert_eq!(s.zustand(), TransportState::Connected);
    assert!(s.kanal().is_some());

    let r = remote.negotiator.sitzung(&PeerId::from("host")).unwrap();
    assert_eq!(r.rolle(), Role::Responder);
    assert_eq!(r.zustand(), TransportState::Connected);

    assert_eq!(netz.offene_kanaele(), 1);
    assert_eq!(host.fehler + remote.fehler, 0);
}

#[test]
fn gleichzeitige_offers_fuehren_zu_einer_verbindung() {
    let vermittlung = Vermittlung::neu();
    let netz = MemoryNetz::neu();
    let mut alpha = Knoten::neu(&vermittlung, &netz, "alpha");
    let mut beta = Knoten::neu(&vermittlung, &netz, "beta");

    alpha.negotiator.create_session(PeerId::from("beta")).unwrap();
    beta.negotiator.create_session(PeerId::from("alpha")).unwrap();
    bis_ruhe(&mut alpha, &mut beta);

    let a = alpha.negotiator.sitzung(&PeerId::from("beta")).unwrap();
    let b = beta.negotiator.sitzung(&PeerId::from("alpha")).unwrap();
    assert_eq!(a.rolle(), Role::Initiator);
    assert_eq!(b.rolle(), Role::Responder);
    assert_eq!(a.zustand(), TransportState::Connected);
    assert_eq!(b.zustand(), TransportState::Connected);
    assert_eq!(netz.offene_kanaele(), 1);
}

#[test]
fn explizites_schliessen_beendet_beide_seiten() {
    let vermittlung = Vermittlung::neu();
    let netz = MemoryNetz::neu();
    let mut host = Knoten::neu(&vermittlung, &netz, "host");
    let mut remote = Knoten::neu(&vermittlung, &netz, "remote_peer_1");

    host.negotiator
        .create_session(PeerId::from("remote_peer_1"))
        .unwrap();
    bis_ruhe(&mut host, &mut remote);

    assert!(host.negotiator.close_session(&PeerId::from("remote_peer_1")));
    bis_ruhe(&mut host, &mut remote);

    assert_eq!(host.negotiator.anzahl(), 0);
    assert_eq!(remote.negotiator.anzahl(), 0);
    assert_eq!(netz.offene_kanaele(), 0);
}

#[test]
fn kaputtes_offer_ueber_relay_wird_verworfen() {
    let vermittlung = Vermittlung::neu();
    let netz = MemoryNetz::neu();
    let (mallory, _rx) = MemoryRelay::verbinden(&vermittlung, PeerId::from("mallory"));
    let mut remote = Knoten::neu(&vermittlung, &netz, "remote_peer_1");

    mallory
        .senden(SignalMessage::offer(
            PeerId::from("remote_peer_1"),
            &SdpDescriptor::answer("vertauscht"),
        ))
        .unwrap();
    remote.pumpen();

    assert_eq!(remote.fehler, 1);
    assert_eq!(remote.negotiator.anzahl(), 0);
}
