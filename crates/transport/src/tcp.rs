//! TCP-Transport
//!
//! Einfaches Backend ohne NAT-Traversal: Der Initiator bindet beim Offer
//! einen Listener auf einem freien Port und kuendigt dessen Adresse als
//! Kandidat `tcp <ip:port>` an. Der Responder verbindet sich, sobald er
//! den Kandidaten erhaelt. Nachrichten werden als u32-BE-Laenge + Payload
//! gerahmt (`LengthDelimitedCodec`).

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_core::PeerId;
use tandem_protocol::{IceCandidate, SdpDescriptor, SdpType};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::{TransportError, TransportResult};
use crate::{DataChannel, PeerTransport, TransportCommand, TransportEvent};

/// Deskriptor-Inhalt des TCP-Backends
pub const TCP_SDP: &str = "tandem-tcp v1";

/// Praefix der Kandidaten-Zeile
const KANDIDAT_PRAEFIX: &str = "tcp ";

/// Maximale Groesse einer Kanal-Nachricht
const MAX_NACHRICHT: usize = 64 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_NACHRICHT)
        .new_codec()
}

/// Liest die Socket-Adresse aus einer Kandidaten-Zeile
pub fn kandidat_adresse(kandidat: &IceCandidate) -> Option<SocketAddr> {
    kandidat
        .candidate
        .strip_prefix(KANDIDAT_PRAEFIX)?
        .trim()
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// TcpKanal
// ---------------------------------------------------------------------------

/// Sendeseite einer TCP-Verbindung; ein Schreib-Task leert die Queue
struct TcpKanal {
    tx: mpsc::UnboundedSender<Bytes>,
    offen: Arc<AtomicBool>,
}

impl DataChannel for TcpKanal {
    fn ist_offen(&self) -> bool {
        self.offen.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn senden(&self, daten: Bytes) -> TransportResult<()> {
        if !self.ist_offen() {
            return Err(TransportError::KanalGeschlossen);
        }
        if daten.len() > MAX_NACHRICHT {
            return Err(TransportError::ZuGross {
                laenge: daten.len(),
                max: MAX_NACHRICHT,
            });
        }
        self.tx
            .send(daten)
            .map_err(|_| TransportError::KanalGeschlossen)
    }
}

// ---------------------------------------------------------------------------
// Verbindungs-Task
// ---------------------------------------------------------------------------

/// Betreibt eine aufgebaute Verbindung bis EOF oder Fehler
async fn verbindung_betreiben(
    stream: TcpStream,
    peer_id: PeerId,
    events: mpsc::UnboundedSender<TransportEvent>,
    offen: Arc<AtomicBool>,
) {
    let _ = stream.set_nodelay(true);
    let (lesen, schreiben) = stream.into_split();
    let mut eingang = FramedRead::new(lesen, codec());
    let mut ausgang = FramedWrite::new(schreiben, codec());

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    offen.store(true, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Verbunden {
        peer_id: peer_id.clone(),
        kanal: Box::new(TcpKanal {
            tx,
            offen: Arc::clone(&offen),
        }),
    });
    let _ = events.send(TransportEvent::KanalOffen {
        peer_id: peer_id.clone(),
    });
    tracing::info!(peer_id = %peer_id, "TCP-Kanal offen");

    // Lesen und Schreiben im selben Task, damit `abort()` beide Haelften schliesst
    loop {
        tokio::select! {
            frame = eingang.next() => match frame {
                Some(Ok(daten)) => {
                    let _ = events.send(TransportEvent::KanalNachricht {
                        peer_id: peer_id.clone(),
                        daten: daten.freeze(),
                    });
                }
                Some(Err(e)) => {
                    tracing::warn!(peer_id = %peer_id, fehler = %e, "TCP-Lesefehler");
                    break;
                }
                None => break,
            },
            Some(daten) = rx.recv() => {
                if let Err(e) = ausgang.send(daten).await {
                    tracing::warn!(peer_id = %peer_id, fehler = %e, "TCP-Senden fehlgeschlagen");
                    break;
                }
            }
        }
    }

    if offen.swap(false, Ordering::SeqCst) {
        tracing::info!(peer_id = %peer_id, "TCP-Kanal geschlossen");
        let _ = events.send(TransportEvent::KanalGeschlossen { peer_id });
    }
}

// ---------------------------------------------------------------------------
// TcpTransport
// ---------------------------------------------------------------------------

/// Zustand je Peer
struct TcpPeer {
    rolle_responder: bool,
    task: Option<JoinHandle<()>>,
    offen: Arc<AtomicBool>,
}

/// TCP-Backend
pub struct TcpTransport {
    bind_ip: IpAddr,
    events: mpsc::UnboundedSender<TransportEvent>,
    peers: HashMap<PeerId, TcpPeer>,
}

impl TcpTransport {
    /// Erstellt das Backend; `bind_ip` wird auch als Kandidaten-Adresse angekuendigt
    pub fn neu(bind_ip: IpAddr) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                bind_ip,
                events,
                peers: HashMap::new(),
            },
            rx,
        )
    }

    fn melden(&self, ereignis: TransportEvent) {
        let _ = self.events.send(ereignis);
    }

    fn fehlschlagen(&self, peer_id: PeerId, grund: impl Into<String>) {
        let grund = grund.into();
        tracing::warn!(peer_id = %peer_id, grund = %grund, "TCP-Transport fehlgeschlagen");
        self.melden(TransportEvent::Fehlgeschlagen { peer_id, grund });
    }

    fn lauschen(&mut self, peer_id: PeerId) -> TransportResult<SocketAddr> {
        self.abbauen(&peer_id);

        let std_listener = std::net::TcpListener::bind(SocketAddr::new(self.bind_ip, 0))?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let adresse = listener.local_addr()?;

        let offen = Arc::new(AtomicBool::new(false));
        let events = self.events.clone();
        let task_offen = Arc::clone(&offen);
        let task_peer = peer_id.clone();
        let task = tokio::spawn(async move {
            match listener.accept().await {
                Ok((stream, von)) => {
                    tracing::debug!(peer_id = %task_peer, von = %von, "TCP-Verbindung angenommen");
                    verbindung_betreiben(stream, task_peer, events, task_offen).await;
                }
                Err(e) => {
                    let _ = events.send(TransportEvent::Fehlgeschlagen {
                        peer_id: task_peer,
                        grund: format!("Accept fehlgeschlagen: {}", e),
                    });
                }
            }
        });

        self.peers.insert(
            peer_id,
            TcpPeer {
                rolle_responder: false,
                task: Some(task),
                offen,
            },
        );
        Ok(adresse)
    }

    fn verbinden(&mut self, peer_id: PeerId, adresse: SocketAddr) {
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return;
        };
        if !peer.rolle_responder || peer.task.is_some() {
            return;
        }

        let events = self.events.clone();
        let offen = Arc::clone(&peer.offen);
        let task_peer = peer_id.clone();
        peer.task = Some(tokio::spawn(async move {
            match TcpStream::connect(adresse).await {
                Ok(stream) => verbindung_betreiben(stream, task_peer, events, offen).await,
                Err(e) => {
                    let _ = events.send(TransportEvent::Fehlgeschlagen {
                        peer_id: task_peer,
                        grund: format!("Verbindung zu {} fehlgeschlagen: {}", adresse, e),
                    });
                }
            }
        }));
        tracing::debug!(peer_id = %peer_id, adresse = %adresse, "TCP-Verbindungsaufbau");
    }

    /// Beendet Tasks zu `peer_id`; gibt true zurueck wenn ein Kanal offen war
    fn abbauen(&mut self, peer_id: &PeerId) -> bool {
        let Some(peer) = self.peers.remove(peer_id) else {
            return false;
        };
        if let Some(task) = peer.task {
            task.abort();
        }
        peer.offen.swap(false, Ordering::SeqCst)
    }
}

fn deskriptor_pruefen(d: &SdpDescriptor, erwartet: SdpType) -> bool {
    d.typ == erwartet && d.sdp == TCP_SDP
}

impl PeerTransport for TcpTransport {
    fn ausfuehren(&mut self, befehl: TransportCommand) {
        tracing::trace!(befehl = ?befehl, "TCP-Transport");
        match befehl {
            TransportCommand::AngebotErstellen { peer_id } => match self.lauschen(peer_id.clone()) {
                Ok(adresse) => {
                    tracing::info!(peer_id = %peer_id, adresse = %adresse, "TCP-Listener bereit");
                    self.melden(TransportEvent::LokaleBeschreibung {
                        peer_id: peer_id.clone(),
                        beschreibung: SdpDescriptor::offer(TCP_SDP),
                    });
                    self.melden(TransportEvent::LokalerKandidat {
                        peer_id,
                        kandidat: IceCandidate::neu(format!("{}{}", KANDIDAT_PRAEFIX, adresse)),
                    });
                }
                Err(e) => self.fehlschlagen(peer_id, e.to_string()),
            },
            TransportCommand::AntwortErstellen { peer_id, angebot } => {
                if !deskriptor_pruefen(&angebot, SdpType::Offer) {
                    self.fehlschlagen(peer_id, "Offer passt nicht zum TCP-Backend");
                    return;
                }
                self.abbauen(&peer_id);
                self.peers.insert(
                    peer_id.clone(),
                    TcpPeer {
                        rolle_responder: true,
                        task: None,
                        offen: Arc::new(AtomicBool::new(false)),
                    },
                );
                self.melden(TransportEvent::LokaleBeschreibung {
                    peer_id,
                    beschreibung: SdpDescriptor::answer(TCP_SDP),
                });
            }
            TransportCommand::AntwortAnwenden { peer_id, antwort } => {
                if !deskriptor_pruefen(&antwort, SdpType::Answer) {
                    self.fehlschlagen(peer_id, "Answer passt nicht zum TCP-Backend");
                }
            }
            TransportCommand::KandidatHinzufuegen { peer_id, kandidat } => {
                match kandidat_adresse(&kandidat) {
                    Some(adresse) => self.verbinden(peer_id, adresse),
                    None => {
                        tracing::debug!(peer_id = %peer_id, kandidat = %kandidat.candidate, "Kandidat ignoriert")
                    }
                }
            }
            TransportCommand::Schliessen { peer_id } => {
                if self.abbauen(&peer_id) {
                    self.melden(TransportEvent::KanalGeschlossen { peer_id });
                }
            }
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for (_, peer) in self.peers.drain() {
            if let Some(task) = peer.task {
                task.abort();
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
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const LOKAL: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn naechstes(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timeout beim Warten auf Ereignis")
            .expect("Ereignis-Kanal geschlossen")
    }

    #[test]
    fn kandidat_adresse_parsen() {
        let k = IceCandidate::neu("tcp 127.0.0.1:4000");
        assert_eq!(kandidat_adresse(&k), Some("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(kandidat_adresse(&IceCandidate::neu("candidate:1 1 udp")), None);
        assert_eq!(kandidat_adresse(&IceCandidate::neu("tcp kaputt")), None);
    }

    #[test]
    fn zu_grosse_nachricht_laesst_kanal_offen() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let kanal = TcpKanal {
            tx,
            offen: Arc::new(AtomicBool::new(true)),
        };

        let gross = Bytes::from(vec![b'x'; MAX_NACHRICHT + 1]);
        assert!(matches!(
            kanal.senden(gross),
            Err(TransportError::ZuGross { laenge, max }) if laenge == MAX_NACHRICHT + 1 && max == MAX_NACHRICHT
        ));
        assert!(kanal.ist_offen());
        assert!(rx.try_recv().is_err());

        kanal.senden(Bytes::from_static(b"klein")).unwrap();
        assert_eq!(&rx.try_recv().unwrap()[..], b"klein");
    }

    #[tokio::test]
    async fn verbindung_und_nachrichten() {
        let a_id = PeerId::from("a");
        let b_id = PeerId::from("b");
        let (mut a, mut rx_a) = TcpTransport::neu(LOKAL);
        let (mut b, mut rx_b) = TcpTransport::neu(LOKAL);

        a.ausfuehren(TransportCommand::AngebotErstellen {
            peer_id: b_id.clone(),
        });
        let angebot = match naechstes(&mut rx_a).await {
            TransportEvent::LokaleBeschreibung { beschreibung, .. } => beschreibung,
            e => panic!("Beschreibung erwartet: {:?}", e),
        };
        let kandidat = match naechstes(&mut rx_a).await {
            TransportEvent::LokalerKandidat { kandidat, .. } => kandidat,
            e => panic!("Kandidat erwartet: {:?}", e),
        };

        b.ausfuehren(TransportCommand::AntwortErstellen {
            peer_id: a_id.clone(),
            angebot,
        });
        let antwort = match naechstes(&mut rx_b).await {
            TransportEvent::LokaleBeschreibung { beschreibung, .. } => beschreibung,
            e => panic!("Beschreibung erwartet: {:?}", e),
        };
        a.ausfuehren(TransportCommand::AntwortAnwenden {
            peer_id: b_id.clone(),
            antwort,
        });
        b.ausfuehren(TransportCommand::KandidatHinzufuegen {
            peer_id: a_id.clone(),
            kandidat,
        });

        let kanal_b = match naechstes(&mut rx_b).await {
            TransportEvent::Verbunden { kanal, .. } => kanal,
            e => panic!("Verbunden erwartet: {:?}", e),
        };
        assert!(matches!(naechstes(&mut rx_b).await, TransportEvent::KanalOffen { .. }));
        let kanal_a = match naechstes(&mut rx_a).await {
            TransportEvent::Verbunden { kanal, .. } => kanal,
            e => panic!("Verbunden erwartet: {:?}", e),
        };
        assert!(matches!(naechstes(&mut rx_a).await, TransportEvent::KanalOffen { .. }));

        kanal_b.senden(Bytes::from_static(b"eins")).unwrap();
        kanal_b.senden(Bytes::from_static(b"zwei")).unwrap();
        for erwartet in [&b"eins"[..], &b"zwei"[..]] {
            match naechstes(&mut rx_a).await {
                TransportEvent::KanalNachricht { peer_id, daten } => {
                    assert_eq!(peer_id, b_id);
                    assert_eq!(&daten[..], erwartet);
                }
                e => panic!("Nachricht erwartet: {:?}", e),
            }
        }

        kanal_a.senden(Bytes::from_static(b"pong")).unwrap();
        assert!(matches!(
            naechstes(&mut rx_b).await,
            TransportEvent::KanalNachricht { .. }
        ));

        // Schliessen auf A beendet die Verbindung, B sieht EOF
        a.ausfuehren(TransportCommand::Schliessen {
            peer_id: b_id.clone(),
        });
        assert!(matches!(
            naechstes(&mut rx_a).await,
            TransportEvent::KanalGeschlossen { .. }
        ));
        assert!(!kanal_a.ist_offen());
        assert!(matches!(
            naechstes(&mut rx_b).await,
            TransportEvent::KanalGeschlossen { .. }
        ));
    }

    #[tokio::test]
    async fn fremdes_offer_scheitert() {
        let (mut b, mut rx_b) = TcpTransport::neu(LOKAL);
        b.ausfuehren(TransportCommand::AntwortErstellen {
            peer_id: PeerId::from("a"),
            angebot: SdpDescriptor::offer("v=0"),
        });
        assert!(matches!(
            naechstes(&mut rx_b).await,
            TransportEvent::Fehlgeschlagen { .. }
        ));
    }

    #[tokio::test]
    async fn schliessen_vor_verbindung_ist_still() {
        let (mut a, mut rx_a) = TcpTransport::neu(LOKAL);
        a.ausfuehren(TransportCommand::AngebotErstellen {
            peer_id: PeerId::from("b"),
        });
        naechstes(&mut rx_a).await;
        naechstes(&mut rx_a).await;

        a.ausfuehren(TransportCommand::Schliessen {
            peer_id: PeerId::from("b"),
        });
        assert!(rx_a.try_recv().is_err());
    }
}
