//! WebRTC-Transport (Feature `webrtc`)
//!
//! Ein Worker-Task pro Peer besitzt die `RTCPeerConnection` und arbeitet
//! die Befehle des Negotiators der Reihe nach ab. Kandidaten werden per
//! Trickle-ICE gemeldet, sobald der Agent sie findet. Der Datenkanal
//! heisst `tandem` und ist geordnet und zuverlaessig.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_core::PeerId;
use tandem_protocol::{IceCandidate, SdpDescriptor};
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::error::{TransportError, TransportResult};
use crate::{DataChannel, PeerTransport, TransportCommand, TransportEvent};

/// Label des Anwendungs-Datenkanals
const KANAL_LABEL: &str = "tandem";

fn rtc_fehler(e: webrtc::Error) -> TransportError {
    TransportError::WebRtc(e.to_string())
}

// ---------------------------------------------------------------------------
// RtcKanal
// ---------------------------------------------------------------------------

/// Sendeseite eines WebRTC-Datenkanals
struct RtcKanal {
    tx: mpsc::UnboundedSender<Bytes>,
    offen: Arc<AtomicBool>,
}

impl DataChannel for RtcKanal {
    fn ist_offen(&self) -> bool {
        self.offen.load(Ordering::SeqCst)
    }

    fn senden(&self, daten: Bytes) -> TransportResult<()> {
        if !self.ist_offen() {
            return Err(TransportError::KanalGeschlossen);
        }
        self.tx
            .send(daten)
            .map_err(|_| TransportError::KanalGeschlossen)
    }
}

/// Haengt open/message/close-Callbacks an den Datenkanal
fn kanal_anbringen(
    dc: Arc<RTCDataChannel>,
    peer_id: PeerId,
    events: mpsc::UnboundedSender<TransportEvent>,
    offen: Arc<AtomicBool>,
) {
    {
        let dc_send = Arc::clone(&dc);
        let events = events.clone();
        let offen = Arc::clone(&offen);
        let peer_id = peer_id.clone();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
                tokio::spawn(async move {
                    while let Some(daten) = rx.recv().await {
                        if let Err(e) = dc_send.send(&daten).await {
                            tracing::warn!(fehler = %e, "WebRTC-Senden fehlgeschlagen");
                            break;
                        }
                    }
                });

                offen.store(true, Ordering::SeqCst);
                tracing::info!(peer_id = %peer_id, "WebRTC-Datenkanal offen");
                let _ = events.send(TransportEvent::Verbunden {
                    peer_id: peer_id.clone(),
                    kanal: Box::new(RtcKanal { tx, offen }),
                });
                let _ = events.send(TransportEvent::KanalOffen { peer_id });
            })
        }));
    }

    {
        let events = events.clone();
        let peer_id = peer_id.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let _ = events.send(TransportEvent::KanalNachricht {
                peer_id: peer_id.clone(),
                daten: msg.data,
            });
            Box::pin(async {})
        }));
    }

    dc.on_close(Box::new(move || {
        if offen.swap(false, Ordering::SeqCst) {
            tracing::info!(peer_id = %peer_id, "WebRTC-Datenkanal geschlossen");
            let _ = events.send(TransportEvent::KanalGeschlossen {
                peer_id: peer_id.clone(),
            });
        }
        Box::pin(async {})
    }));
}

// ---------------------------------------------------------------------------
// Peer-Worker
// ---------------------------------------------------------------------------

struct PeerWorker {
    peer_id: PeerId,
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<TransportEvent>,
    offen: Arc<AtomicBool>,
}

impl PeerWorker {
    async fn neu(
        peer_id: PeerId,
        api: &API,
        ice_server: Vec<String>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportResult<Self> {
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_server,
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await.map_err(rtc_fehler)?);
        let offen = Arc::new(AtomicBool::new(false));

        {
            let events = events.clone();
            let peer_id = peer_id.clone();
            pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
                let events = events.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(c) = c else { return };
                    match c.to_json() {
                        Ok(init) => {
                            let _ = events.send(TransportEvent::LokalerKandidat {
                                peer_id,
                                kandidat: IceCandidate {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_m_line_index: init.sdp_mline_index,
                                    username_fragment: init.username_fragment,
                                },
                            });
                        }
                        Err(e) => tracing::warn!(peer_id = %peer_id, fehler = %e, "Kandidat nicht serialisierbar"),
                    }
                })
            }));
        }

        {
            let events = events.clone();
            let peer_id = peer_id.clone();
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                tracing::debug!(peer_id = %peer_id, zustand = %s, "WebRTC-Verbindungszustand");
                if s == RTCPeerConnectionState::Failed {
                    let _ = events.send(TransportEvent::Fehlgeschlagen {
                        peer_id: peer_id.clone(),
                        grund: "ICE/DTLS fehlgeschlagen".into(),
                    });
                }
                Box::pin(async {})
            }));
        }

        {
            let events = events.clone();
            let peer_id = peer_id.clone();
            let offen = Arc::clone(&offen);
            pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                if dc.label() == KANAL_LABEL {
                    kanal_anbringen(dc, peer_id.clone(), events.clone(), Arc::clone(&offen));
                } else {
                    tracing::debug!(peer_id = %peer_id, label = %dc.label(), "Fremder Datenkanal ignoriert");
                }
                Box::pin(async {})
            }));
        }

        Ok(Self {
            peer_id,
            pc,
            events,
            offen,
        })
    }

    fn melden(&self, ereignis: TransportEvent) {
        let _ = self.events.send(ereignis);
    }

    async fn angebot(&self) -> TransportResult<()> {
        let dc = self
            .pc
            .create_data_channel(
                KANAL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(rtc_fehler)?;
        kanal_anbringen(
            dc,
            self.peer_id.clone(),
            self.events.clone(),
            Arc::clone(&self.offen),
        );

        let offer = self.pc.create_offer(None).await.map_err(rtc_fehler)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(rtc_fehler)?;
        self.melden(TransportEvent::LokaleBeschreibung {
            peer_id: self.peer_id.clone(),
            beschreibung: SdpDescriptor::offer(offer.sdp),
        });
        Ok(())
    }

    async fn antwort(&self, angebot: SdpDescriptor) -> TransportResult<()> {
        let desc = RTCSessionDescription::offer(angebot.sdp).map_err(rtc_fehler)?;
        self.pc.set_remote_description(desc).await.map_err(rtc_fehler)?;

        let answer = self.pc.create_answer(None).await.map_err(rtc_fehler)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(rtc_fehler)?;
        self.melden(TransportEvent::LokaleBeschreibung {
            peer_id: self.peer_id.clone(),
            beschreibung: SdpDescriptor::answer(answer.sdp),
        });
        Ok(())
    }

    async fn antwort_anwenden(&self, antwort: SdpDescriptor) -> TransportResult<()> {
        let desc = RTCSessionDescription::answer(antwort.sdp).map_err(rtc_fehler)?;
        self.pc.set_remote_description(desc).await.map_err(rtc_fehler)
    }

    async fn kandidat(&self, kandidat: IceCandidate) -> TransportResult<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: kandidat.candidate,
                sdp_mid: kandidat.sdp_mid,
                sdp_mline_index: kandidat.sdp_m_line_index,
                username_fragment: kandidat.username_fragment,
            })
            .await
            .map_err(rtc_fehler)
    }

    async fn schliessen(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::debug!(peer_id = %self.peer_id, fehler = %e, "PeerConnection-Close");
        }
        if self.offen.swap(false, Ordering::SeqCst) {
            self.melden(TransportEvent::KanalGeschlossen {
                peer_id: self.peer_id.clone(),
            });
        }
    }

    /// Arbeitet Befehle ab bis `Schliessen` oder Fehler
    async fn laufen(self, mut befehle: mpsc::UnboundedReceiver<TransportCommand>) {
        while let Some(befehl) = befehle.recv().await {
            let ergebnis = match befehl {
                TransportCommand::AngebotErstellen { .. } => self.angebot().await,
                TransportCommand::AntwortErstellen { angebot, .. } => self.antwort(angebot).await,
                TransportCommand::AntwortAnwenden { antwort, .. } => {
                    self.antwort_anwenden(antwort).await
                }
                TransportCommand::KandidatHinzufuegen { kandidat, .. } => {
                    self.kandidat(kandidat).await
                }
                TransportCommand::Schliessen { .. } => {
                    self.schliessen().await;
                    return;
                }
            };

            if let Err(e) = ergebnis {
                tracing::warn!(peer_id = %self.peer_id, fehler = %e, "WebRTC-Befehl fehlgeschlagen");
                self.melden(TransportEvent::Fehlgeschlagen {
                    peer_id: self.peer_id.clone(),
                    grund: e.to_string(),
                });
                self.schliessen().await;
                return;
            }
        }
        self.schliessen().await;
    }
}

// ---------------------------------------------------------------------------
// WebRtcTransport
// ---------------------------------------------------------------------------

/// WebRTC-Backend
pub struct WebRtcTransport {
    api: Arc<API>,
    stun_server: Vec<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    worker: HashMap<PeerId, mpsc::UnboundedSender<TransportCommand>>,
}

impl WebRtcTransport {
    /// Erstellt das Backend mit den gegebenen STUN-Servern
    pub fn neu(
        stun_server: Vec<String>,
    ) -> TransportResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let mut media = MediaEngine::default();
        let registry =
            register_default_interceptors(Registry::new(), &mut media).map_err(rtc_fehler)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let (events, rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                api: Arc::new(api),
                stun_server,
                events,
                worker: HashMap::new(),
            },
            rx,
        ))
    }

    fn worker_starten(&mut self, peer_id: PeerId) -> mpsc::UnboundedSender<TransportCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        let api = Arc::clone(&self.api);
        let stun = self.stun_server.clone();
        let events = self.events.clone();
        let task_peer = peer_id.clone();
        tokio::spawn(async move {
            match PeerWorker::neu(task_peer.clone(), &api, stun, events.clone()).await {
                Ok(worker) => worker.laufen(rx).await,
                Err(e) => {
                    let _ = events.send(TransportEvent::Fehlgeschlagen {
                        peer_id: task_peer,
                        grund: e.to_string(),
                    });
                }
            }
        });
        self.worker.insert(peer_id, tx.clone());
        tx
    }
}

impl PeerTransport for WebRtcTransport {
    fn ausfuehren(&mut self, befehl: TransportCommand) {
        let peer_id = befehl.peer_id().clone();
        tracing::trace!(peer_id = %peer_id, befehl = ?befehl, "WebRTC-Transport");

        if let TransportCommand::Schliessen { .. } = befehl {
            if let Some(tx) = self.worker.remove(&peer_id) {
                let _ = tx.send(befehl);
            }
            return;
        }

        // Neues Offer/Answer startet immer eine frische PeerConnection
        let neu_starten = matches!(
            befehl,
            TransportCommand::AngebotErstellen { .. } | TransportCommand::AntwortErstellen { .. }
        );
        if neu_starten {
            if let Some(alt) = self.worker.remove(&peer_id) {
                let _ = alt.send(TransportCommand::Schliessen {
                    peer_id: peer_id.clone(),
                });
            }
        }

        let tx = match self.worker.get(&peer_id) {
            Some(tx) if !tx.is_closed() => tx.clone(),
            _ => self.worker_starten(peer_id.clone()),
        };
        if tx.send(befehl).is_err() {
            tracing::warn!(peer_id = %peer_id, "WebRTC-Worker beendet, Befehl verworfen");
        }
    }
}
