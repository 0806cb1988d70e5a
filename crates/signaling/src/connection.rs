//! Relay-Connection – Verwaltet eine einzelne TCP-Verbindung zum Relay
//!
//! ## Ablauf
//! ```text
//! Verbunden --Register--> Registriert --EOF/Fehler/Shutdown--> Getrennt
//! ```
//!
//! Der erste Frame muss `Register` sein, sonst wird die Verbindung
//! getrennt. Danach werden `Signal`-Frames anhand von `to` weitergeleitet.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tandem_protocol::{wire::FrameCodec, RelayFrame};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::routing::Vermittlung;

/// Verarbeitet eine einzelne Relay-Verbindung
pub struct RelayConnection {
    vermittlung: Vermittlung,
    peer_addr: SocketAddr,
    registrierungs_timeout: Duration,
}

impl RelayConnection {
    pub fn neu(vermittlung: Vermittlung, peer_addr: SocketAddr, registrierungs_timeout: Duration) -> Self {
        Self {
            vermittlung,
            peer_addr,
            registrierungs_timeout,
        }
    }

    /// Startet die Verarbeitungsschleife bis Trennung oder Shutdown
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let mut framed = Framed::new(stream, FrameCodec::<RelayFrame>::new());

        // Registrierung abwarten
        let peer_id = match tokio::time::timeout(self.registrierungs_timeout, framed.next()).await {
            Ok(Some(Ok(RelayFrame::Register { peer_id }))) => peer_id,
            Ok(Some(Ok(RelayFrame::Signal { .. }))) => {
                tracing::warn!(peer = %peer_addr, "Signal vor Register – Verbindung getrennt");
                return;
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                return;
            }
            Ok(None) => {
                tracing::debug!(peer = %peer_addr, "Verbindung vor Registrierung getrennt");
                return;
            }
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Registrierungs-Timeout");
                return;
            }
        };

        let (generation, mut eingang) = self.vermittlung.registrieren(peer_id.clone());

        loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(RelayFrame::Signal { message })) => {
                            self.vermittlung.weiterleiten(&peer_id, message);
                        }
                        Some(Ok(RelayFrame::Register { .. })) => {
                            tracing::warn!(peer_id = %peer_id, "Doppelte Registrierung ignoriert");
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer_id = %peer_id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer_id = %peer_id, "Verbindung vom Peer getrennt");
                            break;
                        }
                    }
                }

                zustellung = eingang.recv() => {
                    match zustellung {
                        Some(message) => {
                            if let Err(e) = framed.send(RelayFrame::Signal { message }).await {
                                tracing::warn!(peer_id = %peer_id, fehler = %e, "Senden fehlgeschlagen");
                                break;
                            }
                        }
                        None => {
                            tracing::info!(peer_id = %peer_id, "Registrierung ersetzt – Verbindung getrennt");
                            break;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer_id = %peer_id, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        self.vermittlung.abmelden(&peer_id, generation);
        tracing::debug!(peer = %peer_addr, "Verbindungs-Task beendet");
    }
}
