//! Signaling-Relay-Adapter
//!
//! Die einzige Grenze zum externen Signaling-Kanal: ausgehend `senden`,
//! eingehend ein Empfaenger fuer `SignalMessage`s. Wie das Relay intern
//! transportiert, bleibt hinter dem Trait verborgen.
//!
//! - `MemoryRelay` – prozessintern ueber eine gemeinsame `Vermittlung`
//! - `TcpRelay`    – Client des `RelayServer` (Length-Prefix + JSON)

use futures_util::{SinkExt, StreamExt};
use tandem_core::PeerId;
use tandem_protocol::{wire::FrameCodec, RelayFrame, SignalMessage};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::error::{SignalingError, SignalingResult};
use crate::routing::Vermittlung;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Ausgehende Seite eines Signaling-Relays
///
/// `senden` blockiert nie; die eingehende Seite ist der Empfaenger, den
/// die jeweilige Implementierung beim Verbinden zurueckgibt.
pub trait SignalingRelay {
    fn senden(&self, nachricht: SignalMessage) -> SignalingResult<()>;
}

impl<R: SignalingRelay + ?Sized> SignalingRelay for Box<R> {
    fn senden(&self, nachricht: SignalMessage) -> SignalingResult<()> {
        (**self).senden(nachricht)
    }
}

// ---------------------------------------------------------------------------
// MemoryRelay
// ---------------------------------------------------------------------------

/// Prozessinternes Relay ueber eine gemeinsame `Vermittlung`
pub struct MemoryRelay {
    peer_id: PeerId,
    generation: u64,
    vermittlung: Vermittlung,
}

impl MemoryRelay {
    /// Registriert `peer_id` in der Vermittlung
    pub fn verbinden(
        vermittlung: &Vermittlung,
        peer_id: PeerId,
    ) -> (Self, mpsc::UnboundedReceiver<SignalMessage>) {
        let (generation, rx) = vermittlung.registrieren(peer_id.clone());
        (
            Self {
                peer_id,
                generation,
                vermittlung: vermittlung.clone(),
            },
            rx,
        )
    }
}

impl SignalingRelay for MemoryRelay {
    fn senden(&self, nachricht: SignalMessage) -> SignalingResult<()> {
        self.vermittlung.weiterleiten(&self.peer_id, nachricht);
        Ok(())
    }
}

impl Drop for MemoryRelay {
    fn drop(&mut self) {
        self.vermittlung.abmelden(&self.peer_id, self.generation);
    }
}

// ---------------------------------------------------------------------------
// TcpRelay
// ---------------------------------------------------------------------------

/// Client-Verbindung zum `RelayServer`
///
/// Ein Hintergrund-Task besitzt den Socket. Endet die Verbindung, endet
/// auch der Empfaenger; `senden` liefert dann `RelayGeschlossen`.
pub struct TcpRelay {
    ausgang: mpsc::UnboundedSender<RelayFrame>,
    task: JoinHandle<()>,
}

impl TcpRelay {
    /// Verbindet sich mit dem Relay und registriert `peer_id`
    pub async fn verbinden<A: ToSocketAddrs>(
        adresse: A,
        peer_id: PeerId,
    ) -> SignalingResult<(Self, mpsc::UnboundedReceiver<SignalMessage>)> {
        let stream = TcpStream::connect(adresse).await?;
        let relay_addr = stream.peer_addr()?;
        let mut framed = Framed::new(stream, FrameCodec::<RelayFrame>::new());

        framed
            .send(RelayFrame::Register {
                peer_id: peer_id.clone(),
            })
            .await
            .map_err(|e| SignalingError::Registrierung(e.to_string()))?;
        tracing::info!(relay = %relay_addr, peer_id = %peer_id, "Mit Relay verbunden");

        let (ausgang_tx, mut ausgang_rx) = mpsc::unbounded_channel::<RelayFrame>();
        let (eingang_tx, eingang_rx) = mpsc::unbounded_channel::<SignalMessage>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = framed.next() => match frame {
                        Some(Ok(RelayFrame::Signal { message })) => {
                            tracing::trace!(von = ?message.from, typ = %message.kind, "Signaling empfangen");
                            if eingang_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Some(Ok(RelayFrame::Register { .. })) => {
                            tracing::warn!("Unerwarteter Register-Frame vom Relay");
                        }
                        Some(Err(e)) => {
                            tracing::warn!(fehler = %e, "Relay-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!("Relay hat die Verbindung getrennt");
                            break;
                        }
                    },
                    ausgehend = ausgang_rx.recv() => match ausgehend {
                        Some(frame) => {
                            if let Err(e) = framed.send(frame).await {
                                tracing::warn!(fehler = %e, "Relay-Senden fehlgeschlagen");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok((
            Self {
                ausgang: ausgang_tx,
                task,
            },
            eingang_rx,
        ))
    }
}

impl SignalingRelay for TcpRelay {
    fn senden(&self, nachricht: SignalMessage) -> SignalingResult<()> {
        self.ausgang
            .send(RelayFrame::Signal { message: nachricht })
            .map_err(|_| SignalingError::RelayGeschlossen)
    }
}

impl Drop for TcpRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::SdpDescriptor;

    #[test]
    fn memory_relay_zwischen_zwei_peers() {
        let v = Vermittlung::neu();
        let (a, _rx_a) = MemoryRelay::verbinden(&v, PeerId::from("a"));
        let (_b, mut rx_b) = MemoryRelay::verbinden(&v, PeerId::from("b"));

        a.senden(SignalMessage::offer(PeerId::from("b"), &SdpDescriptor::offer("x")))
            .unwrap();

        let n = rx_b.try_recv().unwrap();
        assert_eq!(n.from, Some(PeerId::from("a")));
    }

    #[test]
    fn memory_relay_meldet_beim_drop_ab() {
        let v = Vermittlung::neu();
        {
            let (_a, _rx) = MemoryRelay::verbinden(&v, PeerId::from("a"));
            assert!(v.ist_registriert(&PeerId::from("a")));
        }
        assert!(!v.ist_registriert(&PeerId::from("a")));
    }
}
