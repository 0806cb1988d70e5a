//! Tandem-Knoten – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, verbindet sich mit
//! dem Relay und treibt den Knoten auf einem single-threaded Runtime.
//!
//! Eingabe ueber stdin: `w`/`a`/`s`/`d` bewegen, `/name <Name>` aendert
//! den Anzeigenamen, `q` beendet.

use anyhow::{Context, Result};
use tandem_core::PeerId;
use tandem_node::config::{Backend, Modus, NodeConfig, STANDARD_PFAD};
use tandem_node::{befehl_lesen, laufen, Befehl, Eingaenge, Node, NodeEvent};
use tandem_observability::logging_initialisieren;
use tandem_protocol::SignalMessage;
use tandem_signaling::TcpRelay;
use tandem_sync::LocalEntity;
use tandem_transport::{PeerTransport, TcpTransport, TransportEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::LocalSet;

fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("TANDEM_CONFIG").unwrap_or_else(|_| STANDARD_PFAD.into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = NodeConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Tandem-Knoten wird initialisiert"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Runtime konnte nicht erstellt werden")?;
    let local = LocalSet::new();
    local.block_on(&runtime, knoten_starten(config))
}

async fn knoten_starten(config: NodeConfig) -> Result<()> {
    let lokal_id = config.lokale_peer_id();
    let (relay, signale) = TcpRelay::verbinden(config.relay.adresse.as_str(), lokal_id.clone())
        .await
        .with_context(|| format!("Relay '{}' nicht erreichbar", config.relay.adresse))?;

    match config.transport.backend {
        Backend::Tcp => {
            let (transport, ereignisse) = TcpTransport::neu(config.transport.bind_ip);
            betreiben(config, lokal_id, relay, signale, transport, ereignisse).await
        }
        #[cfg(feature = "webrtc")]
        Backend::Webrtc => {
            let (transport, ereignisse) =
                tandem_transport::WebRtcTransport::neu(config.transport.stun_server.clone())
                    .context("WebRTC-Backend konnte nicht erstellt werden")?;
            betreiben(config, lokal_id, relay, signale, transport, ereignisse).await
        }
        #[cfg(not(feature = "webrtc"))]
        Backend::Webrtc => {
            anyhow::bail!("Backend 'webrtc' benoetigt das Feature `webrtc`")
        }
    }
}

async fn betreiben<T: PeerTransport>(
    config: NodeConfig,
    lokal_id: PeerId,
    relay: TcpRelay,
    signale: mpsc::UnboundedReceiver<SignalMessage>,
    transport: T,
    ereignisse: mpsc::UnboundedReceiver<TransportEvent>,
) -> Result<()> {
    let mut lokal = LocalEntity::neu(config.knoten.username.clone());
    lokal.position = config.start_position();
    lokal.speed = config.knoten.geschwindigkeit;

    let mut node = Node::neu(
        lokal_id.clone(),
        relay,
        transport,
        lokal,
        config.negotiator_config(),
    );

    match config.sitzung.modus {
        Modus::Erstellen => {
            let remote = PeerId::from(config.sitzung.remote_peer_id.as_str());
            let code = node.raum_erstellen(remote.clone())?;
            println!("Raum {} erstellt, warte auf {}", code, remote);
        }
        Modus::Beitreten => {
            println!("Eigene Kennung: {}, warte auf Offer", lokal_id);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (eingabe_tx, eingaben) = mpsc::unbounded_channel();

    // Konsole
    let stdin_shutdown = shutdown_tx.clone();
    tokio::task::spawn_local(async move {
        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(zeile)) = zeilen.next_line().await {
            match befehl_lesen(&zeile) {
                Befehl::Bewegen(schritte) => {
                    for richtung in schritte {
                        let _ = eingabe_tx.send(NodeEvent::Eingabe(richtung));
                    }
                }
                Befehl::Name(name) => {
                    let _ = eingabe_tx.send(NodeEvent::NameGeaendert(name));
                }
                Befehl::Beenden => break,
                Befehl::Unbekannt => {
                    tracing::debug!(zeile = %zeile, "Unbekannte Eingabe");
                }
            }
        }
        let _ = stdin_shutdown.send(true);
    });

    // Ctrl-C
    tokio::task::spawn_local(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    laufen(
        &mut node,
        Eingaenge {
            signale,
            transport: ereignisse,
            eingaben,
        },
        config.tick_intervall(),
        shutdown_rx,
        |anzeige| println!("{}\n", anzeige),
    )
    .await;

    let peers: Vec<PeerId> = node
        .negotiator()
        .sitzungen()
        .map(|s| s.peer_id().clone())
        .collect();
    for peer_id in peers {
        node.sitzung_schliessen(&peer_id);
    }
    tracing::info!("Tandem-Knoten beendet");
    Ok(())
}
