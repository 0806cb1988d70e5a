//! Tandem-Relay – Signaling-Server
//!
//! Leitet Offer/Answer/Candidate-Nachrichten zwischen registrierten
//! Knoten weiter. Nutzt dieselbe Konfigurationsdatei wie der Knoten
//! (Abschnitte `[relay]` und `[logging]`).

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tandem_node::config::{NodeConfig, STANDARD_PFAD};
use tandem_observability::logging_initialisieren;
use tandem_signaling::RelayServer;
use tokio::sync::watch;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("TANDEM_CONFIG").unwrap_or_else(|_| STANDARD_PFAD.into());
    let config = NodeConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    let bind_addr: SocketAddr = config
        .relay
        .bind_adresse
        .parse()
        .with_context(|| format!("Ungueltige Bind-Adresse '{}'", config.relay.bind_adresse))?;

    let server = RelayServer::binden(bind_addr, config.relay_config())
        .await
        .with_context(|| format!("Relay konnte nicht an {} binden", bind_addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C empfangen, Relay wird beendet");
            let _ = shutdown_tx.send(true);
        }
    });

    server.starten(shutdown_rx).await?;
    Ok(())
}
