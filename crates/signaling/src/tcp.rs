//! TCP-Listener – Bindet Socket, akzeptiert Relay-Verbindungen
//!
//! Der `RelayServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen Task mit einer `RelayConnection`.
//!
//! ## Concurrency-Modell
//! Alle Verbindungs-Tasks laufen in einer `tokio::task::LocalSet` auf
//! einem single-threaded Executor. Die `Vermittlung` wird dadurch nie
//! parallel veraendert und die Zustellreihenfolge pro Empfaenger bleibt
//! stabil.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use crate::connection::RelayConnection;
use crate::routing::Vermittlung;

/// Konfiguration fuer den Relay-Server
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximale gleichzeitig registrierte Peers
    pub max_peers: usize,
    /// Zeit bis zum ersten `Register`-Frame
    pub registrierungs_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_peers: 256,
            registrierungs_timeout: Duration::from_secs(10),
        }
    }
}

/// TCP-Relay-Server
///
/// Leitet Signaling-Nachrichten zwischen registrierten Peers weiter.
pub struct RelayServer {
    listener: TcpListener,
    vermittlung: Vermittlung,
    config: RelayConfig,
}

impl RelayServer {
    /// Bindet den Listener; Port 0 waehlt einen freien Port
    pub async fn binden(bind_addr: SocketAddr, config: RelayConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            listener,
            vermittlung: Vermittlung::neu(),
            config,
        })
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Routing-Tabelle des Servers
    pub fn vermittlung(&self) -> &Vermittlung {
        &self.vermittlung
    }

    /// Startet die Accept-Loop
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(
        self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let local = LocalSet::new();
        local.run_until(self.accept_loop(shutdown_rx)).await
    }

    async fn accept_loop(
        self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "Relay-Server gestartet");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if self.vermittlung.anzahl() >= self.config.max_peers {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.config.max_peers,
                                    "Relay voll – Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let verbindung = RelayConnection::neu(
                                self.vermittlung.clone(),
                                peer_addr,
                                self.config.registrierungs_timeout,
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();

                            tokio::task::spawn_local(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Relay-Server gestoppt");
        Ok(())
    }
}
