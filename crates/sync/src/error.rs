//! Fehlertypen fuer den Zustandsabgleich

use tandem_core::{PeerId, TandemError};
use tandem_protocol::DecodeError;
use thiserror::Error;

/// Fehlertyp fuer Multiplexer und Dispatch
#[derive(Debug, Error)]
pub enum SyncError {
    /// Kein offener Kanal zum Peer
    #[error("Kein offener Kanal zu {0}")]
    TransportNichtVerfuegbar(PeerId),

    /// Nachricht vom Datenkanal nicht lesbar
    #[error(transparent)]
    Dekodierung(#[from] DecodeError),
}

impl From<SyncError> for TandemError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::TransportNichtVerfuegbar(peer_id) => {
                TandemError::TransportNichtVerfuegbar(peer_id.to_string())
            }
            SyncError::Dekodierung(d) => d.into(),
        }
    }
}

/// Result-Typ fuer den Zustandsabgleich
pub type SyncResult<T> = Result<T, SyncError>;
