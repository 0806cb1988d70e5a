//! Anwendungs-Dispatch – Leitet dekodierte Nachrichten an den Entity-Store
//!
//! Einziger Eintrittspunkt fuer Nachrichten vom Datenkanal. Eine nicht
//! lesbare Nachricht betrifft nur sich selbst: der Aufrufer loggt den
//! Fehler und verwirft sie, der Kanal bleibt offen.

use tandem_core::PeerId;
use tandem_protocol::{decode, AppMessage};

use crate::error::SyncResult;
use crate::store::EntityStore;

/// Wendet eine dekodierte Nachricht auf den Store an
pub fn dispatch(store: &mut EntityStore, peer_id: &PeerId, nachricht: AppMessage) {
    match nachricht {
        AppMessage::State { position } => {
            tracing::trace!(peer_id = %peer_id, x = position.x, y = position.y, "Zustand empfangen");
            store.apply_state(peer_id, position);
        }
        AppMessage::Identity { display_name } => {
            tracing::debug!(peer_id = %peer_id, name = %display_name, "Identitaet empfangen");
            store.apply_identity(peer_id, display_name);
        }
    }
}

/// Dekodiert Bytes vom Datenkanal und wendet sie an
///
/// # Fehler
/// `Dekodierung` bei kaputtem Umschlag oder unbekanntem `type`; der Store
/// bleibt dann unveraendert.
pub fn nachricht_empfangen(store: &mut EntityStore, peer_id: &PeerId, daten: &[u8]) -> SyncResult<()> {
    let nachricht = decode(daten)?;
    dispatch(store, peer_id, nachricht);
    Ok(())
}
