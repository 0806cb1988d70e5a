//! tandem-sync – Zustandsabgleich ueber den Datenkanal
//!
//! ```text
//! Eingabe -> LocalEntity -> encode_state -> ChannelMultiplexer::broadcast
//!                                                  |
//!                                               [Draht]
//!                                                  |
//! KanalNachricht -> nachricht_empfangen -> decode -> dispatch -> EntityStore
//!                                                                   |
//!                                                       snapshot() (Anzeige)
//! ```
//!
//! Alles laeuft auf dem Event-Loop des Knotens; keine Sperren.

pub mod dispatcher;
pub mod error;
pub mod local;
pub mod multiplexer;
pub mod store;

pub use dispatcher::{dispatch, nachricht_empfangen};
pub use error::{SyncError, SyncResult};
pub use local::LocalEntity;
pub use multiplexer::ChannelMultiplexer;
pub use store::{EntityStore, RemoteEntity};
