//! tandem-signaling – Relay und Sitzungsverhandlung
//!
//! Dieser Crate bringt zwei Knoten ueber ein externes Signaling-Relay
//! zusammen und verhandelt pro entferntem Peer genau einen Transport.
//!
//! ## Architektur
//!
//! ```text
//! RelayServer (TCP Listener)
//!     |
//!     v
//! RelayConnection (pro Verbindung ein Task)
//!     |  Register -> Signal*  (Routing ueber die Vermittlung)
//!     v
//! TcpRelay / MemoryRelay  – SignalingRelay des Knotens
//!     |
//!     v
//! SessionNegotiator
//!     |  State Machine: New -> Negotiating -> Connected -> Closed | Failed
//!     v
//! PeerTransport (TransportCommand / TransportEvent)
//! ```

pub mod connection;
pub mod error;
pub mod negotiator;
pub mod relay;
pub mod routing;
pub mod session;
pub mod tcp;

// Bequeme Re-Exporte
pub use connection::RelayConnection;
pub use error::{SignalingError, SignalingResult};
pub use negotiator::{NegotiatorConfig, SessionNegotiator};
pub use relay::{MemoryRelay, SignalingRelay, TcpRelay};
pub use routing::{Vermittlung, Zustellung};
pub use session::{PeerSession, Role, TransportState};
pub use tcp::{RelayConfig, RelayServer};
