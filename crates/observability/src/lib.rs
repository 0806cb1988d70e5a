//! # tandem-observability
//!
//! Structured Logging fuer alle Tandem-Binaries via tracing-subscriber.
//! Text-Format fuer interaktive Knoten, JSON fuer das Relay im Betrieb.

pub mod logging;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
