//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `TANDEM_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, Standard: info
//! - `TANDEM_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Umgebung hat Vorrang vor den Werten aus der Konfigurationsdatei.
//! Ausgabe geht nach stderr; stdout bleibt dem Knoten fuer die Anzeige.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Level
pub const LOG_LEVEL_ENV: &str = "TANDEM_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "TANDEM_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` stammen aus der Konfiguration und werden von
/// `TANDEM_LOG_LEVEL` / `TANDEM_LOG_FORMAT` ueberschrieben. Ist bereits
/// ein globaler Subscriber gesetzt, bleibt dieser aktiv.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = einstellung(std::env::var(LOG_FORMAT_ENV).ok(), format);

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Waehlt den Wert aus der Umgebung, sonst den konfigurierten
fn einstellung(umgebung: Option<String>, konfiguriert: &str) -> String {
    umgebung
        .filter(|w| !w.trim().is_empty())
        .unwrap_or_else(|| konfiguriert.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        assert!(log_level_gueltig("trace"));
        assert!(log_level_gueltig("debug"));
        assert!(log_level_gueltig("info"));
        assert!(log_level_gueltig("warn"));
        assert!(log_level_gueltig("error"));
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(einstellung(Some("json".into()), "text"), "json");
        assert_eq!(einstellung(None, "text"), "text");
        // Leere Variable zaehlt als nicht gesetzt
        assert_eq!(einstellung(Some("  ".into()), "text"), "text");
    }

    #[test]
    fn doppelte_initialisierung_ist_harmlos() {
        logging_initialisieren("debug", "text");
        logging_initialisieren("info", "json");
    }
}
