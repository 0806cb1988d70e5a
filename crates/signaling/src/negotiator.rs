//! Sitzungsverhandlung – Offer/Answer/Candidate-Austausch pro Peer
//!
//! Der `SessionNegotiator` besitzt alle `PeerSession`s des Prozesses
//! (hoechstens eine pro Peer-Kennung). Eingehende Signaling-Nachrichten
//! kommen ueber `accept_message`, Ergebnisse des Transport-Backends ueber
//! `transport_ereignis`. Jede ausgehende Nachricht laeuft ueber das Relay.
//!
//! ## Glare
//! Schicken sich zwei Knoten gleichzeitig ein Offer, gewinnt das Offer des
//! lexikographisch kleineren Peers. Der groessere Peer verwirft seine
//! Initiator-Sitzung und antwortet als Responder.
//!
//! ## Kandidaten
//! Kandidaten vor der entfernten Beschreibung werden pro Sitzung gepuffert,
//! Kandidaten vor der Sitzung selbst pro Peer. Beide Puffer sind begrenzt.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tandem_core::PeerId;
use tandem_protocol::{DecodeError, IceCandidate, SdpDescriptor, SdpType, SignalKind, SignalMessage};
use tandem_transport::{ChannelRef, PeerTransport, TransportCommand, TransportEvent};

use crate::error::{SignalingError, SignalingResult};
use crate::relay::SignalingRelay;
use crate::session::{PeerSession, Role, TransportState, MAX_GEPUFFERTE_KANDIDATEN};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Timeout fuer eine Verhandlung
pub const STANDARD_VERHANDLUNGS_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximale Anzahl Peers mit gepufferten Kandidaten ohne Sitzung
pub const MAX_VERWAISTE_PEERS: usize = 16;

/// Konfiguration des Negotiators
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Maximale Dauer im Zustand Negotiating; `None` oder 0 deaktiviert
    pub verhandlungs_timeout: Option<Duration>,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            verhandlungs_timeout: Some(STANDARD_VERHANDLUNGS_TIMEOUT),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionNegotiator
// ---------------------------------------------------------------------------

/// Verhandelt Peer-Transporte ueber ein Signaling-Relay
pub struct SessionNegotiator<R, T> {
    lokal: PeerId,
    relay: R,
    transport: T,
    sitzungen: HashMap<PeerId, PeerSession>,
    verwaiste_kandidaten: HashMap<PeerId, VerwaistePuffer>,
    config: NegotiatorConfig,
}

/// Kandidaten eines Peers, dessen Offer noch aussteht
struct VerwaistePuffer {
    seit: Instant,
    kandidaten: Vec<IceCandidate>,
}

impl<R: SignalingRelay, T: PeerTransport> SessionNegotiator<R, T> {
    pub fn neu(lokal: PeerId, relay: R, transport: T, config: NegotiatorConfig) -> Self {
        Self {
            lokal,
            relay,
            transport,
            sitzungen: HashMap::new(),
            verwaiste_kandidaten: HashMap::new(),
            config,
        }
    }

    pub fn lokale_id(&self) -> &PeerId {
        &self.lokal
    }

    /// Erstellt eine Initiator-Sitzung und stoesst das Offer an
    ///
    /// Existiert bereits eine Sitzung fuer `remote`, wird diese unveraendert
    /// zurueckgegeben.
    ///
    /// # Fehler
    /// `Protokollverletzung` wenn `remote` die eigene Kennung ist
    pub fn create_session(&mut self, remote: PeerId) -> SignalingResult<&PeerSession> {
        if remote == self.lokal {
            return Err(SignalingError::protokoll("Sitzung mit sich selbst"));
        }
        if self.sitzungen.contains_key(&remote) {
            tracing::debug!(peer_id = %remote, "Sitzung existiert bereits");
            return Ok(&self.sitzungen[&remote]);
        }

        let mut sitzung = PeerSession::neu(remote.clone(), Role::Initiator);
        sitzung.uebergang(TransportState::Negotiating)?;
        sitzung.verhandlung_seit = Some(Instant::now());

        tracing::info!(peer_id = %remote, rolle = ?Role::Initiator, "Sitzung erstellt");
        self.transport.ausfuehren(TransportCommand::AngebotErstellen {
            peer_id: remote.clone(),
        });

        Ok(self.sitzungen.entry(remote).or_insert(sitzung))
    }

    /// Verarbeitet eine eingehende Signaling-Nachricht
    ///
    /// Fehler betreffen nur diese eine Nachricht; der Aufrufer loggt und
    /// verwirft sie.
    pub fn accept_message(&mut self, nachricht: SignalMessage) -> SignalingResult<()> {
        if let SignalKind::Unbekannt(typ) = &nachricht.kind {
            return Err(SignalingError::UnbekannterNachrichtentyp(typ.clone()));
        }
        if nachricht.to != self.lokal {
            return Err(SignalingError::protokoll(format!(
                "Nachricht an {} statt {}",
                nachricht.to, self.lokal
            )));
        }
        let von = match &nachricht.from {
            Some(von) if *von == self.lokal => {
                return Err(SignalingError::protokoll("Nachricht von sich selbst"));
            }
            Some(von) => von.clone(),
            None => return Err(SignalingError::protokoll("Absender fehlt")),
        };

        tracing::debug!(von = %von, typ = %nachricht.kind, "Signaling-Nachricht");

        match nachricht.kind {
            SignalKind::Offer => self.offer_annehmen(von, &nachricht),
            SignalKind::Answer => self.answer_anwenden(von, &nachricht),
            SignalKind::Candidate => self.kandidat_annehmen(von, &nachricht),
            SignalKind::Unbekannt(_) => Ok(()),
        }
    }

    fn offer_annehmen(&mut self, von: PeerId, nachricht: &SignalMessage) -> SignalingResult<()> {
        if let Some(bestehend) = self.sitzungen.get(&von) {
            let glare = bestehend.rolle() == Role::Initiator
                && bestehend.zustand() == TransportState::Negotiating
                && !bestehend.remote_beschreibung_gesetzt;
            if !glare {
                return Err(SignalingError::protokoll(format!(
                    "Offer fuer bestehende Sitzung ({:?}, {})",
                    bestehend.rolle(),
                    bestehend.zustand()
                )));
            }
            if self.lokal < von {
                tracing::info!(peer_id = %von, "Glare: eigenes Offer gewinnt, fremdes verworfen");
                return Ok(());
            }
            tracing::info!(peer_id = %von, "Glare: fremdes Offer gewinnt, wechsle zu Responder");
            self.sitzungen.remove(&von);
            self.transport.ausfuehren(TransportCommand::Schliessen {
                peer_id: von.clone(),
            });
        }

        let mut sitzung = PeerSession::neu(von.clone(), Role::Responder);
        sitzung.uebergang(TransportState::Negotiating)?;
        sitzung.verhandlung_seit = Some(Instant::now());
        self.sitzungen.insert(von.clone(), sitzung);
        tracing::info!(peer_id = %von, rolle = ?Role::Responder, "Sitzung erstellt");

        let angebot = match deskriptor_lesen(nachricht, SdpType::Offer) {
            Ok(angebot) => angebot,
            Err(e) => {
                self.scheitern(&von, &e.to_string());
                return Err(e.into());
            }
        };

        self.transport.ausfuehren(TransportCommand::AntwortErstellen {
            peer_id: von.clone(),
            angebot,
        });
        self.remote_beschreibung_gesetzt(&von);
        Ok(())
    }

    fn answer_anwenden(&mut self, von: PeerId, nachricht: &SignalMessage) -> SignalingResult<()> {
        let erwartet = self.sitzungen.get(&von).is_some_and(|s| {
            s.rolle() == Role::Initiator
                && s.zustand() == TransportState::Negotiating
                && !s.remote_beschreibung_gesetzt
        });
        if !erwartet {
            return Err(SignalingError::protokoll(format!(
                "Answer von {} ohne offenes Offer",
                von
            )));
        }

        let antwort = match deskriptor_lesen(nachricht, SdpType::Answer) {
            Ok(antwort) => antwort,
            Err(e) => {
                self.scheitern(&von, &e.to_string());
                return Err(e.into());
            }
        };

        self.transport.ausfuehren(TransportCommand::AntwortAnwenden {
            peer_id: von.clone(),
            antwort,
        });
        self.remote_beschreibung_gesetzt(&von);
        Ok(())
    }

    fn kandidat_annehmen(&mut self, von: PeerId, nachricht: &SignalMessage) -> SignalingResult<()> {
        let kandidat = nachricht.kandidat()?;

        match self.sitzungen.get_mut(&von) {
            Some(sitzung) if sitzung.remote_beschreibung_gesetzt => {
                self.transport.ausfuehren(TransportCommand::KandidatHinzufuegen {
                    peer_id: von,
                    kandidat,
                });
            }
            Some(sitzung) => {
                if !sitzung.kandidat_puffern(kandidat) {
                    tracing::warn!(peer_id = %von, "Kandidatenpuffer voll, Kandidat verworfen");
                }
            }
            None => {
                if !self.verwaiste_kandidaten.contains_key(&von)
                    && self.verwaiste_kandidaten.len() >= MAX_VERWAISTE_PEERS
                {
                    tracing::warn!(peer_id = %von, "Zu viele Peers ohne Sitzung, Kandidat verworfen");
                    return Ok(());
                }
                let puffer = &mut self
                    .verwaiste_kandidaten
                    .entry(von.clone())
                    .or_insert_with(|| VerwaistePuffer {
                        seit: Instant::now(),
                        kandidaten: Vec::new(),
                    })
                    .kandidaten;
                if puffer.len() >= MAX_GEPUFFERTE_KANDIDATEN {
                    tracing::warn!(peer_id = %von, "Kandidat ohne Sitzung verworfen, Puffer voll");
                } else {
                    tracing::debug!(peer_id = %von, "Kandidat vor Sitzung gepuffert");
                    puffer.push(kandidat);
                }
            }
        }
        Ok(())
    }

    /// Markiert die entfernte Beschreibung als gesetzt und wendet gepufferte Kandidaten an
    fn remote_beschreibung_gesetzt(&mut self, peer_id: &PeerId) {
        let mut kandidaten = self
            .verwaiste_kandidaten
            .remove(peer_id)
            .map(|p| p.kandidaten)
            .unwrap_or_default();
        if let Some(sitzung) = self.sitzungen.get_mut(peer_id) {
            sitzung.remote_beschreibung_gesetzt = true;
            kandidaten.append(&mut sitzung.gepufferte_kandidaten);
        }
        if !kandidaten.is_empty() {
            tracing::debug!(peer_id = %peer_id, anzahl = kandidaten.len(), "Gepufferte Kandidaten angewendet");
        }
        for kandidat in kandidaten {
            self.transport.ausfuehren(TransportCommand::KandidatHinzufuegen {
                peer_id: peer_id.clone(),
                kandidat,
            });
        }
    }

    /// Setzt die Sitzung auf Failed, baut den Transport ab und entfernt sie
    fn scheitern(&mut self, peer_id: &PeerId, grund: &str) {
        self.verwaiste_kandidaten.remove(peer_id);
        let Some(mut sitzung) = self.sitzungen.remove(peer_id) else {
            return;
        };
        if sitzung.uebergang(TransportState::Failed).is_ok() {
            tracing::warn!(peer_id = %peer_id, grund = %grund, "Sitzung gescheitert");
        }
        self.transport.ausfuehren(TransportCommand::Schliessen {
            peer_id: peer_id.clone(),
        });
    }

    // -----------------------------------------------------------------------
    // Transport-Ereignisse
    // -----------------------------------------------------------------------

    /// Verarbeitet ein Ereignis des Transport-Backends
    ///
    /// Lokale Deskriptoren und Kandidaten gehen ueber das Relay an den Peer.
    /// `Verbunden` wird ueber `transport_verbunden` gemeldet, sobald der
    /// Multiplexer den Kanal registriert hat; Kanalnachrichten ignoriert
    /// der Negotiator.
    pub fn transport_ereignis(&mut self, ereignis: &TransportEvent) -> SignalingResult<()> {
        match ereignis {
            TransportEvent::LokaleBeschreibung {
                peer_id,
                beschreibung,
            } => {
                let passend = self.sitzungen.get(peer_id).is_some_and(|s| {
                    s.zustand() == TransportState::Negotiating
                        && matches!(
                            (s.rolle(), beschreibung.typ),
                            (Role::Initiator, SdpType::Offer) | (Role::Responder, SdpType::Answer)
                        )
                });
                if !passend {
                    tracing::debug!(peer_id = %peer_id, typ = ?beschreibung.typ, "Veraltete lokale Beschreibung verworfen");
                    return Ok(());
                }
                let nachricht = match beschreibung.typ {
                    SdpType::Offer => SignalMessage::offer(peer_id.clone(), beschreibung),
                    SdpType::Answer => SignalMessage::answer(peer_id.clone(), beschreibung),
                };
                tracing::debug!(peer_id = %peer_id, typ = ?beschreibung.typ, "Lokale Beschreibung gesendet");
                self.relay.senden(nachricht)
            }
            TransportEvent::LokalerKandidat { peer_id, kandidat } => {
                if !self.sitzungen.contains_key(peer_id) {
                    tracing::debug!(peer_id = %peer_id, "Lokaler Kandidat ohne Sitzung verworfen");
                    return Ok(());
                }
                self.relay
                    .senden(SignalMessage::candidate(peer_id.clone(), kandidat))
            }
            TransportEvent::KanalGeschlossen { peer_id } => {
                if let Some(mut sitzung) = self.sitzungen.remove(peer_id) {
                    if sitzung.uebergang(TransportState::Closed).is_ok() {
                        tracing::info!(peer_id = %peer_id, "Sitzung geschlossen");
                    }
                }
                Ok(())
            }
            TransportEvent::Fehlgeschlagen { peer_id, grund } => {
                self.scheitern(peer_id, grund);
                Ok(())
            }
            TransportEvent::Verbunden { .. }
            | TransportEvent::KanalOffen { .. }
            | TransportEvent::KanalNachricht { .. } => Ok(()),
        }
    }

    /// Meldet, dass der Datenkanal fuer `peer_id` registriert ist
    ///
    /// Gibt false zurueck wenn keine verhandelnde Sitzung existiert.
    pub fn transport_verbunden(&mut self, peer_id: &PeerId, kanal: ChannelRef) -> bool {
        let Some(sitzung) = self.sitzungen.get_mut(peer_id) else {
            tracing::warn!(peer_id = %peer_id, "Verbunden ohne Sitzung");
            return false;
        };
        match sitzung.verbunden(kanal) {
            Ok(()) => {
                sitzung.gepufferte_kandidaten.clear();
                tracing::info!(peer_id = %peer_id, kanal = %kanal, rolle = ?sitzung.rolle(), "Peer verbunden");
                true
            }
            Err(e) => {
                tracing::warn!(peer_id = %peer_id, fehler = %e, "Verbunden im falschen Zustand");
                false
            }
        }
    }

    /// Schliesst die Sitzung zu `peer_id` explizit
    ///
    /// Gibt false zurueck wenn keine Sitzung existiert.
    pub fn close_session(&mut self, peer_id: &PeerId) -> bool {
        self.verwaiste_kandidaten.remove(peer_id);
        let Some(mut sitzung) = self.sitzungen.remove(peer_id) else {
            return false;
        };
        if sitzung.uebergang(TransportState::Closed).is_ok() {
            tracing::info!(peer_id = %peer_id, "Sitzung geschlossen");
        }
        self.transport.ausfuehren(TransportCommand::Schliessen {
            peer_id: peer_id.clone(),
        });
        true
    }

    /// Laesst Verhandlungen scheitern, die laenger als der Timeout laufen
    ///
    /// Gibt die betroffenen Peers zurueck.
    pub fn abgelaufene_verhandlungen(&mut self, jetzt: Instant) -> Vec<PeerId> {
        let Some(timeout) = self.config.verhandlungs_timeout.filter(|t| !t.is_zero()) else {
            return Vec::new();
        };

        let abgelaufen: Vec<PeerId> = self
            .sitzungen
            .values()
            .filter(|s| {
                s.verhandlung_seit
                    .is_some_and(|seit| jetzt.saturating_duration_since(seit) >= timeout)
            })
            .map(|s| s.peer_id().clone())
            .collect();

        for peer_id in &abgelaufen {
            self.scheitern(peer_id, "Verhandlungs-Timeout");
        }

        let vorher = self.verwaiste_kandidaten.len();
        self.verwaiste_kandidaten
            .retain(|_, p| jetzt.saturating_duration_since(p.seit) < timeout);
        if self.verwaiste_kandidaten.len() < vorher {
            tracing::debug!(
                anzahl = vorher - self.verwaiste_kandidaten.len(),
                "Kandidaten ohne Offer verfallen"
            );
        }
        abgelaufen
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn sitzung(&self, peer_id: &PeerId) -> Option<&PeerSession> {
        self.sitzungen.get(peer_id)
    }

    pub fn sitzungen(&self) -> impl Iterator<Item = &PeerSession> {
        self.sitzungen.values()
    }

    pub fn anzahl(&self) -> usize {
        self.sitzungen.len()
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Liest den Deskriptor und prueft den erwarteten Typ
fn deskriptor_lesen(nachricht: &SignalMessage, erwartet: SdpType) -> Result<SdpDescriptor, DecodeError> {
    let beschreibung = nachricht.beschreibung()?;
    if beschreibung.typ != erwartet {
        return Err(DecodeError::Format(format!(
            "Deskriptor-Typ {:?} statt {:?}",
            beschreibung.typ, erwartet
        )));
    }
    Ok(beschreibung)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
