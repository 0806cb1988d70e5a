//! Entity-Store – Letzter bekannter Zustand aller entfernten Peers
//!
//! Eine `RemoteEntity` entsteht beim ersten Zustands-Update oder bei der
//! ersten Identitaets-Ankuendigung, je nachdem was zuerst ankommt. Jede
//! Nachricht ueberschreibt nur ihr eigenes Feld (last-write-wins).
//! Schliesst der Kanal, wird die Entitaet entfernt.

use std::collections::HashMap;
use tandem_core::{Color, PeerId, Position};

// ---------------------------------------------------------------------------
// RemoteEntity
// ---------------------------------------------------------------------------

/// Zustand eines entfernten Peers, wie ihn die Anzeige sieht
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub peer_id: PeerId,
    pub position: Position,
    /// Kann nach dem ersten Zustands-Update eintreffen
    pub display_name: Option<String>,
    /// Bei der Erstellung vergeben, danach stabil
    pub color: Color,
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Speicher fuer alle entfernten Entitaeten
///
/// Gehoert dem Event-Loop des Knotens; keine Synchronisation noetig.
pub struct EntityStore {
    entitaeten: HashMap<PeerId, RemoteEntity>,
    /// Einfuegereihenfolge fuer `snapshot`
    reihenfolge: Vec<PeerId>,
    farbquelle: fn() -> Color,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::neu()
    }
}

impl EntityStore {
    /// Store mit zufaelligen Farben fuer Zustands-Entitaeten
    pub fn neu() -> Self {
        Self::mit_farbquelle(Color::zufaellig)
    }

    /// Store mit eigener Farbquelle (deterministisch in Tests)
    pub fn mit_farbquelle(farbquelle: fn() -> Color) -> Self {
        Self {
            entitaeten: HashMap::new(),
            reihenfolge: Vec::new(),
            farbquelle,
        }
    }

    fn erstellen(&mut self, peer_id: &PeerId, color: Color) -> &mut RemoteEntity {
        tracing::debug!(peer_id = %peer_id, farbe = %color.als_hex(), "Entitaet erstellt");
        self.reihenfolge.push(peer_id.clone());
        self.entitaeten
            .entry(peer_id.clone())
            .or_insert_with(|| RemoteEntity {
                peer_id: peer_id.clone(),
                position: Position::default(),
                display_name: None,
                color,
            })
    }

    /// Uebernimmt ein Zustands-Update
    ///
    /// Unbekannte Peers erhalten eine neue zufaellige Farbe und keinen Namen.
    pub fn apply_state(&mut self, peer_id: &PeerId, position: Position) {
        match self.entitaeten.get_mut(peer_id) {
            Some(entitaet) => entitaet.position = position,
            None => {
                let farbe = (self.farbquelle)();
                self.erstellen(peer_id, farbe).position = position;
            }
        }
    }

    /// Uebernimmt eine Identitaets-Ankuendigung
    ///
    /// Unbekannte Peers starten bei (0, 0) mit der Fallback-Farbe.
    pub fn apply_identity(&mut self, peer_id: &PeerId, display_name: String) {
        match self.entitaeten.get_mut(peer_id) {
            Some(entitaet) => entitaet.display_name = Some(display_name),
            None => {
                self.erstellen(peer_id, Color::FALLBACK).display_name = Some(display_name);
            }
        }
    }

    /// Entfernt die Entitaet; gibt false zurueck wenn sie nicht existierte
    pub fn evict(&mut self, peer_id: &PeerId) -> bool {
        if self.entitaeten.remove(peer_id).is_none() {
            return false;
        }
        self.reihenfolge.retain(|p| p != peer_id);
        tracing::debug!(peer_id = %peer_id, "Entitaet entfernt");
        true
    }

    /// Alle Entitaeten in Einfuegereihenfolge
    pub fn snapshot(&self) -> Vec<RemoteEntity> {
        self.iter().cloned().collect()
    }

    /// Iteriert in Einfuegereihenfolge ohne zu kopieren
    pub fn iter(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.reihenfolge
            .iter()
            .filter_map(|peer_id| self.entitaeten.get(peer_id))
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&RemoteEntity> {
        self.entitaeten.get(peer_id)
    }

    pub fn len(&self) -> usize {
        self.entitaeten.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entitaeten.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
