use proptest::prelude::*;
use std::collections::HashMap;

use tandem_core::{Color, PeerId, Position};
use tandem_sync::EntityStore;

const CYAN: Color = Color::neu(0, 255, 255);

#[derive(Debug, Clone)]
enum Schritt {
    Zustand(usize, f64, f64),
    Identitaet(usize, String),
    Entfernen(usize),
}

const PEERS: [&str; 3] = ["anna", "bert", "carl"];

fn arb_schritt() -> impl Strategy<Value = Schritt> {
    let peer = 0..PEERS.len();
    let koordinate = -1000.0f64..1000.0;
    prop_oneof![
        4 => (peer.clone(), koordinate.clone(), koordinate).prop_map(|(p, x, y)| Schritt::Zustand(p, x, y)),
        2 => (peer.clone(), "[a-zA-Z ]{0,8}").prop_map(|(p, n)| Schritt::Identitaet(p, n)),
        1 => peer.prop_map(Schritt::Entfernen),
    ]
}

/// Erwarteter Zustand je Peer
#[derive(Debug, Clone, PartialEq)]
struct Erwartet {
    position: Position,
    name: Option<String>,
    farbe: Color,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn store_entspricht_modell(schritte in proptest::collection::vec(arb_schritt(), 0..64)) {
        let mut store = EntityStore::mit_farbquelle(|| CYAN);
        let mut modell: HashMap<usize, Erwartet> = HashMap::new();
        let mut reihenfolge: Vec<usize> = Vec::new();

        for schritt in schritte {
            match schritt {
                Schritt::Zustand(p, x, y) => {
                    let position = Position::neu(x, y);
                    store.apply_state(&PeerId::from(PEERS[p]), position);
                    modell
                        .entry(p)
                        .or_insert_with(|| {
                            reihenfolge.push(p);
                            Erwartet { position, name: None, farbe: CYAN }
                        })
                        .position = position;
                }
                Schritt::Identitaet(p, name) => {
                    store.apply_identity(&PeerId::from(PEERS[p]), name.clone());
                    modell
                        .entry(p)
                        .or_insert_with(|| {
                            reihenfolge.push(p);
                            Erwartet { position: Position::default(), name: None, farbe: Color::FALLBACK }
                        })
                        .name = Some(name);
                }
                Schritt::Entfernen(p) => {
                    let war_da = modell.remove(&p).is_some();
                    reihenfolge.retain(|q| *q != p);
                    prop_assert_eq!(store.evict(&PeerId::from(PEERS[p])), war_da);
                }
            }

            prop_assert_eq!(store.len(), modell.len());
            let snapshot = store.snapshot();
            for (entitaet, p) in snapshot.iter().zip(&reihenfolge) {
                let erwartet = &modell[p];
                prop_assert_eq!(entitaet.peer_id.as_str(), PEERS[*p]);
                prop_assert_eq!(entitaet.position, erwartet.position);
                prop_assert_eq!(&entitaet.display_name, &erwartet.name);
                prop_assert_eq!(entitaet.color, erwartet.farbe);
            }
        }
    }
}
