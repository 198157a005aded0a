#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use fpl_sync::fpl_api::{DataSource, Resource, normalize};
use fpl_sync::record::{Record, records_from_array};
use fpl_sync::store::Store;

pub fn read_fixture(name: &str) -> Value {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    let raw = fs::read_to_string(path).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be valid json")
}

pub fn rec(value: Value) -> Record {
    value.as_object().cloned().expect("record literal must be an object")
}

pub fn memory_store() -> Store {
    let store = Store::open_in_memory().expect("in-memory store");
    store.create_tables().expect("create tables");
    store
}

pub fn history_row(element: i64, round: i64, fixture: i64, points: i64) -> Record {
    rec(json!({
        "element": element,
        "fixture": fixture,
        "opponent_team": 2,
        "total_points": points,
        "was_home": true,
        "kickoff_time": "2024-08-17T14:00:00Z",
        "round": round,
        "minutes": 90,
        "goals_scored": 0,
        "influence": "12.4",
        "value": 55,
        "selected": 1000
    }))
}

/// Stand-in for the remote API, serving the JSON fixtures under `tests/fixtures`.
pub struct FakeSource {
    bootstrap: Value,
    fixtures: Value,
    histories: HashMap<i64, Vec<Record>>,
    failing: HashSet<i64>,
    history_calls: AtomicUsize,
}

impl FakeSource {
    pub fn from_fixtures() -> Self {
        let bootstrap = read_fixture("bootstrap.json");
        let fixtures = read_fixture("fixtures.json");
        let mut histories = HashMap::new();
        for element in 1..=4 {
            let rows = (1..=3)
                .map(|round| history_row(element, round, round * 10 + element, round))
                .collect::<Vec<_>>();
            histories.insert(element, rows);
        }
        Self {
            bootstrap,
            fixtures,
            histories,
            failing: HashSet::new(),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_events(mut self, events: Value) -> Self {
        self.bootstrap["events"] = events;
        self
    }

    pub fn without_section(mut self, key: &str) -> Self {
        if let Some(obj) = self.bootstrap.as_object_mut() {
            obj.remove(key);
        }
        self
    }

    pub fn with_history(mut self, element: i64, rows: Vec<Record>) -> Self {
        self.histories.insert(element, rows);
        self
    }

    pub fn failing(mut self, element: i64) -> Self {
        self.failing.insert(element);
        self
    }

    pub fn set_player_points(&mut self, element: i64, total_points: i64) {
        if let Some(players) = self.bootstrap["elements"].as_array_mut() {
            for player in players {
                if player["id"] == json!(element) {
                    player["total_points"] = json!(total_points);
                }
            }
        }
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

impl DataSource for FakeSource {
    fn fetch(&self, resource: Resource) -> Result<Vec<Record>> {
        let records = match resource.bootstrap_key() {
            Some(key) => records_from_array(
                self.bootstrap
                    .get(key)
                    .ok_or_else(|| anyhow!("missing {key}"))?,
            ),
            None => records_from_array(&self.fixtures),
        };
        Ok(normalize(resource, records))
    }

    fn player_history(&self, element: i64) -> Result<Vec<Record>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&element) {
            return Err(anyhow!("http 503 Service Unavailable"));
        }
        Ok(self.histories.get(&element).cloned().unwrap_or_default())
    }
}
