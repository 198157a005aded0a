use std::fmt;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::SyncConfig;
use crate::http_client::{build_http_client, fetch_json};
use crate::record::{Record, field_flag, records_from_array};

/// Columns kept from the fixtures endpoint.
pub const FIXTURE_COLUMNS: &[&str] = &[
    "id",
    "event",
    "team_h",
    "team_a",
    "team_h_difficulty",
    "team_a_difficulty",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Teams,
    Positions,
    MetricNames,
    Events,
    Players,
    Fixtures,
}

impl Resource {
    /// Key of the collection inside the bootstrap-static payload.
    pub fn bootstrap_key(self) -> Option<&'static str> {
        match self {
            Resource::Teams => Some("teams"),
            Resource::Positions => Some("element_types"),
            Resource::MetricNames => Some("element_stats"),
            Resource::Events => Some("events"),
            Resource::Players => Some("elements"),
            Resource::Fixtures => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Teams => "teams",
            Resource::Positions => "positions",
            Resource::MetricNames => "metric names",
            Resource::Events => "events",
            Resource::Players => "players",
            Resource::Fixtures => "fixtures",
        };
        f.write_str(name)
    }
}

/// Anything that can hand the engine flat records. The history call runs on
/// worker threads, hence `Sync`.
pub trait DataSource: Sync {
    fn fetch(&self, resource: Resource) -> Result<Vec<Record>>;

    fn player_history(&self, element: i64) -> Result<Vec<Record>>;
}

pub struct FplClient {
    client: Client,
    api_base: String,
    bootstrap: OnceCell<Value>,
}

impl FplClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.request_timeout)?,
            api_base: config.api_base().to_string(),
            bootstrap: OnceCell::new(),
        })
    }

    fn bootstrap(&self) -> Result<&Value> {
        self.bootstrap.get_or_try_init(|| {
            let url = format!("{}/bootstrap-static/", self.api_base);
            fetch_json(&self.client, &url).context("fetch bootstrap-static")
        })
    }
}

impl DataSource for FplClient {
    fn fetch(&self, resource: Resource) -> Result<Vec<Record>> {
        match resource.bootstrap_key() {
            Some(key) => {
                let payload = self.bootstrap()?;
                let section = payload
                    .get(key)
                    .ok_or_else(|| anyhow!("bootstrap-static has no `{key}` section"))?;
                let records = records_from_array(section);
                Ok(normalize(resource, records))
            }
            None => {
                let url = format!("{}/fixtures/", self.api_base);
                let payload = fetch_json(&self.client, &url)?;
                Ok(normalize(resource, records_from_array(&payload)))
            }
        }
    }

    fn player_history(&self, element: i64) -> Result<Vec<Record>> {
        let url = format!("{}/element-summary/{element}/", self.api_base);
        let payload = fetch_json(&self.client, &url)?;
        let history = payload
            .get("history")
            .ok_or_else(|| anyhow!("element-summary {element} has no history"))?;
        Ok(records_from_array(history))
    }
}

/// Resource-specific shaping applied to raw API records.
pub fn normalize(resource: Resource, records: Vec<Record>) -> Vec<Record> {
    match resource {
        Resource::Events => normalize_events(records),
        Resource::Fixtures => normalize_fixtures(records),
        _ => records,
    }
}

/// Keep finished and current events, flattening `top_element_info` into
/// `top_element_info_id` / `top_element_info_points`.
pub fn normalize_events(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|event| field_flag(event, "is_current") || field_flag(event, "finished"))
        .map(flatten_top_element)
        .collect()
}

/// Records that were already flattened pass through untouched.
pub fn flatten_top_element(mut event: Record) -> Record {
    let Some(info) = event.remove("top_element_info") else {
        return event;
    };
    let (id, points) = match info.as_object() {
        Some(obj) => (
            obj.get("id").cloned().unwrap_or(Value::Null),
            obj.get("points").cloned().unwrap_or(Value::Null),
        ),
        None => (Value::Null, Value::Null),
    };
    event.insert("top_element_info_id".to_string(), id);
    event.insert("top_element_info_points".to_string(), points);
    event
}

/// Drop fixtures without a gameweek and project onto [`FIXTURE_COLUMNS`].
pub fn normalize_fixtures(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|fixture| fixture.get("event").is_some_and(|v| !v.is_null()))
        .map(|mut fixture| {
            fixture.retain(|key, _| FIXTURE_COLUMNS.contains(&key.as_str()));
            fixture
        })
        .collect()
}
