//! Confirmed application state: an async `RwLock` cache over the
//! single-row `app_state` table.
//!
//! Load never fails on bad data. Unreadable blobs are backed up and replaced
//! by a default state; unreadable entities are dropped one by one.

use std::sync::Arc;

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

use fieldlog_core::constants::STATE_SCHEMA_VERSION;
use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{Address, Arrangement, Completion, DaySession};
use fieldlog_core::validation::{sanitize, SanitizeReport};
use fieldlog_core::{AppState, Clock};
use fieldlog_storage::queries::app_state_ops::{self, RawAppState};
use fieldlog_storage::StorageEngine;

/// What `LocalState::load` had to do to produce a usable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// The persisted blob was unusable and a default state was used.
    pub fallback: bool,
    /// Schema version migrated from, if a migration ran.
    pub migrated_from: Option<u32>,
    /// Entities dropped because they no longer deserialize.
    pub unreadable_entities: usize,
    pub sanitized: SanitizeReport,
}

impl LoadReport {
    fn needs_persist(&self) -> bool {
        self.fallback
            || self.migrated_from.is_some()
            || self.unreadable_entities > 0
            || !self.sanitized.is_clean()
    }
}

pub struct LocalState {
    state: RwLock<AppState>,
    storage: Arc<StorageEngine>,
    clock: Arc<dyn Clock>,
}

impl LocalState {
    pub async fn load(
        storage: Arc<StorageEngine>,
        clock: Arc<dyn Clock>,
    ) -> FieldlogResult<(Self, LoadReport)> {
        let raw = storage.with_conn(app_state_ops::load_state).await?;
        let now_ms = clock.now_ms();
        let mut report = LoadReport::default();

        let state = match raw {
            None => {
                report.fallback = true;
                AppState::default()
            }
            Some(raw) => match decode(&raw, &mut report) {
                Ok(state) => state,
                Err(reason) => {
                    error!(%reason, "persisted state unreadable, falling back to empty state");
                    storage
                        .with_conn(|conn| {
                            app_state_ops::insert_backup(conn, &raw.state, &reason, now_ms)
                        })
                        .await?;
                    report.fallback = true;
                    AppState::default()
                }
            },
        };

        if report.needs_persist() {
            storage
                .with_transaction(|conn| Self::persist_in(conn, &state, now_ms))
                .await?;
        }
        if !report.sanitized.is_clean() || report.unreadable_entities > 0 {
            warn!(
                unreadable = report.unreadable_entities,
                sanitized = ?report.sanitized,
                "dropped invalid entities on load"
            );
        }

        Ok((
            Self {
                state: RwLock::new(state),
                storage,
                clock,
            },
            report,
        ))
    }

    /// A copy of the confirmed state.
    pub async fn snapshot(&self) -> AppState {
        self.state.read().await.clone()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().await
    }

    /// Exclusive access for the duration of an atomic operation or merge.
    /// Changes made through the guard are not durable until `persist_in`
    /// runs on a committed transaction.
    pub async fn write(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().await
    }

    pub fn persist_in(conn: &Connection, state: &AppState, now_ms: i64) -> FieldlogResult<()> {
        let json = serde_json::to_string(state)?;
        app_state_ops::save_state(conn, &json, state.schema_version, now_ms)
    }

    /// Persist on its own transaction.
    pub async fn persist(&self, state: &AppState) -> FieldlogResult<()> {
        let now_ms = self.clock.now_ms();
        self.storage
            .with_transaction(|conn| Self::persist_in(conn, state, now_ms))
            .await
    }
}

fn decode(raw: &RawAppState, report: &mut LoadReport) -> Result<AppState, String> {
    let mut value: Value =
        serde_json::from_str(&raw.state).map_err(|e| format!("invalid JSON: {e}"))?;
    let Some(object) = value.as_object_mut() else {
        return Err("state is not a JSON object".to_string());
    };

    let stored_version = object
        .get("schema_version")
        .and_then(Value::as_u64)
        .map_or(raw.schema_version, |v| v as u32);
    if stored_version > STATE_SCHEMA_VERSION {
        return Err(format!(
            "schema version {stored_version} is newer than supported {STATE_SCHEMA_VERSION}"
        ));
    }
    if stored_version < STATE_SCHEMA_VERSION {
        migrate(object);
        report.migrated_from = Some(stored_version);
        info!(from = stored_version, to = STATE_SCHEMA_VERSION, "migrated persisted state");
    }

    report.unreadable_entities += retain_readable::<Completion>(object, "completions");
    report.unreadable_entities += retain_readable::<Arrangement>(object, "arrangements");
    report.unreadable_entities += retain_readable::<DaySession>(object, "day_sessions");
    report.unreadable_entities += retain_readable::<Address>(object, "addresses");

    let mut state: AppState =
        serde_json::from_value(value).map_err(|e| format!("invalid state: {e}"))?;
    state.schema_version = STATE_SCHEMA_VERSION;
    report.sanitized = sanitize(&mut state);
    Ok(state)
}

/// Schema 1 had no entity versions and allowed a zero list version.
fn migrate(object: &mut serde_json::Map<String, Value>) {
    for key in ["completions", "arrangements"] {
        if let Some(Value::Array(items)) = object.get_mut(key) {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                item.entry("version").or_insert(Value::from(1));
            }
        }
    }
    let list_version = object
        .get("list_version")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        .max(1);
    object.insert("list_version".to_string(), Value::from(list_version));
    object.insert("schema_version".to_string(), Value::from(STATE_SCHEMA_VERSION));
}

/// Drop array elements that do not deserialize as `T`. A null or non-array
/// value is removed so the field falls back to its default.
fn retain_readable<T: DeserializeOwned>(
    object: &mut serde_json::Map<String, Value>,
    key: &str,
) -> usize {
    match object.get_mut(key) {
        Some(Value::Array(items)) => {
            let before = items.len();
            items.retain(|item| serde_json::from_value::<T>(item.clone()).is_ok());
            before - items.len()
        }
        None => 0,
        Some(Value::Null) => {
            object.remove(key);
            0
        }
        Some(_) => {
            object.remove(key);
            1
        }
    }
}
