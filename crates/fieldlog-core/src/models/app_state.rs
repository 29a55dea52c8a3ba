//! Confirmed application state: the fold of every applied operation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{Address, Arrangement, Completion, DaySession, EntityData};
use crate::constants::STATE_SCHEMA_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub list_version: u32,
    #[serde(default)]
    pub active_index: Option<usize>,
    #[serde(default)]
    pub active_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completions: Vec<Completion>,
    #[serde(default)]
    pub arrangements: Vec<Arrangement>,
    #[serde(default)]
    pub day_sessions: Vec<DaySession>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            addresses: Vec::new(),
            list_version: 1,
            active_index: None,
            active_start_time: None,
            completions: Vec::new(),
            arrangements: Vec::new(),
            day_sessions: Vec::new(),
        }
    }
}

impl AppState {
    pub fn completion(&self, id: &str) -> Option<&Completion> {
        self.completions.iter().find(|c| c.id == id)
    }

    pub fn arrangement(&self, id: &str) -> Option<&Arrangement> {
        self.arrangements.iter().find(|a| a.id == id)
    }

    pub fn session(&self, date: NaiveDate) -> Option<&DaySession> {
        self.day_sessions.iter().find(|s| s.date == date)
    }

    /// Insert or replace an entity by its identity.
    pub fn upsert(&mut self, entity: EntityData) {
        match entity {
            EntityData::Completion(c) => {
                match self.completions.iter_mut().find(|x| x.id == c.id) {
                    Some(slot) => *slot = c,
                    None => self.completions.push(c),
                }
            }
            EntityData::Arrangement(a) => {
                match self.arrangements.iter_mut().find(|x| x.id == a.id) {
                    Some(slot) => *slot = a,
                    None => self.arrangements.push(a),
                }
            }
            EntityData::Session(s) => {
                match self.day_sessions.iter_mut().find(|x| x.date == s.date) {
                    Some(slot) => *slot = s,
                    None => self.day_sessions.push(s),
                }
            }
        }
    }

    /// Remove an entity by identity. Returns whether anything was removed.
    pub fn remove(&mut self, entity: &EntityData) -> bool {
        let id = entity.entity_id();
        let before = self.entity_count();
        match entity {
            EntityData::Completion(_) => self.completions.retain(|c| c.id != id),
            EntityData::Arrangement(_) => self.arrangements.retain(|a| a.id != id),
            EntityData::Session(s) => {
                let date = s.date;
                self.day_sessions.retain(|x| x.date != date)
            }
        }
        self.entity_count() != before
    }

    fn entity_count(&self) -> usize {
        self.completions.len() + self.arrangements.len() + self.day_sessions.len()
    }
}
