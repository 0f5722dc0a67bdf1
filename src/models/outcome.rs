//! Run outcome models
//!
//! This module defines the observable result of one orchestration run and
//! the vocabulary used to describe where a run or an entity stopped.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Entity;

/// Steps of the per-entity workflow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStep {
    /// Look up the entity's fragment
    Extract,
    /// Upload the JSON snapshot blob
    UploadJson,
    /// Remove every record in the entity's partition
    DeletePriorRecords,
    /// Insert the fresh record
    InsertRecord,
    /// Upload the flag image if absent
    UploadFlag,
    /// Upload the map image if absent
    UploadMap,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStep::Extract => "extract",
            SyncStep::UploadJson => "upload-json",
            SyncStep::DeletePriorRecords => "delete-prior-records",
            SyncStep::InsertRecord => "insert-record",
            SyncStep::UploadFlag => "upload-flag",
            SyncStep::UploadMap => "upload-map",
        };
        write!(f, "{}", s)
    }
}

/// Blob artifacts kept per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Dataset fragment snapshot, re-uploaded every run
    Json,
    /// Flag image, uploaded once
    Flag,
    /// Map image, uploaded once
    Map,
}

impl ArtifactKind {
    /// Blob name of this artifact for an entity
    pub fn blob_name(&self, entity: &Entity) -> String {
        match self {
            ArtifactKind::Json => format!("{}.json", entity.key),
            ArtifactKind::Flag => format!("{}.gif", entity.key),
            ArtifactKind::Map => format!("{}-map.gif", entity.key),
        }
    }

    /// Whether an existing blob is replaced on every run
    pub fn overwrites(&self) -> bool {
        matches!(self, ArtifactKind::Json)
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Fetching,
    FetchFailed,
    FanningOut,
    Aggregating,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::FetchFailed => "fetch_failed",
            RunPhase::FanningOut => "fanning_out",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// Result of one entity's workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityOutcome {
    /// Entity key
    pub key: String,
    /// Whether every step succeeded
    pub ok: bool,
}

/// Observable result of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Instance id of the run
    pub run_id: Uuid,

    /// Final state of the run
    pub phase: RunPhase,

    /// Whether the bulk fetch succeeded
    pub fetched: bool,

    /// Per-entity results in catalog order (empty when the fetch failed)
    pub entities: Vec<EntityOutcome>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl SyncOutcome {
    /// Outcome of a run whose bulk fetch failed
    pub fn fetch_failed(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            phase: RunPhase::FetchFailed,
            fetched: false,
            entities: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Outcome of a run that fanned out over every entity
    pub fn completed(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        entities: Vec<EntityOutcome>,
    ) -> Self {
        Self {
            run_id,
            phase: RunPhase::Done,
            fetched: true,
            entities,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Boolean sequence: fetch flag, one flag per entity, completion sentinel
    ///
    /// A failed fetch yields exactly `[false]`.
    pub fn flags(&self) -> Vec<bool> {
        if !self.fetched {
            return vec![false];
        }

        let mut flags = Vec::with_capacity(self.entities.len() + 2);
        flags.push(true);
        flags.extend(self.entities.iter().map(|e| e.ok));
        flags.push(self.phase == RunPhase::Done);
        flags
    }

    /// Keys of entities whose workflow failed, in catalog order
    pub fn failed_entities(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| !e.ok)
            .map(|e| e.key.as_str())
            .collect()
    }

    /// Number of entities synced successfully
    pub fn succeeded(&self) -> usize {
        self.entities.iter().filter(|e| e.ok).count()
    }

    /// Whether the fetch and every entity succeeded
    pub fn is_complete_success(&self) -> bool {
        self.fetched && self.phase == RunPhase::Done && self.entities.iter().all(|e| e.ok)
    }
}
