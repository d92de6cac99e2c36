#![allow(dead_code)]

use async_trait::async_trait;
use calamine::{Data, Range};
use noc_sync::db::{DbError, NewCode};
use noc_sync::fetch_error::FetchError;
use noc_sync::fetcher::{Acquire, DownloadedFile};
use noc_sync::loader::{CodePropagator, Load, LoadError, LoadSummary, StagingStore};
use noc_sync::notifier::{NotificationKind, Notifier, NotifyError};
use noc_sync::record::{NocRecord, Reportable};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SAMPLE_WORKBOOK: &str = "tests/fixtures/noc_nibrs_sample.xlsx";
/// Same rows as `SAMPLE_WORKBOOK`, saved in the legacy BIFF8 `.xls` format the court publishes
pub const SAMPLE_XLS_WORKBOOK: &str = "tests/fixtures/noc_nibrs_sample.xls";

/// Build a sheet the way the court lays it out: header in row 0, data below.
/// Each row is (code, degree, description, reportable) in columns 1, 2, 6 and 14.
pub fn noc_sheet(rows: &[(Data, Data, Data, Data)]) -> Range<Data> {
    let mut range = Range::new((0, 0), (rows.len() as u32, 14));
    range.set_value((0, 1), Data::String("NOC".to_string()));
    range.set_value((0, 2), Data::String("Degree".to_string()));
    range.set_value((0, 6), Data::String("Description".to_string()));
    range.set_value((0, 14), Data::String("Reportable".to_string()));

    for (i, (code, degree, description, reportable)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        range.set_value((row, 1), code.clone());
        range.set_value((row, 2), degree.clone());
        range.set_value((row, 6), description.clone());
        range.set_value((row, 14), reportable.clone());
    }
    range
}

pub fn s(value: &str) -> Data {
    Data::String(value.to_string())
}

pub fn n(value: f64) -> Data {
    Data::Float(value)
}

/// Copy the sample workbook somewhere the pipeline is allowed to delete it
pub fn copy_sample_workbook(dir: &Path) -> PathBuf {
    let target = dir.join("noc_nibrs.xlsx");
    std::fs::copy(SAMPLE_WORKBOOK, &target).expect("Failed to copy sample workbook");
    target
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    pub id: i32,
    pub code: i32,
    pub degree: String,
    pub description: String,
    pub reportable: Reportable,
}

/// Staging table held in memory
#[derive(Default)]
pub struct InMemoryStaging {
    rows: Mutex<Vec<StagedRow>>,
    /// Inserts of this code fail, as a constraint violation would
    reject_code: Option<i32>,
    fail_clear: bool,
}

impl InMemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(code: i32) -> Self {
        Self {
            reject_code: Some(code),
            ..Self::default()
        }
    }

    pub fn failing_clear() -> Self {
        Self {
            fail_clear: true,
            ..Self::default()
        }
    }

    pub fn seed(&self, row: StagedRow) {
        self.rows.lock().unwrap().push(row);
    }

    pub fn rows(&self) -> Vec<StagedRow> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

#[async_trait]
impl StagingStore for InMemoryStaging {
    async fn clear(&self) -> Result<u64, DbError> {
        if self.fail_clear {
            return Err(DbError::SqlxError(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        let cleared = rows.len() as u64;
        rows.clear();
        Ok(cleared)
    }

    async fn insert(&self, id: i32, record: &NocRecord) -> Result<(), DbError> {
        if self.reject_code == Some(record.code()) {
            return Err(DbError::SqlxError(sqlx::Error::Protocol(format!(
                "rejected code {}",
                record.code()
            ))));
        }
        self.rows.lock().unwrap().push(StagedRow {
            id,
            code: record.code(),
            degree: record.degree().to_string(),
            description: record.description().to_string(),
            reportable: record.reportable(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagatorCall {
    Diff {
        target_db: String,
        reportable: Reportable,
    },
    Apply {
        code: i32,
        description: String,
        code_type: String,
    },
}

/// Returns canned diffs per (database, flag) and records every call in order
#[derive(Default)]
pub struct RecordingPropagator {
    diffs: HashMap<(String, Reportable), Vec<NewCode>>,
    fail_apply_for: Option<String>,
    calls: Mutex<Vec<PropagatorCall>>,
}

impl RecordingPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diff(mut self, target_db: &str, reportable: Reportable, codes: &[(i32, &str)]) -> Self {
        self.diffs.insert(
            (target_db.to_string(), reportable),
            codes
                .iter()
                .map(|(code, description)| NewCode {
                    code: *code,
                    description: description.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Every apply with this code type fails
    pub fn failing_apply(mut self, code_type: &str) -> Self {
        self.fail_apply_for = Some(code_type.to_string());
        self
    }

    pub fn calls(&self) -> Vec<PropagatorCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodePropagator for RecordingPropagator {
    async fn diff_new_codes(
        &self,
        target_db: &str,
        reportable: Reportable,
    ) -> Result<Vec<NewCode>, DbError> {
        self.calls.lock().unwrap().push(PropagatorCall::Diff {
            target_db: target_db.to_string(),
            reportable,
        });
        Ok(self
            .diffs
            .get(&(target_db.to_string(), reportable))
            .cloned()
            .unwrap_or_default())
    }

    async fn apply_code(&self, code: i32, description: &str, code_type: &str) -> Result<(), DbError> {
        self.calls.lock().unwrap().push(PropagatorCall::Apply {
            code,
            description: description.to_string(),
            code_type: code_type.to_string(),
        });
        if self.fail_apply_for.as_deref() == Some(code_type) {
            return Err(DbError::SqlxError(sqlx::Error::Protocol(
                "procedure failed".to_string(),
            )));
        }
        Ok(())
    }
}

/// Captures sent notifications
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(NotificationKind, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(NotificationKind, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, kind: NotificationKind, subject: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((kind, subject.to_string()));
        Ok(())
    }
}

/// Counts calls and hands back records it was given, or fails
#[derive(Clone, Default)]
pub struct CountingLoader {
    calls: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<NocRecord>>>,
    fail: bool,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<NocRecord> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Load for CountingLoader {
    async fn load(&self, records: &[NocRecord]) -> Result<LoadSummary, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LoadError::Connect(DbError::SqlxError(
                sqlx::Error::PoolTimedOut,
            )));
        }
        self.received.lock().unwrap().extend_from_slice(records);
        Ok(LoadSummary {
            attempted: records.len(),
            inserted: records.len(),
            ..LoadSummary::default()
        })
    }
}

/// Hands out a file this run "downloaded"; it is deleted when the pipeline drops it
pub struct StaticAcquirer {
    path: PathBuf,
}

impl StaticAcquirer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Acquire for StaticAcquirer {
    async fn acquire(&self) -> Result<DownloadedFile, FetchError> {
        Ok(DownloadedFile::new(&self.path))
    }
}

/// Behaves like a court page with no matching link
pub struct LinkMissingAcquirer;

#[async_trait]
impl Acquire for LinkMissingAcquirer {
    async fn acquire(&self) -> Result<DownloadedFile, FetchError> {
        Err(FetchError::LinkNotFound(
            "(3) NOC_NIBRS (current)".to_string(),
        ))
    }
}
