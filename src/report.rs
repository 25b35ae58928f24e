//! JSON reports of batch results, written for the operator running the CLI.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::workshop::{Account, AccountDeletion};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationReport<'a> {
    pub workshop_name: &'a str,
    pub generated_at: DateTime<Utc>,
    pub created: usize,
    pub failed: usize,
    pub accounts: &'a [Account],
}

impl<'a> CreationReport<'a> {
    pub fn new(workshop_name: &'a str, accounts: &'a [Account]) -> Self {
        let created = accounts.iter().filter(|account| account.is_created()).count();
        Self {
            workshop_name,
            generated_at: Utc::now(),
            created,
            failed: accounts.len() - created,
            accounts,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport<'a> {
    pub workshop_name: &'a str,
    pub generated_at: DateTime<Utc>,
    pub complete: bool,
    pub deletions: &'a [AccountDeletion],
}

impl<'a> DeletionReport<'a> {
    pub fn new(workshop_name: &'a str, deletions: &'a [AccountDeletion]) -> Self {
        Self {
            workshop_name,
            generated_at: Utc::now(),
            complete: deletions.iter().all(AccountDeletion::is_deleted),
            deletions,
        }
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

/// Writes next to the target and renames, so a reader never sees half a
/// report.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
