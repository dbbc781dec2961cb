use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quarry_core::AppError;
use quarry_core::models::{
    ArchivedHarvest, ChildBatch, HarvestBatch, Resource, ResourceBatch, RunStamp,
};
use quarry_core::traits::{HarvestArchive, HarvestSink};
use quarry_core::util::{file_slug, parse_run_id, run_id_suffix};
use serde::{Deserialize, Serialize};

use crate::snapshot::{io_error, write_atomic};

const HARVEST_PREFIX: &str = "comments_";
const BACKUP_PREFIX: &str = "backup_";

/// On-disk form of one resource's harvest for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredHarvest {
    pub resource: Resource,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: BTreeMap<String, ChildBatch>,
}

impl StoredHarvest {
    fn empty(resource: Resource, run: &RunStamp) -> Self {
        Self {
            resource,
            run_id: Some(run.run_id.clone()),
            collected_at: Some(run.started_at),
            children: BTreeMap::new(),
        }
    }

    pub fn item_count(&self) -> usize {
        self.children.values().map(|c| c.items.len()).sum()
    }
}

#[derive(Serialize)]
struct BackupFile<'a> {
    label: &'a str,
    run_id: &'a str,
    collected_at: DateTime<Utc>,
    item_count: usize,
    batch: &'a HarvestBatch,
}

/// Harvest files under one `raw/` directory.
///
/// Each run writes `comments_<name>_<id>_<run>.json` per resource; writing the
/// same batch twice in a run merges by item id instead of duplicating.
#[derive(Debug, Clone)]
pub struct HarvestFiles {
    dir: PathBuf,
}

impl HarvestFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn harvest_path(&self, resource: &Resource, run: &RunStamp) -> PathBuf {
        let id = file_slug(&resource.id);
        let name = if resource.display_name.is_empty() {
            id
        } else {
            format!("{}_{id}", file_slug(&resource.display_name))
        };
        self.dir
            .join(format!("{HARVEST_PREFIX}{name}_{}.json", run.run_id))
    }

    fn read_stored(path: &Path) -> Result<StoredHarvest, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| io_error("read", path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::LedgerIo(format!("Corrupt harvest {}: {e}", path.display())))
    }

    fn harvest_files(&self) -> Result<Vec<PathBuf>, AppError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error("list", &self.dir, e)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(HARVEST_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl HarvestSink for HarvestFiles {
    fn write_resource(&self, batch: &ResourceBatch, run: &RunStamp) -> Result<String, AppError> {
        let path = self.harvest_path(&batch.resource, run);

        let mut stored = if path.exists() {
            let stored = Self::read_stored(&path)?;
            if stored.resource.id != batch.resource.id {
                return Err(AppError::LedgerIo(format!(
                    "{} belongs to resource {}, not {}",
                    path.display(),
                    stored.resource.id,
                    batch.resource.id
                )));
            }
            stored
        } else {
            StoredHarvest::empty(batch.resource.clone(), run)
        };

        let mut added = 0;
        for (child_id, child_batch) in &batch.children {
            added += stored
                .children
                .entry(child_id.clone())
                .or_insert_with(|| ChildBatch::new(child_batch.child.clone()))
                .merge(child_batch.items.iter().cloned());
        }

        let json = serde_json::to_vec_pretty(&stored)?;
        write_atomic(&path, &json)?;
        tracing::info!(
            path = %path.display(),
            added,
            total = stored.item_count(),
            "Harvest file written"
        );
        Ok(path.display().to_string())
    }

    fn dump(&self, batch: &HarvestBatch, label: &str, run: &RunStamp) -> Result<String, AppError> {
        let path = self.dir.join(format!(
            "{BACKUP_PREFIX}{}_{}.json",
            file_slug(label),
            run.run_id
        ));
        let backup = BackupFile {
            label,
            run_id: &run.run_id,
            collected_at: Utc::now(),
            item_count: batch.item_count(),
            batch,
        };
        let json = serde_json::to_vec_pretty(&backup)?;
        write_atomic(&path, &json)?;
        tracing::warn!(path = %path.display(), items = backup.item_count, "Emergency dump written");
        Ok(path.display().to_string())
    }
}

impl HarvestArchive for HarvestFiles {
    fn scan(&self) -> Result<Vec<ArchivedHarvest>, AppError> {
        let mut harvests = Vec::new();

        for path in self.harvest_files()? {
            let stored = match Self::read_stored(&path) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable harvest file");
                    continue;
                }
            };

            let suffix = run_id_suffix(&path);
            let collected_at = stored
                .collected_at
                .or_else(|| suffix.as_deref().and_then(parse_run_id));
            let Some(collected_at) = collected_at else {
                tracing::warn!(path = %path.display(), "Harvest file has no timestamp, skipping");
                continue;
            };
            let run_id = stored
                .run_id
                .clone()
                .or(suffix)
                .unwrap_or_else(|| collected_at.format(quarry_core::util::RUN_ID_FORMAT).to_string());

            harvests.push(ArchivedHarvest {
                source: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                run_id,
                collected_at,
                items: stored
                    .children
                    .into_values()
                    .flat_map(|c| c.items)
                    .collect(),
            });
        }

        tracing::debug!(files = harvests.len(), dir = %self.dir.display(), "Archive scanned");
        Ok(harvests)
    }
}
