//! Observation data store.
//!
//! A directory holding `obs-index.json` and one JSON file per observation:
//!
//! ```text
//! magic/
//!   obs-index.json      [{ "obs_id": "5029747", "file": "run_5029747.json", "components": ["aeff", ...] }, ...]
//!   run_5029747.json    Observation (events + response tables)
//! ```
//!
//! The index lists which response components each file carries, so
//! observations lacking a required component are excluded without loading
//! their events.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{IrfKind, Observation};
use crate::error::AnalysisError;

pub const INDEX_FILE: &str = "obs-index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub obs_id: String,
    /// Path relative to the store directory.
    pub file: PathBuf,
    pub components: Vec<IrfKind>,
}

#[derive(Debug, Clone)]
pub struct DataStore {
    base_dir: PathBuf,
    index: Vec<IndexEntry>,
}

/// Observations passing the component check, and the ones that did not.
#[derive(Debug)]
pub struct StoreSelection {
    pub observations: Vec<Observation>,
    pub excluded: Vec<(String, Vec<IrfKind>)>,
    /// Observations whose file could not be read or parsed.
    pub unreadable: Vec<(String, AnalysisError)>,
}

impl DataStore {
    pub fn from_dir(dir: &Path) -> Result<Self, AnalysisError> {
        let index_path = dir.join(INDEX_FILE);
        let file = File::open(&index_path).map_err(|e| AnalysisError::io(&index_path, e))?;
        let index: Vec<IndexEntry> =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| AnalysisError::parse(&index_path, e))?;
        Ok(Self {
            base_dir: dir.to_path_buf(),
            index,
        })
    }

    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    pub fn obs_ids(&self) -> Vec<String> {
        self.index.iter().map(|e| e.obs_id.clone()).collect()
    }

    pub fn load(&self, entry: &IndexEntry) -> Result<Observation, AnalysisError> {
        let path = self.base_dir.join(&entry.file);
        let file = File::open(&path).map_err(|e| AnalysisError::io(&path, e))?;
        let obs: Observation =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| AnalysisError::parse(&path, e))?;
        if obs.obs_id != entry.obs_id {
            return Err(AnalysisError::parse(
                &path,
                format!("file holds observation {} but the index says {}", obs.obs_id, entry.obs_id),
            ));
        }
        Ok(obs)
    }

    /// Load every observation carrying all `required` components.
    ///
    /// Both the index and the loaded file are checked; a file whose content
    /// disagrees with the index is excluded on what it actually carries. A
    /// file that cannot be loaded excludes its observation only.
    pub fn observations(&self, required: &[IrfKind]) -> Result<StoreSelection, AnalysisError> {
        let mut observations = Vec::new();
        let mut excluded = Vec::new();
        let mut unreadable = Vec::new();
        for entry in &self.index {
            let listed_missing: Vec<IrfKind> = required
                .iter()
                .copied()
                .filter(|k| !entry.components.contains(k))
                .collect();
            if !listed_missing.is_empty() {
                excluded.push((entry.obs_id.clone(), listed_missing));
                continue;
            }
            let obs = match self.load(entry) {
                Ok(obs) => obs,
                Err(err) => {
                    log::warn!("cannot load observation {}: {err}", entry.obs_id);
                    unreadable.push((entry.obs_id.clone(), err));
                    continue;
                }
            };
            let missing = obs.missing_components(required);
            if missing.is_empty() {
                observations.push(obs);
            } else {
                excluded.push((entry.obs_id.clone(), missing));
            }
        }
        Ok(StoreSelection {
            observations,
            excluded,
            unreadable,
        })
    }
}

/// Write `observations` as a data store under `dir`.
pub fn write_data_store(dir: &Path, observations: &[Observation]) -> Result<(), AnalysisError> {
    fs::create_dir_all(dir).map_err(|e| AnalysisError::io(dir, e))?;
    let mut index = Vec::with_capacity(observations.len());
    for obs in observations {
        let file = PathBuf::from(format!("run_{}.json", obs.obs_id));
        let path = dir.join(&file);
        let out = File::create(&path).map_err(|e| AnalysisError::io(&path, e))?;
        serde_json::to_writer(out, obs).map_err(|e| AnalysisError::parse(&path, e))?;
        index.push(IndexEntry {
            obs_id: obs.obs_id.clone(),
            file,
            components: obs.irfs.components(),
        });
    }
    let index_path = dir.join(INDEX_FILE);
    let out = File::create(&index_path).map_err(|e| AnalysisError::io(&index_path, e))?;
    serde_json::to_writer_pretty(out, &index).map_err(|e| AnalysisError::parse(&index_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EffectiveArea2D, Irfs, RadMax2D, SkyCoord};
    use chrono::TimeZone;

    fn observation(obs_id: &str, with_rad_max: bool) -> Observation {
        let t0 = chrono::Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Observation {
            obs_id: obs_id.to_string(),
            pointing: SkyCoord::new(83.63, 22.41),
            livetime: 1200.0,
            tstart: t0,
            tstop: t0 + chrono::Duration::seconds(1200),
            events: Vec::new(),
            irfs: Irfs {
                aeff: Some(EffectiveArea2D {
                    energy_true: vec![0.01, 100.0],
                    offset: vec![0.0, 2.0],
                    data: vec![vec![1e5, 1e5], vec![1e5, 1e5]],
                }),
                edisp: None,
                rad_max: with_rad_max.then(|| RadMax2D::constant(0.14)),
            },
        }
    }

    #[test]
    fn excludes_observations_missing_components() {
        let dir = tempfile::tempdir().unwrap();
        write_data_store(dir.path(), &[observation("1", true), observation("2", false)]).unwrap();

        let store = DataStore::from_dir(dir.path()).unwrap();
        assert_eq!(store.obs_ids(), vec!["1".to_string(), "2".to_string()]);

        let selection = store.observations(&[IrfKind::Aeff, IrfKind::RadMax]).unwrap();
        assert_eq!(selection.observations.len(), 1);
        assert_eq!(selection.observations[0].obs_id, "1");
        assert_eq!(selection.excluded, vec![("2".to_string(), vec![IrfKind::RadMax])]);
    }

    #[test]
    fn missing_index_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataStore::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn corrupt_observation_file_excludes_only_that_run() {
        let dir = tempfile::tempdir().unwrap();
        write_data_store(dir.path(), &[observation("1", true), observation("2", true)]).unwrap();
        std::fs::write(dir.path().join("run_2.json"), "{ not json").unwrap();

        let selection = DataStore::from_dir(dir.path())
            .unwrap()
            .observations(&[IrfKind::Aeff, IrfKind::RadMax])
            .unwrap();
        assert_eq!(selection.observations.len(), 1);
        assert_eq!(selection.observations[0].obs_id, "1");
        assert!(selection.excluded.is_empty());
        assert_eq!(selection.unreadable.len(), 1);
        assert_eq!(selection.unreadable[0].0, "2");
        assert!(matches!(selection.unreadable[0].1, AnalysisError::Parse { .. }));
    }
}
