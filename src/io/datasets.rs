//! Pre-reduced spectrum datasets stored as one JSON list.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use crate::datasets::SpectrumDataset;
use crate::error::AnalysisError;

/// Read and validate every dataset in the file.
pub fn read_spectrum_datasets(path: &Path) -> Result<Vec<SpectrumDataset>, AnalysisError> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let datasets: Vec<SpectrumDataset> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| AnalysisError::parse(path, e))?;
    for d in &datasets {
        d.validate()?;
    }
    log::info!("loaded {} pre-reduced dataset(s) from {}", datasets.len(), path.display());
    Ok(datasets)
}

pub fn write_spectrum_datasets(path: &Path, datasets: &[SpectrumDataset]) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    serde_json::to_writer(file, datasets).map_err(|e| AnalysisError::parse(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{Background, edisp_diagonal};
    use crate::domain::EnergyAxis;

    #[test]
    fn shape_errors_surface_on_load() {
        let axis = EnergyAxis::log_spaced(0.1, 10.0, 3).unwrap();
        let mut ds = SpectrumDataset::new(
            "Fermi-LAT",
            axis.clone(),
            axis.clone(),
            vec![5.0, 3.0, 1.0],
            vec![1e10; 3],
            edisp_diagonal(&axis, &axis),
            Background::Model {
                counts: vec![0.5, 0.2, 0.1],
            },
            1e7,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fermi").join("datasets.json");
        write_spectrum_datasets(&path, &[ds.clone()]).unwrap();
        let back = read_spectrum_datasets(&path).unwrap();
        assert_eq!(back, vec![ds.clone()]);

        ds.counts.pop();
        write_spectrum_datasets(&path, &[ds]).unwrap();
        let err = read_spectrum_datasets(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::IncompatibleGeometry(_)));
    }
}
