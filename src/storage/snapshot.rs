//! Binary snapshot of a trained, labeled map.
//!
//! ```text
//! +------------------+
//! | Magic "CRTG"     |
//! | Version (u16 LE) |
//! +------------------+
//! | bincode Model    |
//! +------------------+
//! ```

use super::{create_output, open_input};
use crate::error::{CartographerError, Result};
use crate::hac::Linkage;
use crate::prsom::ProbabilisticMap;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// Magic number for model snapshots.
const MAGIC: &[u8; 4] = b"CRTG";

/// Current snapshot version.
const VERSION: u16 = 1;

/// Everything needed to classify new samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Trained map with variances and cardinalities.
    pub map: ProbabilisticMap,
    /// Class label per cell, 0 = unlabeled.
    pub cell_labels: Vec<u32>,
    /// Criterion that produced the labels, if clustering ran.
    pub linkage: Option<Linkage>,
}

impl Model {
    /// Bundles a map with its cell labels.
    pub fn new(map: ProbabilisticMap, cell_labels: Vec<u32>, linkage: Option<Linkage>) -> Result<Self> {
        CartographerError::check_dim(map.range(), cell_labels.len())?;
        Ok(Self {
            map,
            cell_labels,
            linkage,
        })
    }

    /// Number of distinct non-zero cell labels.
    pub fn class_count(&self) -> usize {
        let mut labels: Vec<u32> = self.cell_labels.iter().copied().filter(|&l| l != 0).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }

    /// Saves the model.
    pub fn save<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let mut out = create_output(path.as_ref(), overwrite)?;
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// Loads a model, checking magic and version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut input = open_input(path.as_ref())?;
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CartographerError::Storage("invalid magic number".to_string()));
        }
        let mut version = [0u8; 2];
        input.read_exact(&mut version)?;
        let version = u16::from_le_bytes(version);
        if version > VERSION {
            return Err(CartographerError::Storage(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let model: Model = bincode::deserialize_from(&mut input)?;
        let (grid, sigma, cardinality) = model.map.into_parts();
        let map = ProbabilisticMap::from_parts(grid, sigma, cardinality)
            .map_err(|e| CartographerError::Storage(format!("corrupt snapshot: {e}")))?;
        Model::new(map, model.cell_labels, model.linkage)
            .map_err(|e| CartographerError::Storage(format!("corrupt snapshot: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::som::Grid;
    use tempfile::tempdir;

    fn model() -> Model {
        let grid = Grid::new_linear(&[3], &[0.0], &[2.0], 1).unwrap();
        let map = ProbabilisticMap::from_parts(grid, vec![0.5, 1.0, 0.25], vec![4, 0, 2]).unwrap();
        Model::new(map, vec![1, 0, 2], Some(Linkage::Average)).unwrap()
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let model = model();
        model.save(&path, false).unwrap();
        assert_eq!(Model::load(&path).unwrap(), model);
        assert_eq!(model.class_count(), 2);
    }

    #[test]
    fn test_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        model().save(&path, false).unwrap();
        assert!(matches!(
            model().save(&path, false),
            Err(CartographerError::OutputExists(_))
        ));
        model().save(&path, true).unwrap();
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"NOPE\x01\x00").unwrap();
        assert!(matches!(Model::load(&path), Err(CartographerError::Storage(_))));
        assert!(matches!(
            Model::load(dir.path().join("missing.bin")),
            Err(CartographerError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_inconsistent_snapshot() {
        #[derive(Serialize)]
        struct RawMap {
            grid: Grid,
            sigma: Vec<f64>,
            cardinality: Vec<usize>,
        }
        #[derive(Serialize)]
        struct RawModel {
            map: RawMap,
            cell_labels: Vec<u32>,
            linkage: Option<Linkage>,
        }

        let dir = tempdir().unwrap();
        let write = |name: &str, sigma: Vec<f64>, labels: Vec<u32>| {
            let raw = RawModel {
                map: RawMap {
                    grid: Grid::new_linear(&[3], &[0.0], &[2.0], 1).unwrap(),
                    sigma,
                    cardinality: vec![1, 1, 1],
                },
                cell_labels: labels,
                linkage: None,
            };
            let path = dir.path().join(name);
            let mut bytes = MAGIC.to_vec();
            bytes.extend_from_slice(&VERSION.to_le_bytes());
            bytes.extend(bincode::serialize(&raw).unwrap());
            std::fs::write(&path, bytes).unwrap();
            path
        };

        let short_sigma = write("sigma.bin", vec![1.0], vec![1, 0, 2]);
        assert!(matches!(Model::load(&short_sigma), Err(CartographerError::Storage(_))));
        let zero_sigma = write("zero.bin", vec![1.0, 0.0, 1.0], vec![1, 0, 2]);
        assert!(matches!(Model::load(&zero_sigma), Err(CartographerError::Storage(_))));
        let short_labels = write("labels.bin", vec![1.0; 3], vec![1]);
        assert!(matches!(Model::load(&short_labels), Err(CartographerError::Storage(_))));
        let fine = write("fine.bin", vec![1.0; 3], vec![1, 0, 2]);
        assert_eq!(Model::load(&fine).unwrap().class_count(), 2);
    }

    #[test]
    fn test_label_count_checked() {
        let m = model();
        assert!(Model::new(m.map, vec![1], None).is_err());
    }
}
