//! JSON data files: `{"x": [[...], ...], "y": [...]}`, samples as rows.

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct DataJson {
    x: Vec<Vec<f64>>,
    #[serde(default)]
    y: Option<Vec<f64>>,
}

/// Parsed data file.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: DMatrix<f64>,
    pub y: Option<DVector<f64>>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let raw: DataJson = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Self::from_rows(raw.x, raw.y)
    }

    fn from_rows(rows: Vec<Vec<f64>>, y: Option<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        let p = rows.first().map(Vec::len).unwrap_or(0);
        if n == 0 || p == 0 {
            anyhow::bail!("x must be a non-empty list of non-empty rows");
        }
        if let Some(i) = rows.iter().position(|r| r.len() != p) {
            anyhow::bail!("x row {i} has {} values, expected {p}", rows[i].len());
        }
        let x = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
        Ok(Self { x, y: y.map(DVector::from_vec) })
    }

    pub fn labels(&self) -> Result<&DVector<f64>> {
        self.y.as_ref().context("data file has no \"y\" labels")
    }
}
