//! CmdStan output CSV parsing.
//!
//! Layout: `#` comment lines (config, adaptation, timing), a header row, then one
//! row per draw. Sampler diagnostics end in `__` (`lp__`, `divergent__`, ...);
//! everything else is a model parameter (`alpha`, `beta.1`, ...).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sk_core::{Chain, Error, Result, Trace};

/// Parameter names and draws of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    /// Model parameter columns, in file order.
    pub param_names: Vec<String>,
    /// Draws and sampler diagnostics.
    pub chain: Chain,
}

/// Parse CmdStan CSV from any reader. `source` is only used in error messages.
pub fn read_chain<R: Read>(rdr: R, source: &Path) -> Result<ChainOutput> {
    let corrupt =
        |reason: String| Error::Deserialization { path: source.to_path_buf(), reason };

    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| corrupt(format!("failed to read CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut param_cols = Vec::new();
    let mut lp_col = None;
    let mut divergent_col = None;
    for (j, h) in headers.iter().enumerate() {
        match h.as_str() {
            "lp__" => lp_col = Some(j),
            "divergent__" => divergent_col = Some(j),
            h if h.ends_with("__") => {}
            _ => param_cols.push(j),
        }
    }
    if param_cols.is_empty() {
        return Err(corrupt("no parameter columns in CmdStan output".to_string()));
    }

    let mut chain = Chain::default();
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| corrupt(format!("row {row}: {e}")))?;
        let field = |j: usize| -> Result<f64> {
            let raw = record.get(j).unwrap_or("");
            raw.parse::<f64>().map_err(|_| {
                corrupt(format!("row {row}, column '{}': '{raw}' is not a number", headers[j]))
            })
        };
        let draw = param_cols.iter().map(|&j| field(j)).collect::<Result<Vec<f64>>>()?;
        chain.draws.push(draw);
        if let Some(j) = lp_col {
            chain.log_density.push(field(j)?);
        }
        if let Some(j) = divergent_col {
            chain.divergences.push(field(j)? != 0.0);
        }
    }
    if chain.draws.is_empty() {
        return Err(corrupt("CmdStan output contains no draws".to_string()));
    }

    let param_names = param_cols.iter().map(|&j| headers[j].clone()).collect();
    Ok(ChainOutput { param_names, chain })
}

/// Parse one CmdStan output file.
pub fn read_chain_file(path: &Path) -> Result<ChainOutput> {
    let file = File::open(path)?;
    read_chain(file, path)
}

/// Parse all chain files into one trace. Every chain must report the same parameters.
pub fn read_trace(paths: &[impl AsRef<Path>]) -> Result<Trace> {
    let mut trace = Trace::default();
    for (k, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let out = read_chain_file(path)?;
        if k == 0 {
            trace.param_names = out.param_names;
        } else if out.param_names != trace.param_names {
            return Err(Error::Deserialization {
                path: path.to_path_buf(),
                reason: format!(
                    "parameter columns {:?} differ from first chain {:?}",
                    out.param_names, trace.param_names
                ),
            });
        }
        trace.chains.push(out.chain);
    }
    Ok(trace)
}
