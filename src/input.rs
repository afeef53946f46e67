//! Transition matrix, label and category files.
//!
//! Dense matrices are text with one row per line, entries separated by
//! whitespace or commas. Sparse matrices start with a `# sparse N` header
//! followed by `i j value` lines (zero-based). Blank lines and other lines
//! starting with `#` are ignored in both formats.

use std::path::Path;

use anyhow::{Context, Result, bail};
use metastate_chain::{StateLabels, TransitionMatrix};
use metastate_linalg::CsrMatrix;
use ndarray::Array2;
use tracing::info;

/// Reads a transition matrix file.
pub fn read_matrix(path: &Path) -> Result<TransitionMatrix> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read matrix file: {}", path.display()))?;
    let matrix = parse_matrix(&text)
        .with_context(|| format!("invalid transition matrix in {}", path.display()))?;
    info!(
        path = %path.display(),
        n_states = matrix.n_states(),
        sparse = matrix.is_sparse(),
        "transition matrix loaded"
    );
    Ok(matrix)
}

/// Parses a dense or sparse transition matrix.
pub fn parse_matrix(text: &str) -> Result<TransitionMatrix> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty());
    if let Some(n) = first.and_then(sparse_header) {
        return parse_sparse(text, n?);
    }
    parse_dense(text)
}

/// Returns the state count of a `# sparse N` header line.
fn sparse_header(line: &str) -> Option<Result<usize>> {
    let rest = line.strip_prefix('#')?.trim_start();
    let n = rest.strip_prefix("sparse")?.trim();
    Some(
        n.parse::<usize>()
            .with_context(|| format!("invalid state count in sparse header: {n:?}")),
    )
}

fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

fn parse_dense(text: &str) -> Result<TransitionMatrix> {
    let mut values = Vec::new();
    let mut n_cols = None;
    let mut n_rows = 0;
    for (line_no, line) in data_lines(text) {
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f64>()
                    .with_context(|| format!("line {line_no}: invalid number {t:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        match n_cols {
            None => n_cols = Some(row.len()),
            Some(n) if n != row.len() => {
                bail!("line {line_no}: expected {n} entries, got {}", row.len())
            }
            Some(_) => {}
        }
        values.extend(row);
        n_rows += 1;
    }
    let Some(n_cols) = n_cols else {
        bail!("matrix file has no rows");
    };
    let a = Array2::from_shape_vec((n_rows, n_cols), values)?;
    Ok(TransitionMatrix::from_dense(a)?)
}

fn parse_sparse(text: &str, n: usize) -> Result<TransitionMatrix> {
    let mut triplets = Vec::new();
    for (line_no, line) in data_lines(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [i, j, v] = fields.as_slice() else {
            bail!("line {line_no}: expected `i j value`, got {line:?}");
        };
        let i: usize = i
            .parse()
            .with_context(|| format!("line {line_no}: invalid row index {i:?}"))?;
        let j: usize = j
            .parse()
            .with_context(|| format!("line {line_no}: invalid column index {j:?}"))?;
        let v: f64 = v
            .parse()
            .with_context(|| format!("line {line_no}: invalid value {v:?}"))?;
        triplets.push((i, j, v));
    }
    let csr = CsrMatrix::from_triplets(n, n, triplets)?;
    Ok(TransitionMatrix::from_sparse(csr)?)
}

/// Reads one label per line.
pub fn read_labels(path: &Path) -> Result<StateLabels> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file: {}", path.display()))?;
    Ok(StateLabels::new(
        text.lines().map(|l| l.trim().to_string()).collect(),
    ))
}

/// Reads one category per line; an empty line, `-` or `NA` marks a state
/// outside every category.
pub fn read_categories(path: &Path) -> Result<Vec<Option<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read categories file: {}", path.display()))?;
    Ok(parse_categories(&text))
}

fn parse_categories(text: &str) -> Vec<Option<String>> {
    text.lines()
        .map(str::trim)
        .map(|l| match l {
            "" | "-" | "NA" => None,
            c => Some(c.to_string()),
        })
        .collect()
}
