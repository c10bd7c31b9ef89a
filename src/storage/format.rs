//! Line-oriented text format for datasets, grids, labels and activations.
//!
//! ## Layout
//!
//! ```text
//! # comments and blank lines are ignored
//! dataset <size> <dim>
//! <dim values>                      (size lines)
//!
//! grid <axes> <dim>
//! sizes <axes values>
//! min <dim values>
//! max <dim values>
//! <dim values>                      (one line per cell, offset order)
//! annotation dense                  (optional)
//! <one value per cell>
//! annotation sparse                 (alternative)
//! <i:v tokens, 1-based cell index>
//!
//! activations <rows> <range>
//! <i:v tokens, 1-based> or -        (one line per row, - when empty)
//! ```
//!
//! Labels files are bare whitespace-separated unsigned integers, 0 meaning
//! unknown.

use super::{create_output, open_input};
use crate::dataset::Dataset;
use crate::error::{CartographerError, Result};
use crate::linalg::Vector;
use crate::som::Grid;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

/// A per-cell value attached to a grid file.
#[derive(Debug, Clone, Copy)]
pub enum Annotation<'a> {
    /// Every value, on one line.
    Dense(&'a [f64]),
    /// Only values above `threshold`, as `i:v` tokens.
    Sparse {
        /// One value per cell.
        values: &'a [f64],
        /// Values at or below this are dropped.
        threshold: f64,
    },
}

/// Sparse activation row: `(cell offset, value)` pairs.
pub type SparseRow = Vec<(usize, f64)>;

/// Text format reader/writer.
pub struct TextFormat;

impl TextFormat {
    /// Writes a dataset file.
    pub fn write_dataset<P: AsRef<Path>>(path: P, data: &Dataset, overwrite: bool) -> Result<()> {
        let mut out = create_output(path.as_ref(), overwrite)?;
        Self::encode_dataset(&mut out, data)?;
        out.flush()?;
        Ok(())
    }

    /// Reads a dataset file.
    pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        Self::decode_dataset(open_input(path.as_ref())?)
    }

    /// Writes a grid file with an optional per-cell annotation.
    pub fn write_grid<P: AsRef<Path>>(
        path: P,
        grid: &Grid,
        annotation: Option<Annotation<'_>>,
        overwrite: bool,
    ) -> Result<()> {
        let mut out = create_output(path.as_ref(), overwrite)?;
        Self::encode_grid(&mut out, grid, annotation)?;
        out.flush()?;
        Ok(())
    }

    /// Reads a grid file and its annotation, if any.
    pub fn read_grid<P: AsRef<Path>>(path: P) -> Result<(Grid, Option<Vec<f64>>)> {
        Self::decode_grid(open_input(path.as_ref())?)
    }

    /// Writes a labels file, one label per line.
    pub fn write_labels<P: AsRef<Path>>(path: P, labels: &[u32], overwrite: bool) -> Result<()> {
        let mut out = create_output(path.as_ref(), overwrite)?;
        for label in labels {
            writeln!(out, "{label}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Reads a labels file.
    pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
        Self::decode_labels(open_input(path.as_ref())?)
    }

    /// Writes sparse activation rows.
    pub fn write_activations<P: AsRef<Path>>(
        path: P,
        rows: &[SparseRow],
        range: usize,
        overwrite: bool,
    ) -> Result<()> {
        let mut out = create_output(path.as_ref(), overwrite)?;
        Self::encode_activations(&mut out, rows, range)?;
        out.flush()?;
        Ok(())
    }

    /// Reads sparse activation rows and the cell count they refer to.
    pub fn read_activations<P: AsRef<Path>>(path: P) -> Result<(Vec<SparseRow>, usize)> {
        Self::decode_activations(open_input(path.as_ref())?)
    }

    /// Encodes a dataset.
    pub fn encode_dataset<W: Write>(out: &mut W, data: &Dataset) -> Result<()> {
        writeln!(out, "dataset {} {}", data.len(), data.dim())?;
        for sample in data.samples() {
            write_values(out, sample)?;
        }
        Ok(())
    }

    /// Decodes a dataset.
    pub fn decode_dataset<R: BufRead>(input: R) -> Result<Dataset> {
        let mut lines = Lines::new(input);
        let header = lines.expect("dataset header")?;
        let [size, dim] = lines.header(&header, "dataset")?;
        let mut samples = Vec::new();
        for _ in 0..size {
            let line = lines.expect("sample")?;
            samples.push(Vector::from_vec(lines.values(&line, dim)?));
        }
        lines.finish()?;
        Dataset::new(dim, samples)
    }

    /// Encodes a grid.
    pub fn encode_grid<W: Write>(
        out: &mut W,
        grid: &Grid,
        annotation: Option<Annotation<'_>>,
    ) -> Result<()> {
        writeln!(out, "grid {} {}", grid.axes(), grid.dim())?;
        write!(out, "sizes")?;
        for s in grid.sizes() {
            write!(out, " {s}")?;
        }
        writeln!(out)?;
        write!(out, "min ")?;
        write_values(out, grid.min())?;
        write!(out, "max ")?;
        write_values(out, grid.max())?;
        for cell in grid.cells() {
            write_values(out, cell)?;
        }

        match annotation {
            None => {}
            Some(Annotation::Dense(values)) => {
                CartographerError::check_dim(grid.range(), values.len())?;
                writeln!(out, "annotation dense")?;
                write_values(out, values)?;
            }
            Some(Annotation::Sparse { values, threshold }) => {
                CartographerError::check_dim(grid.range(), values.len())?;
                writeln!(out, "annotation sparse")?;
                let row: SparseRow = values
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|&(_, v)| v > threshold)
                    .collect();
                write_sparse(out, &row)?;
            }
        }
        Ok(())
    }

    /// Decodes a grid and its annotation.
    pub fn decode_grid<R: BufRead>(input: R) -> Result<(Grid, Option<Vec<f64>>)> {
        let mut lines = Lines::new(input);
        let header = lines.expect("grid header")?;
        let [axes, dim] = lines.header(&header, "grid")?;

        let line = lines.expect("sizes")?;
        let sizes: Vec<usize> = lines.keyed(&line, "sizes", axes)?;
        let line = lines.expect("min")?;
        let min: Vec<f64> = lines.keyed(&line, "min", dim)?;
        let line = lines.expect("max")?;
        let max: Vec<f64> = lines.keyed(&line, "max", dim)?;

        let range = sizes
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s))
            .ok_or_else(|| lines.error("grid size overflows"))?;
        let mut cells = Vec::new();
        for _ in 0..range {
            let line = lines.expect("cell")?;
            cells.push(Vector::from_vec(lines.values(&line, dim)?));
        }
        let grid = Grid::from_cells(&sizes, &min, &max, cells)?;

        let annotation = match lines.next_line()? {
            None => None,
            Some(line) => {
                let values = match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                    ["annotation", "dense"] => {
                        let line = lines.expect("dense annotation")?;
                        lines.values(&line, range)?
                    }
                    ["annotation", "sparse"] => {
                        let row = match lines.next_line()? {
                            Some(line) => lines.sparse(&line, range)?,
                            None => Vec::new(),
                        };
                        let mut values = vec![0.0; range];
                        for (i, v) in row {
                            values[i] = v;
                        }
                        values
                    }
                    _ => return Err(lines.error("expected 'annotation dense|sparse'")),
                };
                Some(values)
            }
        };
        lines.finish()?;
        Ok((grid, annotation))
    }

    /// Decodes whitespace-separated labels.
    pub fn decode_labels<R: BufRead>(input: R) -> Result<Vec<u32>> {
        let mut lines = Lines::new(input);
        let mut labels = Vec::new();
        while let Some(line) = lines.next_line()? {
            for token in line.split_whitespace() {
                labels.push(lines.parse(token)?);
            }
        }
        Ok(labels)
    }

    /// Encodes activation rows.
    pub fn encode_activations<W: Write>(out: &mut W, rows: &[SparseRow], range: usize) -> Result<()> {
        writeln!(out, "activations {} {}", rows.len(), range)?;
        for row in rows {
            if let Some(&(i, _)) = row.iter().find(|(i, _)| *i >= range) {
                return Err(CartographerError::IndexOutOfBounds { index: i, max: range });
            }
            write_sparse(out, row)?;
        }
        Ok(())
    }

    /// Decodes activation rows.
    pub fn decode_activations<R: BufRead>(input: R) -> Result<(Vec<SparseRow>, usize)> {
        let mut lines = Lines::new(input);
        let header = lines.expect("activations header")?;
        let [count, range] = lines.header(&header, "activations")?;
        let mut rows = Vec::new();
        for _ in 0..count {
            let line = lines.expect("activation row")?;
            rows.push(lines.sparse(&line, range)?);
        }
        lines.finish()?;
        Ok((rows, range))
    }
}

fn write_values<W: Write>(out: &mut W, values: &[f64]) -> Result<()> {
    let mut first = true;
    for v in values {
        if !first {
            write!(out, " ")?;
        }
        write!(out, "{v}")?;
        first = false;
    }
    writeln!(out)?;
    Ok(())
}

fn write_sparse<W: Write>(out: &mut W, row: &[(usize, f64)]) -> Result<()> {
    if row.is_empty() {
        writeln!(out, "-")?;
        return Ok(());
    }
    let tokens: Vec<String> = row.iter().map(|(i, v)| format!("{}:{}", i + 1, v)).collect();
    writeln!(out, "{}", tokens.join(" "))?;
    Ok(())
}

/// Meaningful lines of a text file, with line numbers for error messages.
struct Lines<R> {
    input: R,
    line_no: usize,
}

impl<R: BufRead> Lines<R> {
    fn new(input: R) -> Self {
        Self { input, line_no: 0 }
    }

    /// Next line that is neither blank nor a comment.
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.input.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = buf.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    fn expect(&mut self, what: &str) -> Result<String> {
        self.next_line()?
            .ok_or_else(|| CartographerError::Storage(format!("unexpected end of file, expected {what}")))
    }

    /// Fails if anything but comments remains.
    fn finish(&mut self) -> Result<()> {
        match self.next_line()? {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected trailing content")),
        }
    }

    fn error(&self, msg: &str) -> CartographerError {
        CartographerError::Storage(format!("line {}: {msg}", self.line_no))
    }

    fn parse<T: FromStr>(&self, token: &str) -> Result<T> {
        token
            .parse()
            .map_err(|_| self.error(&format!("cannot parse '{token}'")))
    }

    /// `<keyword> <a> <b>`.
    fn header(&self, line: &str, keyword: &str) -> Result<[usize; 2]> {
        let values: Vec<usize> = self.keyed(line, keyword, 2)?;
        Ok([values[0], values[1]])
    }

    /// `<keyword>` followed by exactly `count` values.
    fn keyed<T: FromStr>(&self, line: &str, keyword: &str, count: usize) -> Result<Vec<T>> {
        match line.split_once(char::is_whitespace) {
            Some((head, rest)) if head == keyword => self.values(rest, count),
            _ if line == keyword && count == 0 => Ok(Vec::new()),
            _ => Err(self.error(&format!("expected '{keyword}'"))),
        }
    }

    /// Exactly `count` whitespace-separated values.
    fn values<T: FromStr>(&self, line: &str, count: usize) -> Result<Vec<T>> {
        let values = line
            .split_whitespace()
            .map(|t| self.parse(t))
            .collect::<Result<Vec<T>>>()?;
        if values.len() != count {
            return Err(self.error(&format!("expected {count} values, found {}", values.len())));
        }
        Ok(values)
    }

    /// `i:v` tokens with 1-based `i <= range`, or `-` for none.
    fn sparse(&self, line: &str, range: usize) -> Result<SparseRow> {
        if line == "-" {
            return Ok(Vec::new());
        }
        line.split_whitespace()
            .map(|token| {
                let (i, v) = token
                    .split_once(':')
                    .ok_or_else(|| self.error(&format!("expected i:v, found '{token}'")))?;
                let i: usize = self.parse(i)?;
                if i == 0 || i > range {
                    return Err(self.error(&format!("cell {i} outside 1..={range}")));
                }
                Ok((i - 1, self.parse(v)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn grid() -> Grid {
        Grid::new_linear(&[2, 2], &[0.0], &[1.0], 2).unwrap()
    }

    #[test]
    fn test_dataset_text() {
        let data = Dataset::from_rows(vec![vec![1.5, -2.0], vec![0.1, 3.0]]).unwrap();
        let mut buf = Vec::new();
        TextFormat::encode_dataset(&mut buf, &data).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text, "dataset 2 2\n1.5 -2\n0.1 3\n");

        let back = TextFormat::decode_dataset(Cursor::new(buf)).unwrap();
        assert_eq!(back.samples(), data.samples());
    }

    #[test]
    fn test_dataset_comments_and_errors() {
        let text = "# two samples\ndataset 2 1\n\n1\n# middle\n2\n";
        let data = TextFormat::decode_dataset(Cursor::new(text)).unwrap();
        assert_eq!(data.len(), 2);

        for bad in ["dataset 2 1\n1\n", "dataset 1 2\n1\n", "data 1 1\n1\n", "dataset 1 1\nx\n", "dataset 1 1\n1\n2\n"] {
            assert!(matches!(
                TextFormat::decode_dataset(Cursor::new(bad)),
                Err(CartographerError::Storage(_))
            ));
        }
    }

    #[test]
    fn test_huge_header_counts_fail_cleanly() {
        let text = "dataset 18446744073709551615 2\n1 2\n";
        assert!(matches!(
            TextFormat::decode_dataset(Cursor::new(text)),
            Err(CartographerError::Storage(_))
        ));

        let text = "grid 2 1\nsizes 4294967296 4294967296\nmin 0\nmax 1\n0\n";
        assert!(matches!(
            TextFormat::decode_grid(Cursor::new(text)),
            Err(CartographerError::Storage(_))
        ));

        let text = "grid 2 1\nsizes 65536 65536\nmin 0\nmax 1\n0\n";
        assert!(matches!(
            TextFormat::decode_grid(Cursor::new(text)),
            Err(CartographerError::Storage(_))
        ));

        let text = "activations 18446744073709551615 3\n1:0.5\n";
        assert!(matches!(
            TextFormat::decode_activations(Cursor::new(text)),
            Err(CartographerError::Storage(_))
        ));
    }

    #[test]
    fn test_grid_dense_annotation() {
        let grid = grid();
        let values = [0.5, 0.0, 2.0, 1.0];
        let mut buf = Vec::new();
        TextFormat::encode_grid(&mut buf, &grid, Some(Annotation::Dense(&values))).unwrap();
        let (back, annotation) = TextFormat::decode_grid(Cursor::new(buf)).unwrap();
        assert_eq!(back, grid);
        assert_eq!(annotation.unwrap(), values.to_vec());
    }

    #[test]
    fn test_grid_sparse_annotation() {
        let grid = grid();
        let values = [0.5, 0.0, 2.0, 0.05];
        let mut buf = Vec::new();
        let sparse = Annotation::Sparse {
            values: &values,
            threshold: 0.1,
        };
        TextFormat::encode_grid(&mut buf, &grid, Some(sparse)).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.ends_with("annotation sparse\n1:0.5 3:2\n"));

        let (_, annotation) = TextFormat::decode_grid(Cursor::new(buf)).unwrap();
        assert_eq!(annotation.unwrap(), vec![0.5, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_grid_without_annotation() {
        let mut buf = Vec::new();
        TextFormat::encode_grid(&mut buf, &grid(), None).unwrap();
        let (_, annotation) = TextFormat::decode_grid(Cursor::new(buf)).unwrap();
        assert!(annotation.is_none());

        let mut buf = Vec::new();
        assert!(TextFormat::encode_grid(&mut buf, &grid(), Some(Annotation::Dense(&[1.0]))).is_err());
    }

    #[test]
    fn test_labels() {
        let labels = TextFormat::decode_labels(Cursor::new("1 0 2\n# note\n3\n")).unwrap();
        assert_eq!(labels, vec![1, 0, 2, 3]);
        assert!(TextFormat::decode_labels(Cursor::new("1 -1")).is_err());
    }

    #[test]
    fn test_activations() {
        let rows = vec![vec![(0, 0.75), (2, 0.25)], vec![]];
        let mut buf = Vec::new();
        TextFormat::encode_activations(&mut buf, &rows, 3).unwrap();
        assert_eq!(String::from_utf8(buf.clone()).unwrap(), "activations 2 3\n1:0.75 3:0.25\n-\n");
        let (back, range) = TextFormat::decode_activations(Cursor::new(buf)).unwrap();
        assert_eq!(back, rows);
        assert_eq!(range, 3);

        assert!(TextFormat::decode_activations(Cursor::new("activations 1 2\n3:1\n")).is_err());
        assert!(TextFormat::decode_activations(Cursor::new("activations 1 2\n0:1\n")).is_err());
        let mut buf = Vec::new();
        assert!(TextFormat::encode_activations(&mut buf, &[vec![(5, 1.0)]], 3).is_err());
    }
}
