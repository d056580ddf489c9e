use std::io::{Read, Write};

/// Raised when a projection asks for a column the source table does not have.
///
/// This is the schema-drift signal of the pipeline and is kept distinct from
/// transport failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required column '{column}' (available: {})", .available.join(", "))]
    MissingColumn { column: String, available: Vec<String> },
}

/// Row counts from a tolerant CSV read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows: usize,
    pub skipped: usize,
}

/// In-memory CSV table: the header exactly as the provider sent it, plus
/// string cells. Every row is as wide as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding a short one with empty cells.
    ///
    /// Returns `false` and drops the row when it is wider than the header.
    pub fn push_row(&mut self, mut row: Vec<String>) -> bool {
        if row.len() > self.headers.len() {
            return false;
        }
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        true
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, SchemaError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SchemaError::MissingColumn {
                column: name.to_string(),
                available: self.headers.clone(),
            })
    }

    pub fn column<'a>(&'a self, name: &str) -> Result<impl Iterator<Item = &'a str> + 'a, SchemaError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Projection onto `columns`, in that order. Fails on the first column
    /// that is absent rather than filling it with blanks.
    pub fn select(&self, columns: &[&str]) -> Result<Table, SchemaError> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Table {
            headers: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Rewrites every cell of `name` for which `f` returns a replacement.
    /// Returns how many cells changed.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<usize, SchemaError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let idx = self.column_index(name)?;
        let mut changed = 0;
        for row in &mut self.rows {
            if let Some(v) = f(&row[idx]) {
                row[idx] = v;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Reads a CSV document with a header row.
    ///
    /// Rows wider than the header, or that fail to decode, are skipped and
    /// counted in the returned stats. Only I/O failures and an unreadable
    /// header abort the read.
    pub fn read_csv<R: Read>(reader: R) -> Result<(Table, ParseStats), csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut table = Table::new(headers);
        let mut stats = ParseStats::default();

        for (line, result) in rdr.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e),
                Err(e) => {
                    tracing::debug!(error = %e, line, "skipping unreadable CSV row");
                    stats.skipped += 1;
                    continue;
                }
            };

            if table.push_row(record.iter().map(str::to_string).collect()) {
                stats.rows += 1;
            } else {
                tracing::debug!(line, fields = record.len(), "skipping CSV row wider than header");
                stats.skipped += 1;
            }
        }

        Ok((table, stats))
    }

    /// Writes the header row followed by every data row. No index column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        if !self.headers.is_empty() {
            wtr.write_record(&self.headers)?;
        }
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::table;

    #[test]
    fn read_skips_rows_wider_than_header() {
        let mut csv = String::from("meter_uid,kwh\n");
        for i in 0..100 {
            if i == 17 || i == 64 {
                csv.push_str(&format!("m-{i},{i},unexpected\n"));
            } else {
                csv.push_str(&format!("m-{i},{i}\n"));
            }
        }

        let (t, stats) = Table::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(t.len(), 98);
        assert_eq!(stats, ParseStats { rows: 98, skipped: 2 });
        assert!(t.rows().iter().all(|r| r[0] != "m-17" && r[0] != "m-64"));
    }

    #[test]
    fn read_pads_short_rows() {
        let (t, stats) = Table::read_csv("a,b,c\n1,2\n".as_bytes()).unwrap();
        assert_eq!(stats.skipped, 0);
        assert_eq!(t.rows()[0], vec!["1", "2", ""]);
    }

    #[test]
    fn read_skips_invalid_utf8_rows() {
        let mut bytes = b"a,b\n1,2\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b',', b'x', b'\n']);
        bytes.extend_from_slice(b"3,4\n");

        let (t, stats) = Table::read_csv(bytes.as_slice()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn empty_payload_is_an_empty_table() {
        let (t, stats) = Table::read_csv("".as_bytes()).unwrap();
        assert!(t.headers().is_empty());
        assert!(t.is_empty());
        assert_eq!(stats, ParseStats::default());
    }

    #[test]
    fn select_reorders_and_drops_columns() {
        let t = table(&["c", "a", "b"], &[&["3", "1", "2"], &["6", "4", "5"]]);
        let out = t.select(&["a", "b"]).unwrap();

        assert_eq!(out.headers(), ["a", "b"]);
        assert_eq!(out.rows(), [vec!["1", "2"], vec!["4", "5"]]);
    }

    #[test]
    fn select_reports_missing_column() {
        let t = table(&["a"], &[&["1"]]);
        let err = t.select(&["a", "Demand_kw"]).unwrap_err();

        assert_eq!(
            err,
            SchemaError::MissingColumn {
                column: "Demand_kw".to_string(),
                available: vec!["a".to_string()],
            }
        );
        assert!(err.to_string().contains("Demand_kw"));
    }

    #[test]
    fn csv_round_trip_preserves_quoted_cells() {
        let t = table(
            &["meter_uid", "utility_service_address"],
            &[&["1001", "12 Main St, Springfield"], &["1002", "say \"hi\""], &["1003", ""]],
        );

        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let (back, stats) = Table::read_csv(buf.as_slice()).unwrap();

        assert_eq!(stats.skipped, 0);
        assert_eq!(back, t);
    }
}
