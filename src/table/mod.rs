//! Row/column to record mapping.
//!
//! Row 0 of a worksheet holds the column names, every following row one record.
//! The first row that is blank in every header column ends the table.

pub mod naming;
pub mod record;

use crate::error::SheetError;
use crate::spreadsheet::open;
use crate::spreadsheet::sheet::cells_of;
use crate::spreadsheet::sheet::Rows;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::value::Value;
use crate::spreadsheet::writer::create_workbook;
use crate::spreadsheet::writer::WorkbookWriter;
use crate::spreadsheet::Format;
use crate::table::naming::NameGenerator;
use crate::table::naming::RandomNames;
use crate::table::record::Entry;
use crate::table::record::Key;
use crate::table::record::Record;
use std::iter::FusedIterator;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::trace;

/// Worksheet name used by [`Encoder::default`].
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

fn load_sheet(path: &Path, index: usize) -> Result<Sheet, SheetError> {
    let mut spreadsheet = open(path)?;
    let sheet = spreadsheet.worksheet(index)?;
    debug!(file = spreadsheet.name(), sheet = %sheet.name, index, "selected worksheet");
    Ok(sheet)
}

/// Column names of worksheet `index`, read from row 0 up to the first missing cell.
pub fn headers(path: impl AsRef<Path>, index: usize) -> Result<Vec<Key>, SheetError> {
    let sheet = load_sheet(path.as_ref(), index)?;
    if sheet.is_empty() {
        return Ok(Vec::new());
    }
    let header_row = sheet.rows().next().flatten();
    let headers = cells_of(header_row.as_ref())
        .into_iter()
        .map_while(|value| value.map(|value| Key::from(value.to_string())))
        .collect();
    Ok(headers)
}

/// Lazily decodes the records of worksheet `index`.
///
/// The file is opened twice, once for the headers and once for the rows.
/// Calling again starts over from a fresh read.
pub fn decode_rows(path: impl AsRef<Path>, index: usize) -> Result<Records, SheetError> {
    let path = path.as_ref();
    let headers = headers(path, index)?;
    let mut rows = load_sheet(path, index)?.rows();
    rows.next();
    Ok(Records {
        rows,
        headers,
        count: 0,
        is_finished: false,
    })
}

/// Eagerly collects [`decode_rows`].
pub fn to_array(path: impl AsRef<Path>, index: usize) -> Result<Vec<Record>, SheetError> {
    Ok(decode_rows(path, index)?.collect())
}

/// Records of one worksheet, in file order.
pub struct Records {
    rows: Rows,
    headers: Vec<Key>,
    count: usize,
    is_finished: bool,
}

impl Records {
    pub fn headers(&self) -> &[Key] {
        &self.headers
    }

    fn finish(&mut self) -> Option<Record> {
        if !self.is_finished {
            self.is_finished = true;
            debug!(records = self.count, "decoded records");
        }
        None
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.is_finished {
            return None;
        }
        let Some(row) = self.rows.next() else {
            return self.finish();
        };

        let mut slots: Vec<Option<Value>> = vec![None; self.headers.len()];
        for (slot, value) in slots.iter_mut().zip(cells_of(row.as_ref())) {
            *slot = value;
        }
        let is_blank = slots
            .iter()
            .all(|value| value.as_ref().map(Value::is_blank).unwrap_or(true));
        if slots.is_empty() || is_blank {
            return self.finish();
        }

        self.count += 1;
        Some(self.headers.iter().cloned().zip(slots).collect())
    }
}

impl FusedIterator for Records {}

/// Projects records onto rows: a header row of key names, then one row per record.
///
/// Keys follow `column_order`, or the key order of the first record.
/// A record lacking a key gets `None` in that column.
pub fn records_to_rows<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    column_order: Option<&[Key]>,
) -> Vec<Vec<Option<Value>>> {
    let records: Vec<&Record> = records.into_iter().collect();
    let keys: Vec<Key> = match column_order {
        Some(keys) => keys.to_vec(),
        None => records
            .first()
            .map(|record| record.keys().cloned().collect())
            .unwrap_or_default(),
    };

    let mut rows: Vec<Vec<Option<Value>>> = Vec::with_capacity(records.len() + 1);
    rows.push(keys.iter().map(|key| Some(Value::from(key.to_string()))).collect());
    for record in records {
        rows.push(keys.iter().map(|key| record.get(key).cloned().flatten()).collect());
    }
    rows
}

/// Writes entries to a new workbook.
pub struct Encoder {
    sheet_name: String,
    name_generator: Box<dyn NameGenerator>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_owned(),
            name_generator: Box::new(RandomNames),
        }
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the generator used when `encode` gets no path.
    pub fn with_name_generator(mut self, name_generator: impl NameGenerator + 'static) -> Self {
        self.name_generator = Box::new(name_generator);
        self
    }

    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    /// Writes `entries` and returns the path written.
    ///
    /// Entries must be all records or all rows; an empty list counts as rows.
    /// Records are projected with [`records_to_rows`], rows are written unchanged.
    /// A failed write may leave a partial file behind.
    pub fn encode(
        &self,
        entries: &[Entry],
        column_order: Option<&[Key]>,
        path: Option<&Path>,
    ) -> Result<PathBuf, SheetError> {
        let rows = to_rows(entries, column_order)?;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.name_generator.generate());

        let rows_written = rows.len();
        let mut writer = create_workbook(&path, &self.sheet_name)?;
        match &mut writer {
            WorkbookWriter::Xlsx(writer) => {
                for (row, values) in rows.iter().enumerate() {
                    trace!(row, "encode row");
                    for (col, value) in values.iter().enumerate() {
                        writer.set_cell(row, col, value.as_ref())?;
                    }
                }
            }
            WorkbookWriter::Xls(writer) => {
                for (row, values) in rows.into_iter().enumerate() {
                    writer.replace_row(row, values)?;
                }
            }
        }
        writer.save(&path)?;
        debug!(
            path = %path.display(),
            format = ?Format::of(&path),
            rows = rows_written,
            "encoded entries"
        );
        Ok(path)
    }
}

/// Writes `entries` with the default [`Encoder`].
pub fn encode(
    entries: &[Entry],
    column_order: Option<&[Key]>,
    path: Option<&Path>,
) -> Result<PathBuf, SheetError> {
    Encoder::default().encode(entries, column_order, path)
}

fn to_rows(
    entries: &[Entry],
    column_order: Option<&[Key]>,
) -> Result<Vec<Vec<Option<Value>>>, SheetError> {
    if entries.iter().all(|entry| matches!(entry, Entry::Row(_))) {
        Ok(entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Row(row) => Some(row.clone()),
                _ => None,
            })
            .collect())
    } else if entries.iter().all(|entry| matches!(entry, Entry::Record(_))) {
        let records = entries.iter().filter_map(|entry| match entry {
            Entry::Record(record) => Some(record),
            _ => None,
        });
        Ok(records_to_rows(records, column_order))
    } else {
        Err(SheetError::InvalidInputShape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_INPUT_SHAPE;
    use crate::spreadsheet::writer::XlsWriter;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(pairs: &[(&str, Option<Value>)]) -> Record {
        pairs
            .iter()
            .map(|(key, value)| (Key::from(*key), value.clone()))
            .collect()
    }

    fn row(values: &[Option<&str>]) -> Entry {
        Entry::Row(values.iter().map(|value| value.map(Value::from)).collect())
    }

    fn text(value: &str) -> Option<Value> {
        Some(Value::from(value))
    }

    fn number(value: i32) -> Option<Value> {
        Some(Value::from(value))
    }

    fn keys(names: &[&str]) -> Vec<Key> {
        names.iter().map(|name| Key::from(*name)).collect()
    }

    fn write_rows(directory: &TempDir, name: &str, rows: &[Entry]) -> PathBuf {
        encode(rows, None, Some(&directory.path().join(name))).unwrap()
    }

    #[test]
    fn headers_stop_at_first_missing_cell() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [
            row(&[Some("id"), Some("name"), None, Some("ignored")]),
            row(&[Some("1"), Some("a"), Some("x"), Some("y")]),
        ];
        for name in ["headers.xls", "headers.xlsx"] {
            let path = write_rows(&directory, name, &rows);
            assert_eq!(headers(&path, 0).unwrap(), keys(&["id", "name"]));
            assert_eq!(
                to_array(&path, 0).unwrap(),
                vec![record(&[("id", text("1")), ("name", text("a"))])]
            );
        }
    }

    #[test]
    fn blank_row_ends_the_table() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [
            row(&[Some("a"), Some("b"), Some("c")]),
            row(&[Some("1"), Some("2"), Some("3")]),
            row(&[Some("4"), Some("5")]),
            row(&[Some("6")]),
            row(&[]),
            row(&[Some("7"), Some("8"), Some("9")]),
        ];
        for name in ["blank.xls", "blank.xlsx"] {
            let path = write_rows(&directory, name, &rows);
            let records = to_array(&path, 0).unwrap();
            assert_eq!(
                records,
                vec![
                    record(&[("a", text("1")), ("b", text("2")), ("c", text("3"))]),
                    record(&[("a", text("4")), ("b", text("5")), ("c", None)]),
                    record(&[("a", text("6")), ("b", None), ("c", None)]),
                ]
            );
            assert!(records.iter().all(|record| record.len() == 3));
        }
    }

    #[test]
    fn whitespace_only_row_is_blank() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [
            row(&[Some("a"), Some("b")]),
            row(&[Some("1"), None]),
            row(&[Some("  "), Some("\t")]),
            row(&[Some("2"), Some("3")]),
        ];
        let path = write_rows(&directory, "spaces.xlsx", &rows);
        assert_eq!(
            to_array(&path, 0).unwrap(),
            vec![record(&[("a", text("1")), ("b", None)])]
        );
    }

    #[test]
    fn partially_blank_rows_are_data() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [
            row(&[Some("a"), Some("b")]),
            row(&[None, Some("1")]),
            row(&[Some("2"), Some(" ")]),
        ];
        let path = write_rows(&directory, "sparse.xls", &rows);
        assert_eq!(
            to_array(&path, 0).unwrap(),
            vec![
                record(&[("a", None), ("b", text("1"))]),
                record(&[("a", text("2")), ("b", text(" "))]),
            ]
        );
    }

    #[test]
    fn empty_tables() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [row(&[]), row(&[Some("1")])];
        let blank_header = write_rows(&directory, "blank_header.xlsx", &rows);
        assert_eq!(headers(&blank_header, 0).unwrap(), Vec::<Key>::new());
        assert_eq!(to_array(&blank_header, 0).unwrap(), Vec::<Record>::new());

        let rows = [row(&[Some("a"), Some("b")])];
        let header_only = write_rows(&directory, "header_only.xls", &rows);
        assert_eq!(to_array(&header_only, 0).unwrap(), Vec::<Record>::new());

        let empty = write_rows(&directory, "empty.xls", &[]);
        assert_eq!(headers(&empty, 0).unwrap(), Vec::<Key>::new());
        assert_eq!(to_array(&empty, 0).unwrap(), Vec::<Record>::new());
    }

    #[test]
    fn records_round_trip_in_both_formats() {
        let directory = tempfile::tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let records = vec![
            record(&[
                ("name", text("Ada")),
                ("age", number(36)),
                ("born", Some(Value::from(day))),
                ("admin", Some(Value::from(true))),
            ]),
            record(&[
                ("name", text("Grace")),
                ("age", Some(Value::from(85.5))),
                ("born", None),
                ("admin", Some(Value::from(false))),
            ]),
        ];
        let entries: Vec<Entry> = records.iter().cloned().map(Entry::from).collect();
        let order = keys(&["admin", "name", "born", "age"]);
        for name in ["people.xls", "people.xlsx"] {
            let target = directory.path().join(name);
            let path = encode(&entries, Some(&order), Some(&target)).unwrap();
            assert_eq!(path, target);
            assert_eq!(headers(&path, 0).unwrap(), order);
            let decoded = to_array(&path, 0).unwrap();
            assert_eq!(decoded, records);
            assert_eq!(decoded[0].keys().cloned().collect::<Vec<_>>(), order);
        }
    }

    #[test]
    fn column_order_projects_records() {
        let directory = tempfile::tempdir().unwrap();
        let entries = vec![
            Entry::from(record(&[("a", number(1)), ("b", number(2)), ("c", number(3))])),
            Entry::from(record(&[("c", number(6)), ("a", number(4))])),
        ];
        let target = directory.path().join("order.xlsx");
        let path = encode(&entries, Some(&keys(&["c", "a"])), Some(&target)).unwrap();
        assert_eq!(
            to_array(&path, 0).unwrap(),
            vec![
                record(&[("c", number(3)), ("a", number(1))]),
                record(&[("c", number(6)), ("a", number(4))]),
            ]
        );
    }

    #[test]
    fn first_record_decides_the_default_order() {
        let records = [
            record(&[("b", number(1)), ("a", number(2))]),
            record(&[("a", number(3)), ("z", number(4))]),
        ];
        assert_eq!(
            records_to_rows(&records, None),
            vec![
                vec![text("b"), text("a")],
                vec![number(1), number(2)],
                vec![None, number(3)],
            ]
        );
    }

    #[test]
    fn mixed_or_scalar_entries_are_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("rejected.xls");
        let scalar = vec![Entry::from(record(&[("a", None)])), Entry::from(Value::from(1))];
        let mixed = vec![Entry::from(record(&[("a", None)])), row(&[Some("x")])];
        for entries in [scalar, mixed, vec![Entry::from(Value::from("x"))]] {
            let error = encode(&entries, None, Some(&path)).unwrap_err();
            assert!(matches!(error, SheetError::InvalidInputShape));
            assert_eq!(error.to_string(), INVALID_INPUT_SHAPE);
        }
        assert!(!path.exists());
    }

    #[test]
    fn generated_names_are_used_without_path() {
        let directory = tempfile::tempdir().unwrap();
        let target = directory.path().join("generated.xls");
        let generated = target.clone();
        let encoder = Encoder::new()
            .with_name_generator(move || generated.clone())
            .with_sheet_name("People");
        let rows = [row(&[Some("a")]), row(&[Some("1")])];
        let path = encoder.encode(&rows, None, None).unwrap();
        assert_eq!(path, target);

        let mut spreadsheet = open(&path).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["People".to_owned()]);
        assert_eq!(spreadsheet.worksheet(0).unwrap().cells().len(), 2);
    }

    #[test]
    fn invalid_sheet_names_are_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [row(&[Some("a")])];
        for name in ["long.xls", "long.xlsx"] {
            let path = directory.path().join(name);
            let encoder = Encoder::new().with_sheet_name("x".repeat(40));
            let result = encoder.encode(&rows, None, Some(&path));
            assert!(matches!(result, Err(SheetError::XlsxWriterError(_))));
            assert!(!path.exists());
        }
    }

    #[test]
    fn overlong_text_is_rejected_for_xls() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("long_text.xls");
        let long = "x".repeat(70_000);
        let rows = [
            row(&[Some("a"), Some("b")]),
            row(&[Some(long.as_str()), Some("after")]),
        ];
        let result = encode(&rows, None, Some(&path));
        assert!(matches!(
            result,
            Err(SheetError::XlsStringLimit { length: 70_000, .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn decoding_is_lazy_and_restartable() {
        let directory = tempfile::tempdir().unwrap();
        let rows = [row(&[Some("n")]), row(&[Some("1")]), row(&[Some("2")])];
        let path = write_rows(&directory, "lazy.xlsx", &rows);
        let mut records = decode_rows(&path, 0).unwrap();
        assert_eq!(records.headers(), keys(&["n"]).as_slice());
        assert_eq!(records.next(), Some(record(&[("n", text("1"))])));
        assert_eq!(decode_rows(&path, 0).unwrap().count(), 2);
        assert_eq!(records.next(), Some(record(&[("n", text("2"))])));
        assert_eq!(records.next(), None);
        assert_eq!(records.next(), None);
    }

    #[test]
    fn worksheet_selection() {
        let directory = tempfile::tempdir().unwrap();
        let path = write_rows(&directory, "one.xls", &[row(&[Some("a")])]);
        assert!(matches!(
            headers(&path, 1),
            Err(SheetError::IndexOutOfRange { index: 1, count: 1, .. })
        ));
        assert!(matches!(
            to_array(directory.path().join("missing.xlsx"), 0),
            Err(SheetError::FileNotFound(_))
        ));
    }

    #[test]
    fn rows_are_replaced_not_merged() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("replaced.xls");
        let mut writer = XlsWriter::new(DEFAULT_SHEET_NAME).unwrap();
        writer.replace_row(0, vec![text("k")]).unwrap();
        writer.replace_row(1, vec![text("old"), text("tail")]).unwrap();
        writer.replace_row(1, vec![text("new")]).unwrap();
        writer.save(&path).unwrap();
        assert_eq!(to_array(&path, 0).unwrap(), vec![record(&[("k", text("new"))])]);
    }
}
