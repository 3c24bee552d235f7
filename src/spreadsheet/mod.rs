//! Uniform access to `.xls` and `.xlsx` workbooks.

pub mod cell;
mod excel;
pub(crate) mod reference;
pub mod sheet;
pub mod value;
pub mod writer;
pub(crate) mod xls;
mod xlsx;

use crate::error::SheetError;
use crate::helpers::cfb::CfbError;
use crate::spreadsheet::excel::is_password_protected;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::fs::File;
use std::io::BufReader;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Backend selected by file extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// BIFF8 records inside an OLE compound file
    Xls,
    /// SpreadsheetML parts inside a zip package
    Xlsx,
}

impl Format {
    /// `xlsx` (any case) selects the zip-based backend, every other extension the legacy one.
    pub fn of(path: &Path) -> Format {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("xlsx") => Format::Xlsx,
            _ => Format::Xls,
        }
    }
}

/// An opened workbook.
pub trait Spreadsheet {
    /// File the workbook was opened from
    fn name(&self) -> &str;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Materializes the worksheet at zero-based `index`.
    fn worksheet(&mut self, index: usize) -> Result<Sheet, SheetError>;
}

/// Opens `path` with the backend its extension selects.
pub fn open(path: &Path) -> Result<Box<dyn Spreadsheet>, SheetError> {
    let name = path.display().to_string();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Err(SheetError::FileNotFound(name)),
        Err(error) => Err(error)?,
    };
    let mut reader = BufReader::new(file);
    let format = Format::of(path);
    debug!(file = %name, ?format, "opening spreadsheet");

    match format {
        Format::Xlsx => {
            if is_password_protected(&mut reader) {
                return Err(SheetError::PasswordProtected(name));
            }
            Ok(Box::new(XlsxSpreadsheet::open(&name, reader)?))
        }
        Format::Xls => match XlsSpreadsheet::open(&name, &mut reader) {
            Ok(spreadsheet) => Ok(Box::new(spreadsheet)),
            Err(SheetError::CfbHelperError(CfbError::OleSignatureError)) if !is_xls(path) => {
                Err(SheetError::UnsupportedFormat(name))
            }
            Err(error) => Err(error),
        },
    }
}

fn is_xls(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.eq_ignore_ascii_case("xls"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::cfb::CfbWriter;
    use crate::spreadsheet::value::Value;
    use crate::spreadsheet::writer::XlsWriter;
    use rust_xlsxwriter::Format as XlsxFormat;
    use rust_xlsxwriter::Formula;
    use rust_xlsxwriter::Workbook;
    use std::fs;

    #[test]
    fn format_by_extension() {
        assert_eq!(Format::of(Path::new("a.xlsx")), Format::Xlsx);
        assert_eq!(Format::of(Path::new("a.XLSX")), Format::Xlsx);
        assert_eq!(Format::of(Path::new("a.xls")), Format::Xls);
        assert_eq!(Format::of(Path::new("a.xlsm")), Format::Xls);
        assert_eq!(Format::of(Path::new("noext")), Format::Xls);
    }

    #[test]
    fn missing_file() {
        let directory = tempfile::tempdir().unwrap();
        let result = open(&directory.path().join("missing.xls"));
        assert!(matches!(result, Err(SheetError::FileNotFound(_))));
    }

    #[test]
    fn unsupported_content() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("notes.csv");
        fs::write(&path, "a,b\n1,2\n".repeat(100)).unwrap();
        assert!(matches!(open(&path), Err(SheetError::UnsupportedFormat(_))));

        let path = directory.path().join("notes.xls");
        fs::write(&path, "a,b\n1,2\n".repeat(100)).unwrap();
        assert!(matches!(
            open(&path),
            Err(SheetError::CfbHelperError(CfbError::OleSignatureError))
        ));
    }

    #[test]
    fn legacy_content_under_other_extension() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("report.dat");
        let mut writer = XlsWriter::new("Sheet1").unwrap();
        writer.replace_row(0, vec![Some(Value::from("a"))]).unwrap();
        writer.save(&path).unwrap();

        let mut spreadsheet = open(&path).unwrap();
        assert_eq!(spreadsheet.worksheet(0).unwrap().cells().len(), 1);
    }

    #[test]
    fn worksheets_by_index() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("sheets.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name("First").unwrap().write_string(0, 0, "one").unwrap();
        workbook.add_worksheet().set_name("Second").unwrap().write_string(0, 0, "two").unwrap();
        workbook.save(&path).unwrap();

        let mut spreadsheet = open(&path).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["First".to_owned(), "Second".to_owned()]);
        let sheet = spreadsheet.worksheet(1).unwrap();
        assert_eq!(sheet.name, "Second");
        assert_eq!(sheet.cells()[0].value, Value::from("two"));
        assert!(matches!(
            spreadsheet.worksheet(2),
            Err(SheetError::IndexOutOfRange { index: 2, count: 2, .. })
        ));
    }

    #[test]
    fn xlsx_formulas_read_cached_results() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("formulas.xlsx");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_formula(0, 0, Formula::new("=1+2").set_result("3")).unwrap();
        worksheet.write_formula(0, 1, Formula::new("=\"a\"&\"b\"").set_result("ab")).unwrap();
        workbook.save(&path).unwrap();

        let mut spreadsheet = open(&path).unwrap();
        let values: Vec<Value> = spreadsheet.worksheet(0).unwrap()
            .cells()
            .iter()
            .map(|cell| cell.value.clone())
            .collect();
        assert_eq!(values, vec![Value::from(3), Value::from("ab")]);
    }

    #[test]
    fn encrypted_packages_are_password_protected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("secret.xlsx");
        fs::write(&path, CfbWriter::new("EncryptedPackage", vec![0; 64]).into_bytes()).unwrap();
        match open(&path) {
            Err(SheetError::PasswordProtected(name)) => assert_eq!(name, path.display().to_string()),
            _ => panic!("expected a password protected error"),
        }
    }

    #[test]
    fn out_of_range_dates_read_as_numbers() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("far_future.xlsx");
        let date = XlsxFormat::new().set_num_format("yyyy-mm-dd");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_number_with_format(0, 0, 1.0e12, &date).unwrap();
        worksheet.write_number_with_format(0, 1, 45292.0, &date).unwrap();
        workbook.save(&path).unwrap();

        let mut spreadsheet = open(&path).unwrap();
        let values: Vec<Value> = spreadsheet.worksheet(0).unwrap()
            .cells()
            .iter()
            .map(|cell| cell.value.clone())
            .collect();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(values, vec![Value::Number(1.0e12), Value::Date(day)]);
    }
}
