use crate::error::ResultOptionChain;
use crate::error::SheetError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use either::Either;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use thiserror::Error;
use tracing::debug;

// BIFF8 record type identifiers
pub(crate) const FORMULA: u16 = 6;        // Formula record with its cached result
pub(crate) const EOF: u16 = 10;           // End of a substream
const DATE1904: u16 = 34;                 // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;                // File password protection record
pub(crate) const BOUND_SHEET8: u16 = 133; // Worksheet definition and position
const MUL_RK: u16 = 189;                  // Multiple RK numbers in one row
pub(crate) const XF: u16 = 224;           // Extended format record for cell styling
pub(crate) const SST: u16 = 252;          // Shared string table
pub(crate) const LABEL_SST: u16 = 253;    // Label referencing shared string table
pub(crate) const NUMBER: u16 = 515;       // Numeric cell value
const LABEL: u16 = 516;                   // Text label cell value
pub(crate) const BOOL_ERR: u16 = 517;     // Boolean or error cell value
pub(crate) const STRING: u16 = 519;       // String value for formula results
const ARRAY: u16 = 545;                   // Array formula, may precede STRING
const TABLE: u16 = 566;                   // Data table formula, may precede STRING
const RK: u16 = 638;                      // RK compressed number
const FORMAT: u16 = 1054;                 // Custom number format definition
const SHR_FMLA: u16 = 1212;               // Shared formula, may precede STRING
pub(crate) const BOF: u16 = 2057;         // Beginning of a substream

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    /// Invalid formula value or structure encountered
    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),

    #[error("Shared string index '{0}' out of range")]
    SharedStringIndexError(usize),
}

/// Reader for Excel 97-2003 workbooks, the global substream is parsed on open.
pub(crate) struct XlsSpreadsheet {
    /// Original file name for error reporting and identification
    pub(crate) name: String,
    /// BIFF8 reader over the whole workbook stream
    reader: Biff8Reader,
    /// Shared string table
    shared_strings: Vec<String>,
    /// Number format mappings indexed by XF
    number_formats: Vec<CellType>,
    /// Worksheets with their names and stream positions
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Parses the container and the workbook globals.
    pub(crate) fn open<RS: Read + Seek>(name: &str, source: &mut RS) -> Result<XlsSpreadsheet, SheetError> {
        let cfb = Cfb::new(source)?;
        let mut reader = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SheetError::CorruptFile(name.to_owned(), "missing workbook stream".to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SheetError::PasswordProtected(name.to_owned()))?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(
                    id.to_string(),
                    CellType::parse_custom_number_format(format.as_ref(), is_1904),
                );
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(2)?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                sheets.push((sheet_name, pointer));
            }
        });
        if sheets.is_empty() {
            Err(SheetError::CorruptFile(name.to_owned(), "no worksheets".to_owned()))?
        }

        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);

        Ok(XlsSpreadsheet {
            name: name.to_owned(),
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Walks the cell records of one worksheet substream.
    fn worksheet(&mut self, index: usize) -> Result<Sheet, SheetError> {
        let (sheet_name, pointer) = self.sheets.get(index).cloned().ok_or_else(|| SheetError::IndexOutOfRange {
            name: self.name.to_owned(),
            index,
            count: self.sheets.len(),
        })?;
        debug!(file = %self.name, sheet = %sheet_name, index, "reading xls worksheet");

        let mut sheet = Sheet::new(&sheet_name);
        self.reader.goto(pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let kind = self.number_format(index);
                        let value = self.reader.read_rk_number()?.to_string();
                        if let Some(cell) = Cell::parse(row, col, kind, &value)? {
                            sheet.push(cell);
                        }
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader, &self.shared_strings)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if !value.is_empty() {
                        if let Some(cell) = Cell::parse(row, col, kind, &value)? {
                            sheet.push(cell);
                        }
                    }
                }
                _ => (),
            }
        }
        sheet.finish();
        Ok(sheet)
    }
}

/// Loads the shared string table from the SST record and its CONTINUE records.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SheetError> {
    let mut shared_strings: Vec<String> = Vec::new();
    reader.skip(4)?;
    let count = reader.read_usize()?;
    for _ in 0..count {
        let string = reader.read_xl_unicode_rich_extended_string()?;
        shared_strings.push(string);
    }
    Ok(shared_strings)
}

/// BOOL_ERR records store either a boolean or an error code, told apart by a flag.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_label_sst_cell(reader: &mut Biff8Reader, shared_strings: &[String]) -> Result<(Either<CellType, usize>, String), SheetError> {
    reader.skip(2)?;
    let index = reader.read_usize()?;
    let value = shared_strings
        .get(index)
        .ok_or(XlsError::SharedStringIndexError(index))?;
    Ok((Either::Left(CellType::String), value.to_owned()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::String), value))
}

/// Reads the cached result of a FORMULA record.
///
/// Numbers are stored inline. String results live in the STRING record that follows,
/// possibly after a shared, array or table formula record.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        loop {
            match reader.next()? {
                Some(SHR_FMLA | ARRAY | TABLE) => continue,
                Some(STRING) => {
                    let value = reader.read_xl_unicode_string()?;
                    break Ok((Either::Left(CellType::String), value));
                }
                _ => break Err(XlsError::FormulaValueError(formula).into()),
            }
        }
    } else if flag == 1 {
        let value = if (formula & 0xFF0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
    } else if flag == 3 {
        Ok((Either::Left(CellType::String), "".to_owned()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::biff8::put_xl_unicode_string;
    use crate::helpers::biff8::Biff8Writer;
    use crate::helpers::bytes::PutLe;
    use crate::helpers::cfb::CfbWriter;
    use crate::spreadsheet::open;
    use crate::spreadsheet::value::Value;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;

    fn bof(kind: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.put_u16(0x0600);
        data.put_u16(kind);
        data.put_u32(0);
        data.put_u32(0);
        data.put_u32(0);
        data
    }

    fn formula(row: u16, col: u16, result: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.put_u16(row);
        data.put_u16(col);
        data.put_u16(0);
        data.put_u64(result);
        data.put_u16(0);
        data.put_u32(0);
        data.put_u16(0);
        data
    }

    /// A workbook stream with one sheet; `globals` go between BOF and BOUNDSHEET8.
    fn workbook(globals: &[(u16, Vec<u8>)], cells: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut writer = Biff8Writer::default();
        writer.record(BOF, &bof(0x0005));
        for (kind, data) in globals {
            writer.record(*kind, data);
        }
        let position = writer.position() + 4;
        let mut bound_sheet = vec![0, 0, 0, 0, 0, 0];
        put_xl_unicode_string(&mut bound_sheet, "Calc", true);
        writer.record(BOUND_SHEET8, &bound_sheet);
        writer.record(EOF, &[]);
        let sheet = writer.position();
        writer.patch_u32(position, sheet as u32);

        writer.record(BOF, &bof(0x0010));
        for (kind, data) in cells {
            writer.record(*kind, data);
        }
        writer.record(EOF, &[]);
        writer.buffer
    }

    fn save(path: &Path, stream_name: &str, stream: Vec<u8>) {
        fs::write(path, CfbWriter::new(stream_name, stream).into_bytes()).unwrap();
    }

    #[test]
    fn formula_cells_carry_cached_results() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("formulas.xls");
        let mut string = Vec::new();
        put_xl_unicode_string(&mut string, "joined", false);
        save(&path, "Workbook", workbook(&[], &[
            (FORMULA, formula(0, 0, 0xFFFF_0000_0000_0000)),
            (SHR_FMLA, vec![0; 10]),
            (STRING, string),
            (FORMULA, formula(0, 1, 2.5f64.to_bits())),
            (FORMULA, formula(1, 0, 0xFFFF_0000_0001_0001)),
            (FORMULA, formula(1, 1, 0xFFFF_0000_0007_0002)),
            (FORMULA, formula(2, 0, 0xFFFF_0000_0000_0003)),
        ]));

        let mut spreadsheet = open(&path).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["Calc".to_owned()]);
        let cells: Vec<(usize, usize, Value)> = spreadsheet.worksheet(0).unwrap()
            .cells()
            .iter()
            .map(|cell| (cell.row, cell.col, cell.value.clone()))
            .collect();
        assert_eq!(cells, vec![
            (0, 0, Value::from("joined")),
            (0, 1, Value::from(2.5)),
            (1, 0, Value::from(true)),
            (1, 1, Value::Error("#DIV/0!".to_owned())),
        ]);
    }

    #[test]
    fn string_formula_without_string_record() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("broken.xls");
        save(&path, "Workbook", workbook(&[], &[(FORMULA, formula(0, 0, 0xFFFF_0000_0000_0000))]));
        let mut spreadsheet = open(&path).unwrap();
        assert!(matches!(
            spreadsheet.worksheet(0),
            Err(SheetError::XlsError(XlsError::FormulaValueError(_)))
        ));
    }

    #[test]
    fn encrypted_workbooks_are_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("secret.xls");
        save(&path, "Workbook", workbook(&[(FILE_PASS, vec![0; 6])], &[]));
        assert!(matches!(open(&path), Err(SheetError::PasswordProtected(_))));
    }

    #[test]
    fn missing_workbook_stream() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("other.xls");
        save(&path, "Other", workbook(&[], &[]));
        assert!(matches!(open(&path), Err(SheetError::CorruptFile(..))));
    }

    #[test]
    fn legacy_book_stream_name() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("book.xls");
        let mut label = vec![0, 0, 0, 0, 0x0F, 0];
        put_xl_unicode_string(&mut label, "hello", false);
        save(&path, "Book", workbook(&[], &[(LABEL, label)]));
        let mut spreadsheet = open(&path).unwrap();
        assert_eq!(spreadsheet.worksheet(0).unwrap().cells()[0].value, Value::from("hello"));
    }
}
