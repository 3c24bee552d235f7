//! Workbook writers for both formats, each holding a single worksheet.
use crate::error::SheetError;
use crate::helpers::biff8::put_xl_unicode_string;
use crate::helpers::biff8::Biff8Writer;
use crate::helpers::bytes::PutLe;
use crate::helpers::cfb::CfbWriter;
use crate::spreadsheet::cell::to_error_code;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::value::Value;
use crate::spreadsheet::xls::BOF;
use crate::spreadsheet::xls::BOOL_ERR;
use crate::spreadsheet::xls::BOUND_SHEET8;
use crate::spreadsheet::xls::EOF;
use crate::spreadsheet::xls::LABEL_SST;
use crate::spreadsheet::xls::NUMBER;
use crate::spreadsheet::xls::SST;
use crate::spreadsheet::xls::XF;
use crate::spreadsheet::Format;
use rust_xlsxwriter::Format as XlsxFormat;
use rust_xlsxwriter::Worksheet;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use tracing::trace;

const CODE_PAGE: u16 = 66;
const WINDOW1: u16 = 61;
const FONT: u16 = 49;
const STYLE: u16 = 659;
const DIMENSIONS: u16 = 512;
const WINDOW2: u16 = 574;

pub(crate) const XLS_MAX_ROWS: usize = 65_536;
pub(crate) const XLS_MAX_COLS: usize = 256;
/// Characters (UTF-16 units) in one xls text cell.
pub(crate) const XLS_MAX_STRING: usize = 32_767;

/// Cell XFs written after the 15 mandatory style XFs.
const XF_GENERAL: u16 = 15;
const XF_DATE: u16 = 16;
const XF_DATETIME: u16 = 17;
const XF_TIME: u16 = 18;

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const TIME_FORMAT: &str = "hh:mm:ss";

/// Creates an empty workbook for `path`, the backend follows its extension.
pub fn create_workbook(path: &Path, sheet_name: &str) -> Result<WorkbookWriter, SheetError> {
    let writer = match Format::of(path) {
        Format::Xlsx => WorkbookWriter::Xlsx(XlsxWriter::new(sheet_name)?),
        Format::Xls => WorkbookWriter::Xls(XlsWriter::new(sheet_name)?),
    };
    debug!(path = %path.display(), sheet = sheet_name, "created workbook");
    Ok(writer)
}

/// A workbook being written. The legacy backend replaces whole rows,
/// the zip-based one is filled cell by cell.
pub enum WorkbookWriter {
    Xls(XlsWriter),
    Xlsx(XlsxWriter),
}

impl WorkbookWriter {
    /// Serializes the workbook, creating or truncating `path`.
    pub fn save(self, path: &Path) -> Result<(), SheetError> {
        match self {
            WorkbookWriter::Xls(writer) => writer.save(path),
            WorkbookWriter::Xlsx(writer) => writer.save(path),
        }
    }
}

/// BIFF8 workbook with one worksheet, rows kept in memory until saved.
pub struct XlsWriter {
    sheet_name: String,
    rows: BTreeMap<usize, Vec<Option<Value>>>,
}

impl XlsWriter {
    /// Sheet names follow Excel's rules, checked the same way as for the xlsx backend.
    pub fn new(sheet_name: &str) -> Result<Self, SheetError> {
        Worksheet::new().set_name(sheet_name)?;
        Ok(Self {
            sheet_name: sheet_name.to_owned(),
            rows: BTreeMap::new(),
        })
    }

    /// Replaces the content of row `row` with `values`, starting at column 0.
    pub fn replace_row(&mut self, row: usize, values: Vec<Option<Value>>) -> Result<(), SheetError> {
        if row >= XLS_MAX_ROWS {
            Err(SheetError::XlsLimit { row, col: 0 })?
        }
        if let Some(col) = values.iter().rposition(Option::is_some).filter(|col| *col >= XLS_MAX_COLS) {
            Err(SheetError::XlsLimit { row, col })?
        }
        for (col, value) in values.iter().enumerate() {
            if let Some(Value::String(string)) = value {
                let length = string.encode_utf16().count();
                if length > XLS_MAX_STRING {
                    Err(SheetError::XlsStringLimit {
                        reference: index_to_reference(row, col),
                        length,
                    })?
                }
            }
        }
        trace!(row, cells = values.len(), "replace xls row");
        self.rows.insert(row, values);
        Ok(())
    }

    pub fn save(self, path: &Path) -> Result<(), SheetError> {
        let bytes = CfbWriter::new("Workbook", self.to_stream()).into_bytes();
        debug!(path = %path.display(), rows = self.rows.len(), bytes = bytes.len(), "saving xls workbook");
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Builds the workbook stream: the globals substream followed by the worksheet substream.
    fn to_stream(&self) -> Vec<u8> {
        let mut shared_strings = SharedStrings::default();
        let mut cells = Biff8Writer::default();
        for (row, values) in &self.rows {
            for (col, value) in values.iter().enumerate() {
                if let Some(value) = value {
                    write_cell(&mut cells, &mut shared_strings, *row, col, value);
                }
            }
        }

        let mut writer = Biff8Writer::default();
        let bound_sheet_position = write_globals(&mut writer, &self.sheet_name, &shared_strings);
        let sheet_position = writer.position();
        writer.patch_u32(bound_sheet_position, sheet_position as u32);

        writer.record(BOF, &bof(0x0010));
        writer.record(DIMENSIONS, &self.dimensions());
        writer.buffer.extend_from_slice(&cells.buffer);
        writer.record(WINDOW2, &window2());
        writer.record(EOF, &[]);
        writer.buffer
    }

    fn dimensions(&self) -> Vec<u8> {
        let first_row = self.rows.keys().next().copied().unwrap_or(0);
        let last_row = self.rows.keys().next_back().map(|row| row + 1).unwrap_or(0);
        let last_col = self.rows.values().map(Vec::len).max().unwrap_or(0).min(XLS_MAX_COLS);
        let mut data = Vec::with_capacity(14);
        data.put_u32(first_row as u32);
        data.put_u32(last_row as u32);
        data.put_u16(0);
        data.put_u16(last_col as u16);
        data.put_u16(0);
        data
    }
}

/// Unique strings in first-use order, with the total number of references.
#[derive(Default)]
struct SharedStrings {
    strings: Vec<String>,
    indexes: HashMap<String, usize>,
    total: usize,
}

impl SharedStrings {
    fn index(&mut self, value: &str) -> usize {
        self.total += 1;
        if let Some(index) = self.indexes.get(value) {
            return *index;
        }
        let index = self.strings.len();
        self.strings.push(value.to_owned());
        self.indexes.insert(value.to_owned(), index);
        index
    }
}

fn write_cell(writer: &mut Biff8Writer, shared_strings: &mut SharedStrings, row: usize, col: usize, value: &Value) {
    let mut data = Vec::with_capacity(14);
    data.put_u16(row as u16);
    data.put_u16(col as u16);
    match value {
        Value::String(string) => {
            data.put_u16(XF_GENERAL);
            data.put_u32(shared_strings.index(string) as u32);
            writer.record(LABEL_SST, &data);
        }
        Value::Number(number) => {
            data.put_u16(XF_GENERAL);
            data.put_f64(*number);
            writer.record(NUMBER, &data);
        }
        Value::Boolean(boolean) => {
            data.put_u16(XF_GENERAL);
            data.put_u8(*boolean as u8);
            data.put_u8(0);
            writer.record(BOOL_ERR, &data);
        }
        Value::Error(error) => {
            data.put_u16(XF_GENERAL);
            data.put_u8(to_error_code(error));
            data.put_u8(1);
            writer.record(BOOL_ERR, &data);
        }
        Value::Date(_) => write_serial(writer, data, XF_DATE, value),
        Value::DateTime(_) => write_serial(writer, data, XF_DATETIME, value),
        Value::Time(_) => write_serial(writer, data, XF_TIME, value),
    }
}

/// Dates are plain NUMBER records told apart by the number format of their XF.
fn write_serial(writer: &mut Biff8Writer, mut data: Vec<u8>, xf: u16, value: &Value) {
    data.put_u16(xf);
    data.put_f64(value.to_serial().unwrap_or_default());
    writer.record(NUMBER, &data);
}

fn bof(kind: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(16);
    data.put_u16(0x0600); // BIFF8
    data.put_u16(kind);
    data.put_u16(0x0DBB); // build
    data.put_u16(0x07CC); // year
    data.put_u32(0);
    data.put_u32(0x0006);
    data
}

/// Writes the globals substream and returns where the worksheet offset has to be patched in.
fn write_globals(writer: &mut Biff8Writer, sheet_name: &str, shared_strings: &SharedStrings) -> usize {
    writer.record(BOF, &bof(0x0005));
    writer.record(CODE_PAGE, &1200u16.to_le_bytes());
    writer.record(WINDOW1, &window1());
    for _ in 0..4 {
        writer.record(FONT, &font());
    }
    for _ in 0..15 {
        writer.record(XF, &xf(0, 0xFFF5, 0x00));
    }
    writer.record(XF, &xf(0, 0x0001, 0x00));
    writer.record(XF, &xf(14, 0x0001, 0x04));
    writer.record(XF, &xf(22, 0x0001, 0x04));
    writer.record(XF, &xf(21, 0x0001, 0x04));
    writer.record(STYLE, &[0x00, 0x80, 0x00, 0xFF]);

    let bound_sheet_position = writer.position() + 4;
    let mut bound_sheet = Vec::new();
    bound_sheet.put_u32(0);
    bound_sheet.put_u8(0); // visible
    bound_sheet.put_u8(0); // worksheet
    put_xl_unicode_string(&mut bound_sheet, sheet_name, true);
    writer.record(BOUND_SHEET8, &bound_sheet);

    let mut prefix = Vec::with_capacity(8);
    prefix.put_u32(shared_strings.total as u32);
    prefix.put_u32(shared_strings.strings.len() as u32);
    writer.string_table(SST, &prefix, &shared_strings.strings);
    writer.record(EOF, &[]);
    bound_sheet_position
}

fn window1() -> Vec<u8> {
    let mut data = Vec::with_capacity(18);
    data.put_u16(0); // xWn
    data.put_u16(0); // yWn
    data.put_u16(0x4000); // dxWn
    data.put_u16(0x2000); // dyWn
    data.put_u16(0x0038); // show scroll bars and tabs
    data.put_u16(0); // itabCur
    data.put_u16(0); // itabFirst
    data.put_u16(1); // ctabSel
    data.put_u16(0x0258); // wTabRatio
    data
}

fn window2() -> Vec<u8> {
    let mut data = Vec::with_capacity(18);
    data.put_u16(0x06B6);
    data.put_u16(0); // rwTop
    data.put_u16(0); // colLeft
    data.put_u32(0x40); // icvHdr
    data.put_u16(0); // wScaleSLV
    data.put_u16(0); // wScaleNormal
    data.put_u32(0);
    data
}

fn font() -> Vec<u8> {
    let mut data = Vec::with_capacity(20);
    data.put_u16(200); // 10pt
    data.put_u16(0);
    data.put_u16(0x7FFF); // automatic color
    data.put_u16(400); // normal weight
    data.put_u16(0);
    data.put_u8(0);
    data.put_u8(0);
    data.put_u8(0);
    data.put_u8(0);
    put_xl_unicode_string(&mut data, "Arial", true);
    data
}

fn xf(format: u16, flags: u16, used: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(20);
    data.put_u16(0); // font
    data.put_u16(format);
    data.put_u16(flags);
    data.put_u8(0x20); // bottom aligned
    data.put_u8(0);
    data.put_u8(0);
    data.put_u8(used);
    data.put_u32(0);
    data.put_u32(0);
    data.put_u16(0x20C0);
    data
}

/// SpreadsheetML workbook with one worksheet, backed by `rust_xlsxwriter`.
pub struct XlsxWriter {
    worksheet: Worksheet,
    date: XlsxFormat,
    datetime: XlsxFormat,
    time: XlsxFormat,
    cells: usize,
}

impl XlsxWriter {
    pub fn new(sheet_name: &str) -> Result<Self, SheetError> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(sheet_name)?;
        Ok(Self {
            worksheet,
            date: XlsxFormat::new().set_num_format(DATE_FORMAT),
            datetime: XlsxFormat::new().set_num_format(DATETIME_FORMAT),
            time: XlsxFormat::new().set_num_format(TIME_FORMAT),
            cells: 0,
        })
    }

    /// Writes a single cell; `None` leaves the cell absent.
    pub fn set_cell(&mut self, row: usize, col: usize, value: Option<&Value>) -> Result<(), SheetError> {
        let Some(value) = value else {
            return Ok(());
        };
        let row = u32::try_from(row).unwrap_or(u32::MAX);
        let col = u16::try_from(col).unwrap_or(u16::MAX);
        match value {
            Value::String(string) => self.worksheet.write_string(row, col, string)?,
            Value::Number(number) => self.worksheet.write_number(row, col, *number)?,
            Value::Boolean(boolean) => self.worksheet.write_boolean(row, col, *boolean)?,
            Value::Error(error) => self.worksheet.write_string(row, col, error)?,
            Value::Date(_) => self.worksheet.write_number_with_format(row, col, value.to_serial().unwrap_or_default(), &self.date)?,
            Value::DateTime(_) => self.worksheet.write_number_with_format(row, col, value.to_serial().unwrap_or_default(), &self.datetime)?,
            Value::Time(_) => self.worksheet.write_number_with_format(row, col, value.to_serial().unwrap_or_default(), &self.time)?,
        };
        self.cells += 1;
        Ok(())
    }

    pub fn save(self, path: &Path) -> Result<(), SheetError> {
        debug!(path = %path.display(), cells = self.cells, "saving xlsx workbook");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        workbook.push_worksheet(self.worksheet);
        workbook.save(path)?;
        Ok(())
    }
}
