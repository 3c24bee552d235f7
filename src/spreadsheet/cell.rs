use crate::error::SheetError;
use crate::spreadsheet::value::from_serial;
use crate::spreadsheet::value::Value;
use chrono::NaiveDate;
use chrono::NaiveDateTime;

/// How the raw text of a cell has to be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as `1`/`0`
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Plain string values
    String,
    /// Error literals such as `#DIV/0!`
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Analyzes format codes for date/time patterns.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_color && !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    /// Converts the raw text of a cell into a typed value.
    /// Returns `None` for empty cells.
    pub(crate) fn to_value(self, raw: &str) -> Result<Option<Value>, SheetError> {
        let value = match self {
            CellType::Empty => return Ok(None),
            CellType::Boolean => Value::Boolean(raw == "1" || raw.eq_ignore_ascii_case("true")),
            CellType::Number => match raw.trim().parse() {
                Ok(number) => Value::Number(number),
                // cached formula results may be text without a `t="str"` marker
                Err(_) => Value::String(raw.to_owned()),
            },
            CellType::NumberDateTime1900 => serial_to_value(raw, false, Value::DateTime)?,
            CellType::NumberDateTime1904 => serial_to_value(raw, true, Value::DateTime)?,
            CellType::NumberDate1900 => serial_to_value(raw, false, |datetime| Value::Date(datetime.date()))?,
            CellType::NumberDate1904 => serial_to_value(raw, true, |datetime| Value::Date(datetime.date()))?,
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                serial_to_value(raw, false, |datetime| Value::Time(datetime.time()))?
            }
            CellType::IsoDateTime => parse_iso_datetime(raw),
            CellType::String => Value::String(raw.to_owned()),
            CellType::Error => Value::Error(raw.to_owned()),
        };
        Ok(Some(value))
    }
}

/// Date-formatted numbers outside the representable range stay numbers.
fn serial_to_value(raw: &str, is_1904: bool, to_value: fn(NaiveDateTime) -> Value) -> Result<Value, SheetError> {
    let serial: f64 = raw.trim().parse()?;
    Ok(from_serial(serial, is_1904).map(to_value).unwrap_or(Value::Number(serial)))
}

/// ISO dates written by `t="d"` cells. Unparseable text is kept as a string.
fn parse_iso_datetime(raw: &str) -> Value {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Value::DateTime(datetime)
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Value::Date(date)
    } else {
        Value::String(raw.to_owned())
    }
}

/// Converts Excel error codes to human-readable error strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Inverse of [`to_error_value`], unknown literals map to `#VALUE!`.
pub(crate) fn to_error_code(value: &str) -> u8 {
    match value {
        "#NULL!" => 0x00,
        "#DIV/0!" => 0x07,
        "#REF!" => 0x17,
        "#NAME?" => 0x1D,
        "#NUM!" => 0x24,
        "#N/A" => 0x2A,
        "#GETTING_DATA" => 0x2B,
        _ => 0x0F,
    }
}

/// A single non-empty cell of a worksheet.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
    /// Decoded value; formula cells carry their cached result
    pub value: Value,
}

impl Cell {
    /// Builds a cell from its raw text, dropping empty ones.
    pub(crate) fn parse(row: usize, col: usize, kind: CellType, raw: &str) -> Result<Option<Cell>, SheetError> {
        Ok(kind.to_value(raw)?.map(|value| Cell { row, col, value }))
    }
}
