use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Timelike;
use std::fmt::Display;

const MILLISECONDS_PER_DAY: f64 = 86_400_000f64;

/// A decoded cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Spreadsheet error literal such as `#DIV/0!`
    Error(String),
}

impl Value {
    /// True for values whose string form is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::String(value) | Value::Error(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    /// Serial number of a date, time or date-time in the 1900 date system.
    pub(crate) fn to_serial(&self) -> Option<f64> {
        match self {
            Value::Date(date) => Some(to_serial(date.and_time(NaiveTime::MIN))),
            Value::DateTime(datetime) => Some(to_serial(*datetime)),
            Value::Time(time) => {
                let milliseconds = time.num_seconds_from_midnight() as f64 * 1_000f64
                    + (time.nanosecond() / 1_000_000) as f64;
                Some(milliseconds / MILLISECONDS_PER_DAY)
            }
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(value) | Value::Error(value) => write!(f, "{value}"),
            Value::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => write!(f, "{}", *value as i64),
            Value::Number(value) => write!(f, "{value}"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            Value::Time(value) => write!(f, "{}", value.format("%H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Time(value)
    }
}

/// Day zero of both date systems, serial `1` of the 1900 system is 1900-01-01.
fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .expect("NaiveDate Literal")
        .and_time(NaiveTime::MIN)
}

/// Converts an Excel serial number to a date-time, rounded to milliseconds.
/// Handles the Lotus 1-2-3 leap year bug for the 1900 epoch.
/// Returns `None` when the serial lies outside the representable date range.
pub(crate) fn from_serial(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let milliseconds = (serial * MILLISECONDS_PER_DAY).round() as i64;
    let days = milliseconds.div_euclid(86_400_000);
    let offset = if is_1904 {
        1_462
    } else if days < 60 {
        1
    } else {
        0
    };
    epoch()
        .checked_add_signed(Duration::try_days(days.checked_add(offset)?)?)?
        .checked_add_signed(Duration::milliseconds(milliseconds.rem_euclid(86_400_000)))
}

/// Inverse of [`from_serial`] for the 1900 date system.
fn to_serial(datetime: NaiveDateTime) -> f64 {
    let elapsed = datetime - epoch();
    let days = elapsed.num_days();
    let milliseconds = (elapsed - Duration::days(days)).num_milliseconds();
    let days = if days <= 60 { days - 1 } else { days };
    days as f64 + milliseconds as f64 / MILLISECONDS_PER_DAY
}
