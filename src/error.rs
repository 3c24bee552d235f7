use thiserror::Error;

/// Fixed message reported when `encode` receives anything but uniform records or uniform rows.
pub const INVALID_INPUT_SHAPE: &str = "first parameter must be a list of records or a list of rows";

/// Main error type of the loader.
/// Aggregates errors from the standard library, dependencies and the format codecs.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("File '{0}' not found")]
    FileNotFound(String),

    #[error("Cannot detect spreadsheet format of '{0}'")]
    UnsupportedFormat(String),

    #[error("Spreadsheet '{0}' is corrupted: {1}")]
    CorruptFile(String, String),

    #[error("Spreadsheet '{0}' is password protected")]
    PasswordProtected(String),

    #[error("Worksheet index {index} out of range, '{name}' has {count} worksheet(s)")]
    IndexOutOfRange {
        name: String,
        index: usize,
        count: usize,
    },

    #[error("{}", INVALID_INPUT_SHAPE)]
    InvalidInputShape,

    #[error("Cell ({row}, {col}) exceeds the xls limit of 65536 rows and 256 columns")]
    XlsLimit { row: usize, col: usize },

    #[error("Text in cell {reference} has {length} characters, the xls limit is 32767")]
    XlsStringLimit { reference: String, length: usize },

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XlsxWriterError(#[from] rust_xlsxwriter::XlsxError),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}
