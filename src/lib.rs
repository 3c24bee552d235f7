//! # Sheet Loader
//!
//! Converts between spreadsheet files and in-memory records.
//!
//! ## Features
//!
//! - **Two formats**: legacy `.xls` (BIFF8 inside an OLE compound file) and `.xlsx` (SpreadsheetML),
//!   selected by file extension
//! - **Header-keyed records**: row 0 names the columns, every following row becomes a [`Record`]
//!   until the first fully blank row
//! - **Lazy decoding**: [`decode_rows`] yields records one at a time, [`to_array`] collects them
//! - **Writing**: [`encode`] writes a list of records or a list of rows into a new single-sheet workbook
//! - **Typed values**: strings, numbers, booleans, dates, date-times, times and error literals
//!
//! ```no_run
//! use sheet_loader::{encode, to_array, Entry, SheetError};
//! use std::path::Path;
//!
//! fn copy_people() -> Result<(), SheetError> {
//!     let records = to_array("people.xlsx", 0)?;
//!     let entries: Vec<Entry> = records.into_iter().map(Entry::from).collect();
//!     encode(&entries, None, Some(Path::new("people.xls")))?;
//!     Ok(())
//! }
//! ```

mod error;
pub(crate) mod helpers;
pub mod spreadsheet;
pub mod table;

pub use crate::error::SheetError;
pub use crate::error::INVALID_INPUT_SHAPE;
pub use crate::spreadsheet::cell::Cell;
pub use crate::spreadsheet::open;
pub use crate::spreadsheet::sheet::cells_of;
pub use crate::spreadsheet::sheet::Row;
pub use crate::spreadsheet::sheet::Sheet;
pub use crate::spreadsheet::value::Value;
pub use crate::spreadsheet::writer::create_workbook;
pub use crate::spreadsheet::writer::WorkbookWriter;
pub use crate::spreadsheet::Format;
pub use crate::spreadsheet::Spreadsheet;
pub use crate::table::decode_rows;
pub use crate::table::encode;
pub use crate::table::headers;
pub use crate::table::naming::NameGenerator;
pub use crate::table::naming::RandomNames;
pub use crate::table::record::Entry;
pub use crate::table::record::Key;
pub use crate::table::record::Record;
pub use crate::table::records_to_rows;
pub use crate::table::to_array;
pub use crate::table::Encoder;
pub use crate::table::Records;
