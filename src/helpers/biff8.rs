//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader and writer for the Excel 97-2003 workbook stream (.xls files)

use crate::error::SheetError;
use crate::helpers::bytes::to_f64;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::PutLe;
use thiserror::Error;

pub(crate) const CONTINUE: u16 = 60;

/// Largest record payload Excel accepts; longer payloads spill into CONTINUE records.
pub(crate) const MAX_RECORD_DATA: usize = 8224;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),
}

/// Reader over a BIFF8 workbook stream.
/// A record and its CONTINUE records are read as one logical record split in chunks.
pub(crate) struct Biff8Reader {
    buffer: Vec<u8>,
    pointer: usize, // Next record header in buffer
    chunks: Vec<(usize, usize)>, // Current record chunks (start, end)
    index: usize,  // Current chunk index
    offset: usize, // Offset within current chunk
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, `None` at the end of the stream
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SheetError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        self.push_chunk()?;
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            self.push_chunk()?;
        }
        Ok(Some(kind))
    }

    fn push_chunk(&mut self) -> Result<(), SheetError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = (lower + size).min(self.buffer.len());
        self.pointer = lower + size;
        self.chunks.push((lower, upper));
        Ok(())
    }

    /// Sets the reader pointer to the record header at `pointer`
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    fn read_exact(&mut self, length: usize) -> Result<&[u8], SheetError> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Reads up to `length` bytes without crossing the current chunk
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            let source = upper.min(lower + self.offset);
            let target = upper.min(source + length);
            let size = target - source;
            if source < upper {
                if target == upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += size;
                }
                return (&self.buffer[source..target], size);
            }
        }
        (&[], 0)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SheetError> {
        let mut remaining = length;
        while remaining > 0 {
            let (_, size) = self.read(remaining);
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(remaining))?
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SheetError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, SheetError> {
        self.read_exact(2).map(to_u16)
    }

    /// Gets a 16-bit value `offset` bytes before the end of the current record
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, SheetError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return self.get_u16_at(*upper - offset);
            }
            offset -= *upper - *lower;
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, SheetError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::NoEnoughDataError(2))?
        }
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, SheetError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, SheetError> {
        self.read_exact(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, SheetError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, SheetError> {
        self.read_exact(8).map(to_f64)
    }

    /// Reads an RK number, the compressed numeric form used by RK and MULRK records.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, SheetError> {
        let value = self.read_u32()?;
        let is_percentage = (value & 0x01) != 0;
        let is_integer = (value & 0x02) != 0;

        let number = if is_integer {
            ((value as i32) >> 2) as f64
        } else {
            f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
        };
        Ok(if is_percentage { number / 100.0 } else { number })
    }

    /// Reads a string with a 1-byte character count
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, SheetError> {
        let chars = self.read_u8()? as usize;
        self.read_string(chars, false)
    }

    /// Reads a string with a 2-byte character count
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, SheetError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, false)
    }

    /// Reads a shared string table entry, skipping rich text runs and phonetic data.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, SheetError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, true)
    }

    /// Reads `chars` characters. When the characters continue in the next chunk,
    /// that chunk starts with a fresh option flag byte.
    fn read_string(&mut self, chars: usize, is_extend: bool) -> Result<String, SheetError> {
        let flag = self.read_u8()?;
        let rich_string_count = if is_extend && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_count = if is_extend && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };

        let mut units: Vec<u16> = Vec::with_capacity(chars);
        let mut is_high_byte = (flag & 0x1) > 0;
        loop {
            let expected = if is_high_byte { (chars - units.len()) << 1 } else { chars - units.len() };
            let (bytes, _) = self.read(expected);
            if is_high_byte {
                units.extend(bytes.chunks_exact(2).map(to_u16));
            } else {
                units.extend(bytes.iter().map(|byte| *byte as u16));
            }
            if units.len() >= chars {
                break;
            }
            is_high_byte = (self.read_u8()? & 0x1) > 0;
        }

        self.skip(4 * rich_string_count)?;
        self.skip(phonetic_count)?;
        Ok(String::from_utf16_lossy(&units))
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

/// Serializes BIFF8 records into a workbook stream.
#[derive(Default)]
pub(crate) struct Biff8Writer {
    pub(crate) buffer: Vec<u8>,
}

impl Biff8Writer {
    pub(crate) fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Appends one record; `data` must fit in a single record.
    pub(crate) fn record(&mut self, kind: u16, data: &[u8]) {
        debug_assert!(data.len() <= MAX_RECORD_DATA);
        self.buffer.put_u16(kind);
        self.buffer.put_u16(data.len() as u16);
        self.buffer.extend_from_slice(data);
    }

    /// Overwrites a 32-bit value at an absolute stream position.
    pub(crate) fn patch_u32(&mut self, position: usize, value: u32) {
        self.buffer[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a record whose payload is a prefix followed by a list of strings,
    /// spilling into CONTINUE records. A string header never straddles two records;
    /// character data that does is resumed behind a new option flag byte.
    pub(crate) fn string_table(&mut self, kind: u16, prefix: &[u8], strings: &[String]) {
        let mut finished: Vec<Vec<u8>> = Vec::new();
        let mut current = prefix.to_vec();
        for string in strings {
            let units: Vec<u16> = string.encode_utf16().collect();
            let is_high_byte = units.iter().any(|unit| *unit > 0xFF);
            let unit_size = if is_high_byte { 2 } else { 1 };
            let flag = if is_high_byte { 0x01 } else { 0x00 };

            // cch + flag + at least one character
            if MAX_RECORD_DATA - current.len() < 3 + unit_size {
                finished.push(std::mem::take(&mut current));
            }
            current.put_u16(units.len() as u16);
            current.put_u8(flag);

            let mut written = 0usize;
            loop {
                let room = (MAX_RECORD_DATA - current.len()) / unit_size;
                let mut take = room.min(units.len() - written);
                // keep surrogate pairs together
                if written + take < units.len() && take > 1 && (0xD800..0xDC00).contains(&units[written + take - 1]) {
                    take -= 1;
                }
                put_units(&mut current, &units[written..written + take], is_high_byte);
                written += take;
                if written == units.len() {
                    break;
                }
                finished.push(std::mem::replace(&mut current, vec![flag]));
            }
        }
        finished.push(current);

        let mut records = finished.into_iter();
        if let Some(first) = records.next() {
            self.record(kind, &first);
        }
        for record in records {
            self.record(CONTINUE, &record);
        }
    }
}

fn put_units(record: &mut Vec<u8>, units: &[u16], is_high_byte: bool) {
    for unit in units {
        if is_high_byte {
            record.put_u16(*unit);
        } else {
            record.put_u8(*unit as u8);
        }
    }
}

/// Encodes a BIFF8 XLUnicodeString (2-byte count) or ShortXLUnicodeString (1-byte count).
pub(crate) fn put_xl_unicode_string(bytes: &mut Vec<u8>, value: &str, is_short: bool) {
    let units: Vec<u16> = value.encode_utf16().collect();
    let is_high_byte = units.iter().any(|unit| *unit > 0xFF);
    if is_short {
        bytes.put_u8(units.len() as u8);
    } else {
        bytes.put_u16(units.len() as u16);
    }
    bytes.put_u8(if is_high_byte { 0x01 } else { 0x00 });
    put_units(bytes, &units, is_high_byte);
}
