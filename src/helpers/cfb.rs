//! OLE Compound File Binary (CFB) container used by legacy Excel (.xls) workbooks.
//! `Cfb` loads a whole container and hands out named streams;
//! `CfbWriter` packs a single stream into a version 3 container.

use crate::error::SheetError;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use crate::helpers::bytes::PutLe;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
const SECTOR_SIZE: usize = 512;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const HEADER_DIFAT_ENTRIES: usize = 109;

const MAX_REG_SECT: usize = 0xFFFF_FFFB;
const DIF_SECT: u32 = 0xFFFF_FFFC;
const FAT_SECT: u32 = 0xFFFF_FFFD;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FREE_SECT: u32 = 0xFFFF_FFFF;
const NO_STREAM: u32 = 0xFFFF_FFFF;

const ROOT_ENTRY: &str = "Root Entry";

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Sector chain points outside the file at sector '{0}'")]
    SectorChainError(usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// A compound file loaded fully into memory.
pub(crate) struct Cfb {
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Reads the container and indexes its directory.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, SheetError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::OleSignatureError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;

        let header = Header::new(&data[..HEADER_SIZE])?;
        let sectors = Sectors { data, size: header.sector_size()?, skip: 1 };
        let file_allocation_table = Self::load_file_allocation_table(&sectors, &header)?;
        let directories = Self::load_directories(&file_allocation_table, &sectors, header.directory_shift)?;
        let mini_file_allocation_table = if header.mini_file_allocation_table_sector_count > 0 {
            let bytes = Self::read_chain(&file_allocation_table, &sectors, header.mini_file_allocation_table_sector_shift)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        };
        let mini_sectors = match directories.get(ROOT_ENTRY) {
            Some(root) => {
                let mut data = Self::read_chain(&file_allocation_table, &sectors, root.index)?;
                data.truncate(root.count);
                Sectors { data, size: MINI_SECTOR_SIZE, skip: 0 }
            }
            None => Sectors { data: Vec::new(), size: MINI_SECTOR_SIZE, skip: 0 },
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors,
        })
    }

    /// Checks if a stream exists in the container
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reads a named stream, `None` when the container has no such entry.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SheetError> {
        let Some(directory) = self.directories.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.count < MINI_STREAM_CUTOFF {
            Self::read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
        } else {
            Self::read_chain(&self.file_allocation_table, &self.sectors, directory.index)?
        };
        bytes.truncate(directory.count);
        Ok(Some(bytes))
    }

    fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, SheetError> {
        let mut difat: Vec<usize> = to_usize_iter(&sectors.data[76..HEADER_SIZE]).collect();

        let mut count = 0usize;
        let mut index = header.double_indirect_file_allocation_table_shift;
        while index < MAX_REG_SECT {
            difat.extend(to_usize_iter(sectors.get(index)?));
            index = difat.pop().ok_or(CfbError::FileFormatError)?;
            count += 1;
        }
        if count != header.double_indirect_file_allocation_table_count {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
        }

        let mut file_allocation_table = Vec::new();
        let mut count = 0usize;
        for index in difat.into_iter().filter(|index| *index < MAX_REG_SECT) {
            file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
            count += 1;
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
        }
        Ok(file_allocation_table)
    }

    fn load_directories(file_allocation_table: &[usize], sectors: &Sectors, index: usize) -> Result<HashMap<String, Directory>, SheetError> {
        let bytes = Self::read_chain(file_allocation_table, sectors, index)?;
        let directories: HashMap<String, Directory> = bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .map(Directory::new)
            .filter(|(name, _)| !name.is_empty())
            .collect();
        if directories.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(directories)
    }

    /// Follows an allocation chain and concatenates its sectors.
    fn read_chain(file_allocation_table: &[usize], sectors: &Sectors, index: usize) -> Result<Vec<u8>, SheetError> {
        let mut content = Vec::new();
        let mut index = index;
        let mut visited = 0usize;
        while index < MAX_REG_SECT {
            content.extend_from_slice(sectors.get(index)?);
            index = *file_allocation_table.get(index).ok_or(CfbError::SectorChainError(index))?;
            visited += 1;
            if visited > file_allocation_table.len() {
                Err(CfbError::FileFormatError)?
            }
        }
        Ok(content)
    }
}

/// Sector view over a byte buffer. Regular sectors skip the header slot.
struct Sectors {
    data: Vec<u8>,
    size: usize,
    skip: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Result<&[u8], SheetError> {
        let source = (index + self.skip) * self.size;
        let target = self.data.len().min(source + self.size);
        if source < target {
            Ok(&self.data[source..target])
        } else {
            Err(CfbError::SectorChainError(index))?
        }
    }
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, SheetError> {
        if to_u64(&data[0..8]) != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_shift: to_usize(&data[48..52]),
            mini_file_allocation_table_sector_shift: to_usize(&data[60..64]),
            mini_file_allocation_table_sector_count: to_usize(&data[64..68]),
            double_indirect_file_allocation_table_shift: to_usize(&data[68..72]),
            double_indirect_file_allocation_table_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, SheetError> {
        match (self.major_version, self.sector_shift) {
            (3, 0x0009) => Ok(512),
            // Version 4 pads the header to a full 4096-byte sector with zeroes
            (4, 0x000C) => Ok(4096),
            (major, shift) => Err(CfbError::SectorSizeError(major, shift))?,
        }
    }
}

struct Directory {
    index: usize,
    count: usize,
}

impl Directory {
    fn new(bytes: &[u8]) -> (String, Directory) {
        let size = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..size]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.into_owned(),
        };
        let index = to_usize(&bytes[116..120]);
        let count = to_u64(&bytes[120..128]) as usize;
        (name, Directory { index, count })
    }
}

/// Packs one stream into a version 3 compound file with 512-byte sectors.
///
/// The stream is padded to the mini stream cutoff so it always lives in regular sectors,
/// which keeps the container free of a mini FAT.
pub(crate) struct CfbWriter {
    name: String,
    stream: Vec<u8>,
}

impl CfbWriter {
    pub(crate) fn new(name: &str, stream: Vec<u8>) -> CfbWriter {
        CfbWriter { name: name.to_owned(), stream }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        let mut stream = self.stream;
        if stream.len() < MINI_STREAM_CUTOFF {
            stream.resize(MINI_STREAM_CUTOFF, 0);
        }
        let stream_size = stream.len();
        stream.resize(stream_size.div_ceil(SECTOR_SIZE) * SECTOR_SIZE, 0);

        let stream_sectors = stream.len() / SECTOR_SIZE;
        let directory_sector = stream_sectors;
        let (fat_sectors, difat_sectors) = Self::allocation_sizes(stream_sectors + 1);
        let first_fat_sector = directory_sector + 1;
        let first_difat_sector = first_fat_sector + fat_sectors;
        let total_sectors = first_difat_sector + difat_sectors;

        let mut fat = vec![FREE_SECT; fat_sectors * SECTOR_SIZE / 4];
        for index in 0..stream_sectors {
            fat[index] = if index + 1 < stream_sectors { (index + 1) as u32 } else { END_OF_CHAIN };
        }
        fat[directory_sector] = END_OF_CHAIN;
        for slot in &mut fat[first_fat_sector..first_difat_sector] {
            *slot = FAT_SECT;
        }
        for slot in &mut fat[first_difat_sector..total_sectors] {
            *slot = DIF_SECT;
        }
        let fat_ids: Vec<u32> = (first_fat_sector..first_difat_sector).map(|index| index as u32).collect();

        let mut bytes = Vec::with_capacity(HEADER_SIZE + total_sectors * SECTOR_SIZE);
        Self::write_header(&mut bytes, &fat_ids, directory_sector, first_difat_sector, difat_sectors);
        bytes.extend_from_slice(&stream);
        Self::write_directory(&mut bytes, &self.name, stream_size);
        for id in &fat {
            bytes.put_u32(*id);
        }
        Self::write_difat(&mut bytes, &fat_ids, first_difat_sector, difat_sectors);
        bytes
    }

    /// Grows FAT and DIFAT sector counts until they can describe every sector, themselves included.
    fn allocation_sizes(data_sectors: usize) -> (usize, usize) {
        let entries_per_sector = SECTOR_SIZE / 4;
        let mut fat_sectors = 1usize;
        let mut difat_sectors = 0usize;
        loop {
            let total = data_sectors + fat_sectors + difat_sectors;
            let needed_fat = total.div_ceil(entries_per_sector);
            let needed_difat = needed_fat
                .saturating_sub(HEADER_DIFAT_ENTRIES)
                .div_ceil(entries_per_sector - 1);
            if needed_fat == fat_sectors && needed_difat == difat_sectors {
                return (fat_sectors, difat_sectors);
            }
            fat_sectors = needed_fat;
            difat_sectors = needed_difat;
        }
    }

    fn write_header(bytes: &mut Vec<u8>, fat_ids: &[u32], directory_sector: usize, first_difat_sector: usize, difat_sectors: usize) {
        bytes.put_u64(SIGNATURE);
        bytes.extend_from_slice(&[0u8; 16]); // CLSID
        bytes.put_u16(0x003E); // minor version
        bytes.put_u16(0x0003); // major version
        bytes.put_u16(0xFFFE); // byte order
        bytes.put_u16(0x0009); // sector shift
        bytes.put_u16(0x0006); // mini sector shift
        bytes.extend_from_slice(&[0u8; 6]);
        bytes.put_u32(0); // directory sectors, always 0 for version 3
        bytes.put_u32(fat_ids.len() as u32);
        bytes.put_u32(directory_sector as u32);
        bytes.put_u32(0); // transaction signature
        bytes.put_u32(MINI_STREAM_CUTOFF as u32);
        bytes.put_u32(END_OF_CHAIN); // first mini FAT sector
        bytes.put_u32(0);
        bytes.put_u32(if difat_sectors > 0 { first_difat_sector as u32 } else { END_OF_CHAIN });
        bytes.put_u32(difat_sectors as u32);
        for index in 0..HEADER_DIFAT_ENTRIES {
            bytes.put_u32(fat_ids.get(index).copied().unwrap_or(FREE_SECT));
        }
    }

    fn write_directory(bytes: &mut Vec<u8>, name: &str, stream_size: usize) {
        Self::write_directory_entry(bytes, ROOT_ENTRY, 5, 1, END_OF_CHAIN, 0);
        Self::write_directory_entry(bytes, name, 2, NO_STREAM, 0, stream_size);
        for _ in 2..SECTOR_SIZE / DIRECTORY_ENTRY_SIZE {
            Self::write_directory_entry(bytes, "", 0, NO_STREAM, 0, 0);
        }
    }

    fn write_directory_entry(bytes: &mut Vec<u8>, name: &str, kind: u8, child: u32, start: u32, size: usize) {
        let mut encoded: Vec<u16> = name.encode_utf16().take(31).collect();
        let name_size = if encoded.is_empty() { 0 } else { (encoded.len() + 1) * 2 };
        encoded.resize(32, 0);
        for unit in encoded {
            bytes.put_u16(unit);
        }
        bytes.put_u16(name_size as u16);
        bytes.put_u8(kind);
        bytes.put_u8(if kind == 0 { 0 } else { 1 }); // black node
        bytes.put_u32(NO_STREAM); // left sibling
        bytes.put_u32(NO_STREAM); // right sibling
        bytes.put_u32(child);
        bytes.extend_from_slice(&[0u8; 16]); // CLSID
        bytes.put_u32(0); // state bits
        bytes.put_u64(0); // creation time
        bytes.put_u64(0); // modification time
        bytes.put_u32(start);
        bytes.put_u64(size as u64);
    }

    fn write_difat(bytes: &mut Vec<u8>, fat_ids: &[u32], first_difat_sector: usize, difat_sectors: usize) {
        let per_sector = SECTOR_SIZE / 4 - 1;
        let mut remaining = fat_ids.iter().skip(HEADER_DIFAT_ENTRIES);
        for sector in 0..difat_sectors {
            for _ in 0..per_sector {
                bytes.put_u32(remaining.next().copied().unwrap_or(FREE_SECT));
            }
            let next = if sector + 1 < difat_sectors { (first_difat_sector + sector + 1) as u32 } else { END_OF_CHAIN };
            bytes.put_u32(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pack(stream: Vec<u8>) -> Cfb {
        let bytes = CfbWriter::new("Workbook", stream).into_bytes();
        Cfb::new(&mut Cursor::new(bytes)).expect("valid container")
    }

    #[test]
    fn small_stream_is_padded_and_readable() {
        let cfb = pack(b"hello".to_vec());
        assert!(cfb.exists("Workbook"));
        assert!(cfb.exists(ROOT_ENTRY));

        let stream = cfb.read("Workbook").unwrap().unwrap();
        assert_eq!(stream.len(), MINI_STREAM_CUTOFF);
        assert_eq!(&stream[..5], b"hello");
        assert!(cfb.read("Book").unwrap().is_none());
    }

    #[test]
    fn multi_sector_stream_keeps_content() {
        let stream: Vec<u8> = (0..20_000u32).map(|value| (value % 251) as u8).collect();
        let cfb = pack(stream.clone());
        assert_eq!(cfb.read("Workbook").unwrap().unwrap(), stream);
    }

    #[test]
    fn large_stream_needs_difat_sectors() {
        let (fat, difat) = CfbWriter::allocation_sizes(20_000);
        assert!(fat > HEADER_DIFAT_ENTRIES);
        assert!(difat >= 1);

        let stream: Vec<u8> = (0..8_000_000u32).map(|value| (value % 13) as u8).collect();
        let cfb = pack(stream.clone());
        assert_eq!(cfb.read("Workbook").unwrap().unwrap(), stream);
    }

    #[test]
    fn rejects_non_ole_content() {
        let bytes = vec![0u8; 1024];
        let result = Cfb::new(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(SheetError::CfbHelperError(CfbError::OleSignatureError))));

        let result = Cfb::new(&mut Cursor::new(b"PK\x03\x04".to_vec()));
        assert!(matches!(result, Err(SheetError::CfbHelperError(CfbError::OleSignatureError))));
    }
}
