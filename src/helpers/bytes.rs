//! Little-endian conversions between byte slices and integers.
//! Shared by the compound file and BIFF8 codecs, in both directions.

/// Splits a byte slice into little-endian 32-bit sector ids.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = usize> + '_ {
    bytes.chunks_exact(4).map(to_usize)
}

#[inline]
pub(crate) fn to_f64(s: &[u8]) -> f64 {
    f64::from_le_bytes(s[..8].try_into().expect("f64"))
}

#[inline]
pub(crate) fn to_u64(s: &[u8]) -> u64 {
    u64::from_le_bytes(s[..8].try_into().expect("u64"))
}

#[inline]
pub(crate) fn to_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes(s[..4].try_into().expect("u32"))
}

#[inline]
pub(crate) fn to_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes(s[..2].try_into().expect("u16"))
}

/// Reads a 32-bit value as usize. Sector ids and record offsets never exceed u32.
#[inline]
pub(crate) fn to_usize(s: &[u8]) -> usize {
    to_u32(s) as usize
}

/// Append-only little-endian byte sink used when serializing records and sectors.
pub(crate) trait PutLe {
    fn put_u8(&mut self, value: u8);
    fn put_u16(&mut self, value: u16);
    fn put_u32(&mut self, value: u32);
    fn put_u64(&mut self, value: u64);
    fn put_f64(&mut self, value: f64);
}

impl PutLe for Vec<u8> {
    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn put_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_f64(&mut self, value: f64) {
        self.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_read_little_endian() {
        let mut bytes = Vec::new();
        bytes.put_u16(0x0809);
        bytes.put_u32(0xE011_CFD0);
        bytes.put_f64(2.5);

        assert_eq!(&bytes[..2], &[0x09, 0x08]);
        assert_eq!(to_u16(&bytes[..2]), 0x0809);
        assert_eq!(to_u32(&bytes[2..6]), 0xE011_CFD0);
        assert_eq!(to_f64(&bytes[6..14]), 2.5);
    }

    #[test]
    fn sector_ids_from_bytes() {
        let bytes = [1, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF];
        let ids: Vec<usize> = to_usize_iter(&bytes).collect();
        assert_eq!(ids, vec![1, 0xFFFF_FFFE]);
    }
}
