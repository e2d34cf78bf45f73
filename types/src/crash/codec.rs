//! Seeds travel as a one-byte length followed by their UTF-8 bytes.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, ReadExt, Write};

use super::MAX_SEED_LENGTH;

/// Write a seed. Seeds longer than [MAX_SEED_LENGTH] are rejected on read, so
/// only validated seeds should be written.
pub fn write_seed(seed: &str, writer: &mut impl BufMut) {
    let len = u8::try_from(seed.len()).unwrap_or(u8::MAX);
    len.write(writer);
    writer.put_slice(&seed.as_bytes()[..len as usize]);
}

pub fn read_seed(reader: &mut impl Buf) -> Result<String, Error> {
    let len = u8::read(reader)? as usize;
    if len > MAX_SEED_LENGTH {
        return Err(Error::Invalid("Seed", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let bytes = reader.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::Invalid("Seed", "not UTF-8"))
}

pub fn seed_encode_size(seed: &str) -> usize {
    u8::SIZE + seed.len().min(u8::MAX as usize)
}
