use std::io::{self, ErrorKind, Read};

use byteorder::ReadBytesExt;

/// Reads a 7-bit encoded integer, least significant group first, as written by
/// `BinaryWriter.Write7BitEncodedInt`.
pub fn read_7bit_int<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = reader.read_u8()?;
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(io::Error::new(
        ErrorKind::InvalidData,
        "7-bit encoded integer is longer than 5 bytes",
    ))
}

/// Reads `len` bytes into a fresh buffer, refusing lengths the input cannot hold.
pub fn read_bytes<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.take(len as u64).read_to_end(&mut buffer)?;
    if buffer.len() != len {
        return Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, got {}", buffer.len()),
        ));
    }
    Ok(buffer)
}

fn read_prefixed_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_7bit_int(reader)?;
    let len = usize::try_from(len).map_err(|_| {
        io::Error::new(ErrorKind::InvalidData, format!("negative string length {len}"))
    })?;
    read_bytes(reader, len)
}

/// Reads a length-prefixed UTF-8 string (`BinaryReader.ReadString`).
pub fn read_prefixed_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let bytes = read_prefixed_bytes(reader)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

/// Reads a string whose 7-bit prefix counts bytes of UTF-16LE text.
pub fn read_prefixed_utf16<R: Read>(reader: &mut R) -> io::Result<String> {
    let bytes = read_prefixed_bytes(reader)?;
    if bytes.len() % 2 != 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "odd byte count in UTF-16 string",
        ));
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    String::from_utf16(&units).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}
