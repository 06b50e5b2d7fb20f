//! Little-endian primitives for the map cache files.
//!
//! Strings and byte blobs are written as a `u32` length followed by the
//! bytes; readers reject lengths above the caller's limit before allocating.

use std::io::{self, Read, Write};

/// Upper bound for names, tags and other short strings.
pub const STRING_MAX: usize = 1 << 16;

pub fn write_u8<W: Write + ?Sized>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u16<W: Write + ?Sized>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_i32<W: Write + ?Sized>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u32<W: Write + ?Sized>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64<W: Write + ?Sized>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_bool<W: Write + ?Sized>(w: &mut W, v: bool) -> io::Result<()> {
    write_u8(w, u8::from(v))
}

pub fn write_bytes<W: Write + ?Sized>(w: &mut W, bytes: &[u8], max: usize) -> io::Result<()> {
    if bytes.len() > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} bytes exceeds the {max} byte limit", bytes.len()),
        ));
    }
    let len = u32::try_from(bytes.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    write_u32(w, len)?;
    w.write_all(bytes)
}

pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str, max: usize) -> io::Result<()> {
    write_bytes(w, s.as_bytes(), max)
}

pub fn write_char<W: Write + ?Sized>(w: &mut W, c: char) -> io::Result<()> {
    write_u32(w, u32::from(c))
}

fn read_array<R: Read + ?Sized, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> io::Result<u8> {
    Ok(read_array::<R, 1>(r)?[0])
}

pub fn read_u16<R: Read + ?Sized>(r: &mut R) -> io::Result<u16> {
    read_array(r).map(u16::from_le_bytes)
}

pub fn read_i32<R: Read + ?Sized>(r: &mut R) -> io::Result<i32> {
    read_array(r).map(i32::from_le_bytes)
}

pub fn read_u32<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    read_array(r).map(u32::from_le_bytes)
}

pub fn read_u64<R: Read + ?Sized>(r: &mut R) -> io::Result<u64> {
    read_array(r).map(u64::from_le_bytes)
}

pub fn read_bool<R: Read + ?Sized>(r: &mut R) -> io::Result<bool> {
    read_u8(r).map(|b| b != 0)
}

pub fn read_bytes<R: Read + ?Sized>(r: &mut R, max: usize) -> io::Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    if len > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length {len} exceeds the {max} byte limit"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_string<R: Read + ?Sized>(r: &mut R, max: usize) -> io::Result<String> {
    String::from_utf8(read_bytes(r, max)?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn read_char<R: Read + ?Sized>(r: &mut R) -> io::Result<char> {
    let raw = read_u32(r)?;
    char::from_u32(raw).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad glyph {raw:#x}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn strings_respect_their_limit() {
        let mut buf = Vec::new();
        write_string(&mut buf, "orc", 8).unwrap();
        assert_eq!(buf.len(), 4 + 3);
        assert!(write_string(&mut buf, "a long name", 4).is_err());

        let mut cur = Cursor::new(buf);
        assert!(read_string(&mut cur, 2).is_err());
    }

    #[test]
    fn mixed_values_read_back_in_order() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 7).unwrap();
        write_i32(&mut buf, -5).unwrap();
        write_char(&mut buf, 'é').unwrap();
        write_string(&mut buf, "D:1-5", STRING_MAX).unwrap();
        write_bool(&mut buf, true).unwrap();

        let mut cur = Cursor::new(buf);
        assert_eq!(read_u8(&mut cur).unwrap(), 7);
        assert_eq!(read_i32(&mut cur).unwrap(), -5);
        assert_eq!(read_char(&mut cur).unwrap(), 'é');
        assert_eq!(read_string(&mut cur, STRING_MAX).unwrap(), "D:1-5");
        assert!(read_bool(&mut cur).unwrap());
        assert!(read_u8(&mut cur).is_err());
    }
}
