use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Trait for types that can be serialized to / deserialized from a binary
/// stream with a fixed, endian-stable layout.
pub trait BinarySerializable: fmt::Debug + Sized {
    /// Serialize
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;
    /// Deserialize
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;
}

/// `FixedSize` marks types whose serialized representation has a constant
/// byte length, which makes stream offsets computable without writing.
pub trait FixedSize: BinarySerializable {
    /// Number of bytes of the serialized representation.
    const SIZE_IN_BYTES: usize;
}

impl BinarySerializable for () {
    fn serialize<W: Write + ?Sized>(&self, _: &mut W) -> io::Result<()> {
        Ok(())
    }
    fn deserialize<R: Read + ?Sized>(_: &mut R) -> io::Result<Self> {
        Ok(())
    }
}

impl FixedSize for () {
    const SIZE_IN_BYTES: usize = 0;
}

impl BinarySerializable for u8 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u8()
    }
}

impl FixedSize for u8 {
    const SIZE_IN_BYTES: usize = 1;
}

impl BinarySerializable for u16 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u16::<LittleEndian>()
    }
}

impl FixedSize for u16 {
    const SIZE_IN_BYTES: usize = 2;
}

impl BinarySerializable for u32 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u32::<LittleEndian>()
    }
}

impl FixedSize for u32 {
    const SIZE_IN_BYTES: usize = 4;
}

impl BinarySerializable for u64 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u64::<LittleEndian>()
    }
}

impl FixedSize for u64 {
    const SIZE_IN_BYTES: usize = 8;
}

impl BinarySerializable for i32 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_i32::<LittleEndian>()
    }
}

impl FixedSize for i32 {
    const SIZE_IN_BYTES: usize = 4;
}

impl BinarySerializable for f32 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_f32::<LittleEndian>()
    }
}

impl FixedSize for f32 {
    const SIZE_IN_BYTES: usize = 4;
}

impl BinarySerializable for f64 {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f64::<LittleEndian>(*self)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_f64::<LittleEndian>()
    }
}

impl FixedSize for f64 {
    const SIZE_IN_BYTES: usize = 8;
}

impl<T: BinarySerializable> BinarySerializable for Vec<T> {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        VInt(self.len() as u64).serialize(writer)?;
        for it in self {
            it.serialize(writer)?;
        }
        Ok(())
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let num_items = VInt::deserialize(reader)?.val() as usize;
        let mut items = Vec::with_capacity(num_items.min(1 << 20));
        for _ in 0..num_items {
            items.push(T::deserialize(reader)?);
        }
        Ok(items)
    }
}

impl<Left: BinarySerializable, Right: BinarySerializable> BinarySerializable for (Left, Right) {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)?;
        self.1.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok((Left::deserialize(reader)?, Right::deserialize(reader)?))
    }
}

impl BinarySerializable for String {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let data: &[u8] = self.as_bytes();
        VInt(data.len() as u64).serialize(writer)?;
        writer.write_all(data)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let string_length = VInt::deserialize(reader)?.val() as usize;
        let mut result = String::with_capacity(string_length.min(1 << 20));
        reader.take(string_length as u64).read_to_string(&mut result)?;
        if result.len() != string_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "reached EOF while reading a string",
            ));
        }
        Ok(result)
    }
}

/// Variable-length encoded u64, 7 bits per byte, high bit = continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VInt(pub u64);

impl VInt {
    /// The wrapped value.
    pub fn val(self) -> u64 {
        self.0
    }
}

impl BinarySerializable for VInt {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let mut remaining = self.0;
        loop {
            let byte = (remaining & 0x7f) as u8;
            remaining >>= 7;
            if remaining == 0 {
                return writer.write_u8(byte);
            }
            writer.write_u8(byte | 0x80)?;
        }
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut result = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = reader.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(VInt(result));
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "vint is longer than 10 bytes",
        ))
    }
}
