use super::{EncodingErrorKind, Error};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::io::Result;

/// Utility trait for serializing data inside method bodies
///
/// Everything in bytecode is big-endian, including the branch offsets and the constant indices
/// embedded in instructions.
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i16::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

/// Size in `u16` is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Cursor over a method's bytecode array
///
/// Reads past the end of the array are reported as `EncodingErrorKind::Truncated` at the offset
/// of the instruction being read, not at the offset of the missing byte.
pub struct BytecodeReader<'a> {
    cursor: Cursor<&'a [u8]>,
    instruction_start: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Start reading the instruction at `offset`
    pub fn at(code: &'a [u8], offset: usize) -> BytecodeReader<'a> {
        let mut cursor = Cursor::new(code);
        cursor.set_position(offset as u64);
        BytecodeReader {
            cursor,
            instruction_start: offset,
        }
    }

    /// Current position in the code array
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Skip to the next multiple of four, relative to the start of the code array
    pub fn align_to_four(&mut self) -> std::result::Result<(), Error> {
        while self.position() % 4 != 0 {
            self.read_u8()?;
        }
        Ok(())
    }

    fn truncated(&self) -> Error {
        Error::encoding(self.instruction_start, EncodingErrorKind::Truncated)
    }

    pub fn read_u8(&mut self) -> std::result::Result<u8, Error> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    pub fn read_i8(&mut self) -> std::result::Result<i8, Error> {
        self.cursor.read_i8().map_err(|_| self.truncated())
    }

    pub fn read_u16(&mut self) -> std::result::Result<u16, Error> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    pub fn read_i16(&mut self) -> std::result::Result<i16, Error> {
        self.cursor
            .read_i16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    pub fn read_i32(&mut self) -> std::result::Result<i32, Error> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.truncated())
    }
}
