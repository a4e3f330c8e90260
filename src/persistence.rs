//! Little-endian field codec for the persisted network format.
//!
//! Every field is written at a fixed width in a fixed order; nothing depends on
//! the in-memory layout of the Rust types. The record layout itself lives with
//! the types that own the fields ([`crate::layers::Node`],
//! [`crate::layers::DenseLayer`], [`crate::network::Mlp`]).

use crate::error::{MlpError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Writes fixed-width little-endian fields.
pub struct NetworkWriter<W: Write> {
    writer: W,
}

impl<W: Write> NetworkWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a length or count as a u64.
    pub fn write_count(&mut self, value: usize) -> Result<()> {
        self.write_u64(value as u64)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.writer.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) -> Result<()> {
        for &value in values {
            self.write_f32(value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reads fixed-width little-endian fields.
///
/// A short read surfaces as [`MlpError::Truncated`] rather than a raw I/O error.
pub struct NetworkReader<R: Read> {
    reader: R,
}

impl<R: Read> NetworkReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.reader.read_u32::<LittleEndian>().map_err(map_read_error)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.reader.read_u64::<LittleEndian>().map_err(map_read_error)
    }

    /// Read a u64 length or count, rejecting values that do not fit in `usize`.
    pub fn read_count(&mut self) -> Result<usize> {
        let value = self.read_u64()?;
        usize::try_from(value)
            .map_err(|_| MlpError::SizeMismatch(format!("count {value} does not fit in memory")))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.reader.read_f32::<LittleEndian>().map_err(map_read_error)
    }

    /// Read exactly `len` f32 values.
    ///
    /// The buffer grows as values arrive, so a corrupt length fails with
    /// [`MlpError::Truncated`] instead of allocating up front.
    pub fn read_f32_vec(&mut self, len: usize) -> Result<Vec<f32>> {
        let mut values = Vec::new();
        for _ in 0..len {
            values.push(self.read_f32()?);
        }
        Ok(values)
    }
}

fn map_read_error(err: io::Error) -> MlpError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        MlpError::Truncated
    } else {
        MlpError::Io(err)
    }
}
