//! Ordered primitive codec for object records.
//!
//! A record is a flat byte sequence: values are appended in the order they
//! are written and must be read back in the same order. Primitives are
//! encoded with bincode's default options (fixed-width little-endian
//! integers, length-prefixed sequences), so a `u32` always takes 4 bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::class::ClassId;
use crate::error::TypeError;
use crate::identity::InstanceId;

/// Append-only writer for a record.
#[derive(Clone, Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append any serializable value.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TypeError> {
        bincode::serialize_into(&mut self.buf, value)?;
        Ok(())
    }

    /// Append a raw `u32`.
    pub fn write_u32(&mut self, value: u32) -> Result<(), TypeError> {
        self.write(&value)
    }

    /// Append an identity as its packed wire integer.
    pub fn write_instance(&mut self, id: InstanceId) -> Result<(), TypeError> {
        self.write_u32(id.to_wire())
    }

    /// Append a class id.
    pub fn write_class(&mut self, class_id: ClassId) -> Result<(), TypeError> {
        self.write_u32(class_id.as_u32())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrow the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer and return the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential reader over a record, positioned at the start.
#[derive(Clone, Debug, Default)]
pub struct RecordReader {
    buf: Vec<u8>,
    pos: usize,
}

impl RecordReader {
    /// Create a reader over the given bytes.
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read the next value.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, TypeError> {
        let mut rest = &self.buf[self.pos..];
        let before = rest.len();
        let value = bincode::deserialize_from(&mut rest)?;
        let consumed = before - rest.len();
        self.pos += consumed;
        Ok(value)
    }

    /// Read a raw `u32`.
    pub fn read_u32(&mut self) -> Result<u32, TypeError> {
        self.read()
    }

    /// Read a packed identity.
    pub fn read_instance(&mut self) -> Result<InstanceId, TypeError> {
        self.read_u32().map(InstanceId::from_wire)
    }

    /// Read a class id.
    pub fn read_class(&mut self) -> Result<ClassId, TypeError> {
        self.read_u32().map(ClassId::from_raw)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl From<Vec<u8>> for RecordReader {
    fn from(buf: Vec<u8>) -> Self {
        Self::new(buf)
    }
}

impl From<RecordWriter> for RecordReader {
    fn from(writer: RecordWriter) -> Self {
        Self::new(writer.into_bytes())
    }
}
