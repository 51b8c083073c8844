//! Arrow IPC streaming-format conversion to/from byte arrays.
//!
//! Schemas and collected results are written as complete streams. Stream
//! frames are written incrementally by [`IpcFrameWriter`]: the bytes of all
//! frames, concatenated in order, form one valid IPC stream.

use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::{ArrowError, Schema, SchemaRef};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

/// Serialize a schema as an IPC stream holding only the schema message.
pub fn schema_to_bytes(schema: &Schema) -> Result<Vec<u8>, ArrowError> {
    let mut buf = vec![];
    {
        let mut writer = StreamWriter::try_new(&mut buf, schema)?;
        writer.finish()?;
    }
    Ok(buf)
}

/// Serialize a schema and a list of batches as one IPC stream.
pub fn batches_to_bytes(schema: &Schema, batches: &[RecordBatch]) -> Result<Vec<u8>, ArrowError> {
    let mut buf = vec![];
    {
        let mut writer = StreamWriter::try_new(&mut buf, schema)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }
    Ok(buf)
}

/// Read the schema from the head of an IPC stream.
pub fn bytes_to_schema(bytes: &[u8]) -> Result<SchemaRef, ArrowError> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    Ok(reader.schema())
}

/// Decode an optional schema carried in an option payload. Empty bytes
/// mean "infer".
pub(crate) fn optional_schema(bytes: &[u8]) -> Result<Option<Schema>, ArrowError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let schema = bytes_to_schema(bytes)?;
    Ok(Some(schema.as_ref().clone()))
}

/// A `Write` sink whose contents can be drained from outside the writer.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(mut lock) => std::mem::take(&mut *lock),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut lock = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("frame buffer lock poisoned"))?;
        lock.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Incremental IPC stream writer. Each call to [`IpcFrameWriter::frame`]
/// returns the bytes produced since the previous call, so the first frame
/// carries the schema message followed by the first batch.
pub struct IpcFrameWriter {
    writer: StreamWriter<SharedBuffer>,
    buffer: SharedBuffer,
}

impl IpcFrameWriter {
    /// Start a new stream for `schema`.
    pub fn try_new(schema: &Schema) -> Result<Self, ArrowError> {
        let buffer = SharedBuffer::default();
        let writer = StreamWriter::try_new(buffer.clone(), schema)?;
        Ok(Self { writer, buffer })
    }

    /// Encode one batch and return the frame.
    pub fn frame(&mut self, batch: &RecordBatch) -> Result<Vec<u8>, ArrowError> {
        self.writer.write(batch)?;
        Ok(self.buffer.take())
    }

    /// Write the end-of-stream marker and return the final bytes.
    pub fn finish(&mut self) -> Result<Vec<u8>, ArrowError> {
        self.writer.finish()?;
        Ok(self.buffer.take())
    }
}
