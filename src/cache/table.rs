//! Tabular payloads and their Parquet encoding.

use crate::error::{GuardError, Result};
use arrow::compute::concat_batches;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::ChunkReader;
use std::io::Write;
use std::sync::Arc;

/// Values a compute function may hand back to the cache.
///
/// `Ok(None)` means "no result"; an `Err` means the value cannot be viewed
/// as a single table, which is a caller bug.
pub trait TableOutput {
    fn into_table(self) -> std::result::Result<Option<RecordBatch>, GuardError>;
}

impl TableOutput for RecordBatch {
    fn into_table(self) -> std::result::Result<Option<RecordBatch>, GuardError> {
        Ok(Some(self))
    }
}

impl<T: TableOutput> TableOutput for Option<T> {
    fn into_table(self) -> std::result::Result<Option<RecordBatch>, GuardError> {
        match self {
            Some(inner) => inner.into_table(),
            None => Ok(None),
        }
    }
}

impl TableOutput for Vec<RecordBatch> {
    fn into_table(self) -> std::result::Result<Option<RecordBatch>, GuardError> {
        let Some(first) = self.first() else {
            return Ok(None);
        };
        let schema = first.schema();

        if let Some(other) = self.iter().find(|b| b.schema() != schema) {
            return Err(GuardError::InvalidComputeResult {
                type_name: std::any::type_name::<Self>(),
                reason: format!(
                    "batches do not share a schema ({} vs {} columns)",
                    schema.fields().len(),
                    other.schema().fields().len()
                ),
            });
        }

        concat_batches(&schema, &self)
            .map(Some)
            .map_err(|e| GuardError::InvalidComputeResult {
                type_name: std::any::type_name::<Self>(),
                reason: e.to_string(),
            })
    }
}

/// Zero-row batch with no columns, returned when a computation produced nothing.
pub fn empty_table() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// Encode `batch` as a single Snappy-compressed Parquet file into `sink`.
pub fn write_parquet<W: Write + Send>(sink: W, batch: &RecordBatch) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(sink, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Decode a Parquet file back into one batch.
///
/// Fails with [`GuardError::Parquet`] or [`GuardError::Arrow`] on anything that
/// is not a complete Parquet file, including truncated writes.
pub fn read_parquet<R: ChunkReader + 'static>(source: R) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(source)?;
    let schema = Arc::clone(builder.schema());
    let reader = builder.build()?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}
