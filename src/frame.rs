//! Tabular frames backed by Arrow RecordBatches.
//!
//! A [`Frame`] is the in-memory table handed to the monitor: an ordered run
//! of RecordBatches sharing one schema. Frames load from Parquet, CSV and
//! JSON Lines and can be sliced by row range across batch boundaries.

use std::{io::BufReader, path::Path, sync::Arc};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    file::properties::WriterProperties,
};

use crate::error::{Error, Result};

/// Rows read per batch when parsing text formats.
const TEXT_BATCH_SIZE: usize = 8192;

/// Rows sampled for schema inference in text formats.
const INFER_ROWS: usize = 1000;

/// An in-memory table of RecordBatches with a common schema.
#[derive(Debug, Clone)]
pub struct Frame {
    batches: Vec<RecordBatch>,
    schema: SchemaRef,
    row_count: usize,
}

impl Frame {
    /// Creates a frame from a non-empty vector of RecordBatches.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty or the batches have
    /// inconsistent schemas.
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        let schema = batches
            .first()
            .map(RecordBatch::schema)
            .ok_or_else(|| Error::schema_mismatch("a frame needs at least one batch"))?;

        for (i, batch) in batches.iter().enumerate().skip(1) {
            if batch.schema() != schema {
                return Err(Error::schema_mismatch(format!(
                    "Batch {} has different schema than batch 0",
                    i
                )));
            }
        }

        let row_count = batches.iter().map(RecordBatch::num_rows).sum();

        Ok(Self {
            batches,
            schema,
            row_count,
        })
    }

    /// Creates a frame from a single RecordBatch.
    ///
    /// # Errors
    ///
    /// Never fails for a single batch; kept fallible for symmetry with [`Frame::new`].
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        Self::new(vec![batch])
    }

    /// Loads a frame from a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is not valid Parquet,
    /// or contains no batches.
    pub fn from_parquet(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<Vec<_>, _>>()?;

        Self::new(batches)
    }

    /// Saves the frame to a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    pub fn to_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| Error::io(e, path))?;

        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(file, Arc::clone(&self.schema), Some(props))?;
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.close()?;

        Ok(())
    }

    /// Loads a frame from a CSV file with a header row.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        use std::io::{Seek, SeekFrom};

        use arrow_csv::{reader::Format, ReaderBuilder};

        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let mut buf_reader = BufReader::new(file);

        let format = Format::default().with_header(true);
        let (inferred, _) = format.infer_schema(&mut buf_reader, Some(INFER_ROWS))?;
        buf_reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io(e, path))?;

        let reader = ReaderBuilder::new(Arc::new(inferred))
            .with_batch_size(TEXT_BATCH_SIZE)
            .with_header(true)
            .build(buf_reader)?;
        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<Vec<_>, _>>()?;

        Self::new(batches)
    }

    /// Loads a frame from a JSON Lines file (one object per row).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        use arrow_json::ReaderBuilder;

        let path = path.as_ref();
        let infer_file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let (inferred, _) =
            arrow_json::reader::infer_json_schema(BufReader::new(infer_file), Some(INFER_ROWS))?;

        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let reader = ReaderBuilder::new(Arc::new(inferred))
            .with_batch_size(TEXT_BATCH_SIZE)
            .build(BufReader::new(file))?;
        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<Vec<_>, _>>()?;

        Self::new(batches)
    }

    /// Loads a frame, choosing the reader from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unknown extensions, or any
    /// reader error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "parquet" => Self::from_parquet(path),
            "csv" => Self::from_csv(path),
            "json" | "jsonl" => Self::from_json(path),
            ext => Err(Error::unsupported_format(ext)),
        }
    }

    /// Total number of rows.
    pub fn len(&self) -> usize {
        self.row_count
    }

    /// Returns true if the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Common schema of all batches.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// The underlying batches.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Append another frame's batches after this one's.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the schemas differ.
    pub fn concat(&self, other: &Self) -> Result<Self> {
        let mut batches = self.batches.clone();
        batches.extend(other.batches.iter().cloned());
        Self::new(batches)
    }

    /// Rows `[start, end)` as a new frame sharing the same buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is empty or exceeds the frame.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.row_count {
            return Err(Error::invalid_config(format!(
                "row range {}..{} is invalid for a frame of {} rows",
                start, end, self.row_count
            )));
        }
        Self::new(slice_batches(&self.batches, start, end))
    }

    /// Split the frame into consecutive chunks of at most `rows` rows.
    pub fn chunks(&self, rows: usize) -> Vec<RecordBatch> {
        let rows = rows.max(1);
        (0..self.row_count)
            .step_by(rows)
            .flat_map(|start| slice_batches(&self.batches, start, (start + rows).min(self.row_count)))
            .collect()
    }
}

/// Rows `[start, end)` of a batch sequence, sliced without copying.
///
/// Ranges past the end are truncated; an empty range yields no batches.
pub fn slice_batches(batches: &[RecordBatch], start: usize, end: usize) -> Vec<RecordBatch> {
    let mut out = Vec::new();
    let mut offset = 0;

    for batch in batches {
        let batch_start = offset;
        let batch_end = offset + batch.num_rows();
        offset = batch_end;

        if batch_end <= start {
            continue;
        }
        if batch_start >= end {
            break;
        }

        let from = start.saturating_sub(batch_start);
        let to = end.min(batch_end) - batch_start;
        if to > from {
            out.push(batch.slice(from, to - from));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{Array, Float64Array, Int32Array},
        datatypes::{DataType, Field, Schema},
    };

    use super::*;

    fn make_batch(start: i32, rows: i32) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("score", DataType::Float64, false),
        ]));
        let ids: Vec<i32> = (start..start + rows).collect();
        let scores: Vec<f64> = ids.iter().map(|i| f64::from(*i) * 0.5).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(ids)),
                Arc::new(Float64Array::from(scores)),
            ],
        )
        .unwrap()
    }

    fn first_id(batch: &RecordBatch) -> i32 {
        batch
            .column(0)
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap()
            .value(0)
    }

    #[test]
    fn test_new_counts_rows() {
        let frame = Frame::new(vec![make_batch(0, 10), make_batch(10, 5)]).unwrap();
        assert_eq!(frame.len(), 15);
        assert_eq!(frame.batches().len(), 2);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_new_rejects_empty() {
        assert!(Frame::new(vec![]).is_err());
    }

    #[test]
    fn test_new_rejects_mixed_schemas() {
        let other = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)])),
            vec![Arc::new(Int32Array::from(vec![1]))],
        )
        .unwrap();
        assert!(Frame::new(vec![make_batch(0, 3), other]).is_err());
    }

    #[test]
    fn test_slice_batches_across_boundary() {
        let batches = vec![make_batch(0, 10), make_batch(10, 10), make_batch(20, 10)];
        let sliced = slice_batches(&batches, 8, 23);
        let rows: usize = sliced.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 15);
        assert_eq!(sliced.len(), 3);
        assert_eq!(first_id(&sliced[0]), 8);
        assert_eq!(first_id(&sliced[1]), 10);
        assert_eq!(sliced[2].num_rows(), 3);
    }

    #[test]
    fn test_slice_batches_empty_and_out_of_range() {
        let batches = vec![make_batch(0, 10)];
        assert!(slice_batches(&batches, 5, 5).is_empty());
        assert!(slice_batches(&batches, 20, 30).is_empty());
        let tail = slice_batches(&batches, 7, 100);
        assert_eq!(tail[0].num_rows(), 3);
    }

    #[test]
    fn test_frame_slice() {
        let frame = Frame::new(vec![make_batch(0, 10), make_batch(10, 10)]).unwrap();
        let sliced = frame.slice(5, 15).unwrap();
        assert_eq!(sliced.len(), 10);
        assert!(frame.slice(15, 5).is_err());
        assert!(frame.slice(0, 21).is_err());
    }

    #[test]
    fn test_concat() {
        let a = Frame::from_batch(make_batch(0, 4)).unwrap();
        let b = Frame::from_batch(make_batch(4, 6)).unwrap();
        let joined = a.concat(&b).unwrap();
        assert_eq!(joined.len(), 10);
        assert_eq!(first_id(&joined.batches()[1]), 4);
    }

    #[test]
    fn test_chunks() {
        let frame = Frame::new(vec![make_batch(0, 7), make_batch(7, 7)]).unwrap();
        let chunks = frame.chunks(5);
        let sizes: Vec<usize> = chunks.iter().map(RecordBatch::num_rows).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 14);
        assert!(sizes.iter().all(|s| *s <= 5));
    }

    #[test]
    fn test_parquet_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.parquet");
        let frame = Frame::new(vec![make_batch(0, 20)]).unwrap();
        frame.to_parquet(&path).unwrap();

        let loaded = Frame::load(&path).unwrap();
        assert_eq!(loaded.len(), 20);
        assert_eq!(loaded.schema().fields().len(), 2);
        let scores = loaded.batches()[0]
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(!scores.is_null(0));
    }

    #[test]
    fn test_csv_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "a,b\n1,x\n2,y\n3,x\n").unwrap();
        let frame = Frame::load(&path).unwrap();
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_json_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "{\"a\": 1.5}\n{\"a\": 2.5}\n").unwrap();
        let frame = Frame::load(&path).unwrap();
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let result = Frame::load("data.xlsx");
        assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
    }
}
