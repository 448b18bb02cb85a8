//! In-memory tables and their CSV form
//!
//! A [`Table`] is an Arrow schema plus record batches. Rows are positional;
//! there is no separate index column, so concatenated tables number their rows
//! from zero by construction.

use crate::{FilestoreError, Result};
use arrow::compute::cast;
use arrow_array::{ArrayRef, RecordBatch};
use arrow_csv::reader::Format;
use arrow_csv::{ReaderBuilder, WriterBuilder};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use std::io::{Read, Seek};
use std::sync::Arc;

/// Rows decoded per record batch when reading CSV
const READ_BATCH_ROWS: usize = 8192;

#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Table over `batches`, each of which must carry `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema().fields() != schema.fields() {
                return Err(FilestoreError::Arrow(arrow_schema::ArrowError::SchemaError(
                    "record batch schema differs from table schema".to_string(),
                )));
            }
        }
        Ok(Self { schema, batches })
    }

    /// No columns, no rows
    pub fn empty() -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
        }
    }

    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    /// All rows as a single batch
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        Ok(arrow_select::concat::concat_batches(
            &self.schema,
            &self.batches,
        )?)
    }

    /// Zero-copy views of rows `offset..offset + len`.
    pub fn slice(&self, offset: usize, len: usize) -> Vec<RecordBatch> {
        let mut out = Vec::new();
        let end = offset.saturating_add(len);
        let mut start_of_batch = 0;
        for batch in &self.batches {
            let rows = batch.num_rows();
            let end_of_batch = start_of_batch + rows;
            if end_of_batch > offset && start_of_batch < end {
                let from = offset.max(start_of_batch) - start_of_batch;
                let to = end.min(end_of_batch) - start_of_batch;
                out.push(batch.slice(from, to - from));
            }
            if end_of_batch >= end {
                break;
            }
            start_of_batch = end_of_batch;
        }
        out
    }

    /// CSV text of rows `offset..offset + len`, without a header line.
    pub fn rows_csv(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().with_header(false).build(Vec::new());
        for batch in self.slice(offset, len) {
            writer.write(&batch)?;
        }
        Ok(writer.into_inner())
    }

    /// CSV header line alone.
    pub fn header_csv(&self) -> Result<Vec<u8>> {
        if self.num_columns() == 0 {
            return Ok(Vec::new());
        }
        let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
        writer.write(&RecordBatch::new_empty(self.schema.clone()))?;
        Ok(writer.into_inner())
    }

    /// Header line followed by every row.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut out = self.header_csv()?;
        out.extend(self.rows_csv(0, self.num_rows())?);
        Ok(out)
    }

    /// Parse CSV with a header row, inferring column types.
    ///
    /// Input without any bytes (or only whitespace) gives [`Table::empty`].
    pub fn read_csv<R: Read + Seek>(mut reader: R) -> Result<Self> {
        if is_blank(&mut reader)? {
            return Ok(Self::empty());
        }
        let (schema, _) = Format::default()
            .with_header(true)
            .infer_schema(&mut reader, None)?;
        reader.rewind()?;
        Self::read_csv_with_schema(reader, Arc::new(schema))
    }

    /// Parse CSV with a header row against a known schema.
    pub fn read_csv_with_schema<R: Read>(reader: R, schema: SchemaRef) -> Result<Self> {
        let csv = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_batch_size(READ_BATCH_ROWS)
            .build(reader)?;
        let batches = csv.collect::<std::result::Result<Vec<_>, _>>()?;
        Self::try_new(schema, batches)
    }

    /// Cast every column to the matching field of `schema`.
    pub fn cast_to(&self, schema: &SchemaRef) -> Result<Self> {
        if self.schema.fields() == schema.fields() {
            return Ok(self.clone());
        }
        let mut batches = Vec::with_capacity(self.batches.len());
        for batch in &self.batches {
            let columns = batch
                .columns()
                .iter()
                .zip(schema.fields())
                .map(|(column, field)| cast(column, field.data_type()))
                .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;
            batches.push(RecordBatch::try_new(schema.clone(), columns)?);
        }
        Self::try_new(schema.clone(), batches)
    }

    /// Stack tables vertically, in order.
    ///
    /// Tables without columns are skipped. The rest must share column names;
    /// differing column types are widened (see [`widen`]).
    pub fn concat(parts: Vec<(String, Table)>) -> Result<Self> {
        let parts: Vec<_> = parts
            .into_iter()
            .filter(|(_, table)| table.num_columns() > 0)
            .collect();
        let Some((_, first)) = parts.first() else {
            return Ok(Self::empty());
        };

        let expected = first.column_names();
        for (name, table) in &parts {
            let found = table.column_names();
            if found != expected {
                return Err(FilestoreError::SchemaMismatch {
                    part: name.clone(),
                    expected,
                    found,
                });
            }
        }

        let fields = expected
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let types: Vec<&DataType> = parts
                    .iter()
                    .filter(|(_, table)| table.num_rows() > 0)
                    .map(|(_, table)| table.schema.field(i).data_type())
                    .collect();
                let data_type = match types.split_first() {
                    Some((head, rest)) => rest.iter().fold((*head).clone(), |acc, t| widen(&acc, t)),
                    None => first.schema.field(i).data_type().clone(),
                };
                Field::new(column, data_type, true)
            })
            .collect::<Vec<_>>();
        let schema = Arc::new(Schema::new(fields));

        let mut batches = Vec::new();
        for (_, table) in &parts {
            batches.extend(table.cast_to(&schema)?.batches);
        }
        Self::try_new(schema, batches)
    }
}

impl PartialEq for Table {
    /// Same column names and types, same cell values in the same order
    fn eq(&self, other: &Self) -> bool {
        if self.schema.fields() != other.schema.fields() {
            return false;
        }
        match (self.to_record_batch(), other.to_record_batch()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Common type of two inferred CSV column types.
///
/// An all-empty (`Null`) column takes the other type. Integers and floats
/// meet at `Float64`; any other disagreement falls back to text, which every
/// inferred type casts to.
pub fn widen(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        _ if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

fn is_blank<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let mut buf = [0u8; 4096];
    let blank = loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break true;
        }
        if !buf[..n].iter().all(u8::is_ascii_whitespace) {
            break false;
        }
    };
    reader.rewind()?;
    Ok(blank)
}
