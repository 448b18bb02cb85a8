//! Pushing a table into a SQL table backed by an uploaded file
//!
//! Writing rows through SQL is slow, so the table is uploaded as a headerless
//! CSV file and a [`TableCreator`] is asked to define a table over it. The
//! file must stay in place for as long as the table exists.

use crate::client::DbfsClient;
use crate::config::UploadOptions;
use crate::link::FileStoreLink;
use crate::progress::ProgressReporter;
use crate::table::Table;
use crate::transport::{HttpTransport, Transport};
use crate::upload::upload_table;
use crate::{FilestoreError, Result};
use arrow_schema::DataType;
use diagnostics::*;

/// Folder holding the files behind pushed tables
pub const PUSHED_TABLES_DIR: &str = "/FileStore/df/pushed_tables";

pub const DEFAULT_DB: &str = "default";

/// Column type as understood by the table-creation side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnTag {
    String,
    Int,
    Float,
    Boolean,
    Date,
}

impl ColumnTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnTag::String => "string",
            ColumnTag::Int => "int",
            ColumnTag::Float => "float",
            ColumnTag::Boolean => "boolean",
            ColumnTag::Date => "date",
        }
    }

    /// Tag for an Arrow column type, `None` when there is no equivalent.
    ///
    /// Columns inferred as `Null` (no values at all) are treated as strings.
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
                Some(ColumnTag::String)
            }
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Some(ColumnTag::Int),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(ColumnTag::Float),
            DataType::Boolean => Some(ColumnTag::Boolean),
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
                Some(ColumnTag::Date)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ColumnTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column names and tags of `table`, in column order.
pub fn column_tags(table: &Table) -> Result<Vec<(String, ColumnTag)>> {
    table
        .schema()
        .fields()
        .iter()
        .map(|field| {
            ColumnTag::from_data_type(field.data_type())
                .map(|tag| (field.name().clone(), tag))
                .ok_or_else(|| FilestoreError::UnsupportedColumnType {
                    column: field.name().clone(),
                    data_type: field.data_type().to_string(),
                })
        })
        .collect()
}

/// Everything needed to define a table over an uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub db_name: String,
    pub table_name: String,
    /// DBFS path of the headerless CSV data
    pub path: String,
    pub columns: Vec<(String, ColumnTag)>,
}

/// Creates a SQL table from a [`TableSpec`]
///
/// Connecting to the SQL endpoint and running DDL is left to the caller.
pub trait TableCreator {
    fn create_table(&self, spec: &TableSpec) -> Result<()>;
}

impl<F: Fn(&TableSpec) -> Result<()>> TableCreator for F {
    fn create_table(&self, spec: &TableSpec) -> Result<()> {
        self(spec)
    }
}

/// Path of the file backing `db_name`.`table_name`
pub fn pushed_table_path(db_name: &str, table_name: &str) -> String {
    format!("{PUSHED_TABLES_DIR}/{db_name}_{table_name}")
}

/// Uploads tables and registers them through a [`TableCreator`]
pub struct SqlLink<C: TableCreator, T: Transport = HttpTransport> {
    files: FileStoreLink<T>,
    creator: C,
}

impl<C: TableCreator, T: Transport> SqlLink<C, T> {
    pub fn new(files: FileStoreLink<T>, creator: C) -> Self {
        Self { files, creator }
    }

    pub fn files(&self) -> &FileStoreLink<T> {
        &self.files
    }

    pub fn client(&self) -> &DbfsClient<T> {
        self.files.client()
    }

    /// Upload `table` and create `db_name`.`table_name` over it.
    ///
    /// Column types are checked before anything is uploaded.
    pub fn push_table(
        &self,
        table: &Table,
        table_name: &str,
        db_name: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<TableSpec> {
        let columns = column_tags(table)?;
        let path = pushed_table_path(db_name, table_name);
        let options = UploadOptions {
            headers: false,
            ..self.files.upload_options().clone()
        };
        upload_table(self.client(), table, &path, &options, progress)?;

        let spec = TableSpec {
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
            path,
            columns,
        };
        self.creator.create_table(&spec)?;
        info!("pushed {db_name}.{table_name}", db_name: db_name, table_name: table_name);
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::testing::MemoryDbfs;
    use arrow_array::{ArrayRef, Date32Array, Int64Array, ListArray, RecordBatch, StringArray};
    use arrow_array::types::Int32Type;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn test_tags_for_inferred_csv() {
        let table = Table::read_csv(Cursor::new(
            b"name,count,ratio,ok,day\nx,1,0.5,true,2024-03-01\n".to_vec(),
        ))
        .unwrap();
        let tags: Vec<(String, ColumnTag)> = column_tags(&table).unwrap();
        let names: Vec<&str> = tags.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(names, vec!["string", "int", "float", "boolean", "date"]);
        assert_eq!(tags[0].0, "name");
    }

    #[test]
    fn test_unsupported_type() {
        let list = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![Some(vec![Some(1)])]);
        let batch = RecordBatch::try_from_iter(vec![("xs", Arc::new(list) as ArrayRef)]).unwrap();
        let err = column_tags(&Table::from_batch(batch)).unwrap_err();
        assert!(matches!(err, FilestoreError::UnsupportedColumnType { column, .. } if column == "xs"));
    }

    #[test]
    fn test_push_table_uploads_headerless_and_creates() {
        let dbfs = MemoryDbfs::new();
        let seen = RefCell::new(None);
        let creator = |spec: &TableSpec| -> Result<()> {
            *seen.borrow_mut() = Some(spec.clone());
            Ok(())
        };
        let link = SqlLink::new(FileStoreLink::new(DbfsClient::new(&dbfs)), creator);

        let batch = RecordBatch::try_from_iter(vec![
            ("id", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
            ("name", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
            ("day", Arc::new(Date32Array::from(vec![0, 1])) as ArrayRef),
        ])
        .unwrap();
        let spec = link
            .push_table(&Table::from_batch(batch), "people", DEFAULT_DB, &NoProgress)
            .unwrap();

        assert_eq!(spec.path, "/FileStore/df/pushed_tables/default_people");
        assert_eq!(
            spec.columns,
            vec![
                ("id".to_string(), ColumnTag::Int),
                ("name".to_string(), ColumnTag::String),
                ("day".to_string(), ColumnTag::Date),
            ]
        );
        assert_eq!(seen.borrow().as_ref(), Some(&spec));
        assert_eq!(
            dbfs.file(&spec.path).unwrap(),
            b"1,a,1970-01-01\n2,b,1970-01-02\n"
        );
    }

    #[test]
    fn test_creator_failure_propagates() {
        let dbfs = MemoryDbfs::new();
        let creator = |_: &TableSpec| -> Result<()> {
            Err(FilestoreError::InvalidConfig("no warehouse".to_string()))
        };
        let link = SqlLink::new(FileStoreLink::new(DbfsClient::new(&dbfs)), creator);
        let table = Table::read_csv(Cursor::new(b"a\n1\n".to_vec())).unwrap();

        assert!(link.push_table(&table, "t", "db", &NoProgress).is_err());
        // the data file stays, so the table can be created again later
        assert!(dbfs.file("/FileStore/df/pushed_tables/db_t").is_some());
    }
}
