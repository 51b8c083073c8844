//! Option builders for sources and sinks. Each encodes to the protobuf
//! payload the engine expects; characters are checked before anything is
//! dispatched.

use crate::error::{FusionError, Result};
use arrow_schema::{DataType, Field as ArrowField, SchemaRef};
use fusion_native::serialization::schema_to_bytes;
use fusion_native::wire;
use prost::Message;

pub use fusion_native::wire::CompressionType;

/// Types that encode to an option payload.
pub(crate) trait OptionsPayload {
    fn to_payload(&self) -> Result<Vec<u8>>;
}

/// Encode optional options. `None` is the empty payload (engine defaults).
pub(crate) fn encode_payload<O: OptionsPayload>(options: Option<&O>) -> Result<Vec<u8>> {
    options.map_or_else(|| Ok(Vec::new()), O::to_payload)
}

fn ascii(option: &str, value: char) -> Result<String> {
    if value.is_ascii() {
        Ok(value.to_string())
    } else {
        Err(FusionError::invalid_argument(format!(
            "{option} must be a single ASCII character, got '{value}'"
        )))
    }
}

fn ascii_opt(option: &str, value: Option<char>) -> Result<Option<String>> {
    value.map(|c| ascii(option, c)).transpose()
}

fn schema_bytes(schema: Option<&SchemaRef>) -> Result<Vec<u8>> {
    match schema {
        Some(schema) => schema_to_bytes(schema).map_err(|e| FusionError::invalid_argument(e.to_string())),
        None => Ok(Vec::new()),
    }
}

fn partition_fields(columns: &[(String, DataType)]) -> Result<Vec<wire::Field>> {
    columns
        .iter()
        .map(|(name, data_type)| {
            let field = ArrowField::new(name, data_type.clone(), false);
            wire::Field::try_from(&field).map_err(|e| FusionError::invalid_argument(format!("{e:#}")))
        })
        .collect()
}

/// One column of a declared file ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    name: String,
    ascending: bool,
    nulls_first: bool,
}

impl SortKey {
    /// Ascending on `name`, nulls last.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ascending: true,
            nulls_first: false,
        }
    }

    /// Descending on `name`, nulls first.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ascending: false,
            nulls_first: true,
        }
    }

    /// Override where nulls sort.
    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = nulls_first;
        self
    }
}

fn sort_orders(orders: &[Vec<SortKey>]) -> Result<Vec<wire::SortOrder>> {
    orders
        .iter()
        .map(|keys| {
            let columns = keys
                .iter()
                .map(|key| {
                    if key.name.is_empty() {
                        return Err(FusionError::invalid_argument("sort column name must not be empty"));
                    }
                    Ok(wire::SortColumn {
                        name: key.name.clone(),
                        ascending: key.ascending,
                        nulls_first: key.nulls_first,
                    })
                })
                .collect::<Result<_>>()?;
            Ok(wire::SortOrder { columns })
        })
        .collect()
}

/// How to read a CSV source.
#[derive(Debug, Clone, Default)]
pub struct CsvReadOptions {
    has_header: Option<bool>,
    delimiter: Option<char>,
    quote: Option<char>,
    terminator: Option<char>,
    escape: Option<char>,
    comment: Option<char>,
    newlines_in_values: bool,
    schema: Option<SchemaRef>,
    schema_infer_max_records: Option<u64>,
    file_extension: Option<String>,
    table_partition_cols: Vec<(String, DataType)>,
    compression: CompressionType,
    file_sort_order: Vec<Vec<SortKey>>,
}

impl CsvReadOptions {
    /// Engine defaults: header row, `,` delimiter, `"` quote, inferred schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first line is a header.
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    /// Field delimiter.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Quote character.
    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Line terminator (default: CRLF or LF).
    pub fn with_terminator(mut self, terminator: char) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Escape character.
    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }

    /// Lines starting with this character are skipped.
    pub fn with_comment(mut self, comment: char) -> Self {
        self.comment = Some(comment);
        self
    }

    /// Allow quoted values to contain newlines.
    pub fn with_newlines_in_values(mut self, allowed: bool) -> Self {
        self.newlines_in_values = allowed;
        self
    }

    /// Use `schema` instead of inferring one.
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Rows sampled for schema inference.
    pub fn with_schema_infer_max_records(mut self, records: u64) -> Self {
        self.schema_infer_max_records = Some(records);
        self
    }

    /// Only read files with this extension.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// Add a hive-style partition column.
    pub fn with_table_partition_col(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.table_partition_cols.push((name.into(), data_type));
        self
    }

    /// Source file compression.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Declare an ordering the files are already sorted by. May be called
    /// more than once when several orderings hold.
    pub fn with_file_sort_order(mut self, keys: Vec<SortKey>) -> Self {
        self.file_sort_order.push(keys);
        self
    }
}

impl OptionsPayload for CsvReadOptions {
    fn to_payload(&self) -> Result<Vec<u8>> {
        let message = wire::CsvReadOptions {
            has_header: self.has_header,
            delimiter: ascii_opt("delimiter", self.delimiter)?.unwrap_or_default(),
            quote: ascii_opt("quote", self.quote)?.unwrap_or_default(),
            terminator: ascii_opt("terminator", self.terminator)?,
            escape: ascii_opt("escape", self.escape)?,
            comment: ascii_opt("comment", self.comment)?,
            newlines_in_values: self.newlines_in_values,
            schema: schema_bytes(self.schema.as_ref())?,
            schema_infer_max_records: self.schema_infer_max_records,
            file_extension: self.file_extension.clone(),
            table_partition_cols: partition_fields(&self.table_partition_cols)?,
            file_compression_type: self.compression as i32,
            file_sort_order: sort_orders(&self.file_sort_order)?,
        };
        Ok(message.encode_to_vec())
    }
}

/// How to read a newline-delimited JSON source.
#[derive(Debug, Clone, Default)]
pub struct JsonReadOptions {
    schema: Option<SchemaRef>,
    schema_infer_max_records: Option<u64>,
    file_extension: Option<String>,
    table_partition_cols: Vec<(String, DataType)>,
    compression: CompressionType,
}

impl JsonReadOptions {
    /// Engine defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `schema` instead of inferring one.
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Rows sampled for schema inference.
    pub fn with_schema_infer_max_records(mut self, records: u64) -> Self {
        self.schema_infer_max_records = Some(records);
        self
    }

    /// Only read files with this extension.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// Add a hive-style partition column.
    pub fn with_table_partition_col(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.table_partition_cols.push((name.into(), data_type));
        self
    }

    /// Source file compression.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

impl OptionsPayload for JsonReadOptions {
    fn to_payload(&self) -> Result<Vec<u8>> {
        let message = wire::JsonReadOptions {
            schema: schema_bytes(self.schema.as_ref())?,
            schema_infer_max_records: self.schema_infer_max_records,
            file_extension: self.file_extension.clone(),
            table_partition_cols: partition_fields(&self.table_partition_cols)?,
            file_compression_type: self.compression as i32,
        };
        Ok(message.encode_to_vec())
    }
}

/// How to read a Parquet source.
#[derive(Debug, Clone, Default)]
pub struct ParquetReadOptions {
    file_extension: Option<String>,
    table_partition_cols: Vec<(String, DataType)>,
    parquet_pruning: Option<bool>,
    skip_metadata: Option<bool>,
    schema: Option<SchemaRef>,
}

impl ParquetReadOptions {
    /// Engine defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only read files with this extension.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// Add a hive-style partition column.
    pub fn with_table_partition_col(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.table_partition_cols.push((name.into(), data_type));
        self
    }

    /// Prune row groups using statistics.
    pub fn with_parquet_pruning(mut self, enabled: bool) -> Self {
        self.parquet_pruning = Some(enabled);
        self
    }

    /// Ignore key/value metadata embedded in the files.
    pub fn with_skip_metadata(mut self, skip: bool) -> Self {
        self.skip_metadata = Some(skip);
        self
    }

    /// Read with `schema` rather than the files' own.
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl OptionsPayload for ParquetReadOptions {
    fn to_payload(&self) -> Result<Vec<u8>> {
        let message = wire::ParquetReadOptions {
            file_extension: self.file_extension.clone(),
            table_partition_cols: partition_fields(&self.table_partition_cols)?,
            parquet_pruning: self.parquet_pruning,
            skip_metadata: self.skip_metadata,
            schema: schema_bytes(self.schema.as_ref())?,
        };
        Ok(message.encode_to_vec())
    }
}

/// Options for every write sink.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    single_file_output: bool,
    partition_by: Vec<String>,
}

impl WriteOptions {
    /// Engine defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one file instead of a directory of parts.
    pub fn with_single_file_output(mut self, single: bool) -> Self {
        self.single_file_output = single;
        self
    }

    /// Partition the output by these columns.
    pub fn with_partition_by(mut self, columns: Vec<String>) -> Self {
        self.partition_by = columns;
        self
    }
}

impl OptionsPayload for WriteOptions {
    fn to_payload(&self) -> Result<Vec<u8>> {
        let message = wire::WriteOptions {
            single_file_output: self.single_file_output,
            partition_by: self.partition_by.clone(),
        };
        Ok(message.encode_to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn absent_options_are_an_empty_payload() {
        assert!(encode_payload::<CsvReadOptions>(None).unwrap().is_empty());
    }

    #[test]
    fn non_ascii_characters_are_rejected_before_dispatch() {
        let error = CsvReadOptions::new().with_delimiter('§').to_payload().unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidArgument);
        assert!(error.message().starts_with("delimiter"));
    }

    #[test]
    fn csv_options_survive_encoding() {
        let payload = CsvReadOptions::new()
            .with_has_header(false)
            .with_delimiter(';')
            .with_comment('#')
            .with_table_partition_col("year", DataType::Int32)
            .with_compression(CompressionType::Gzip)
            .with_file_sort_order(vec![SortKey::asc("year"), SortKey::desc("id").with_nulls_first(false)])
            .to_payload()
            .unwrap();
        let decoded = wire::CsvReadOptions::decode(payload.as_slice()).unwrap();
        assert_eq!(decoded.has_header, Some(false));
        assert_eq!(decoded.delimiter, ";");
        assert!(decoded.quote.is_empty());
        assert_eq!(decoded.comment.as_deref(), Some("#"));
        assert_eq!(decoded.table_partition_cols[0].name, "year");
        assert_eq!(decoded.file_compression_type, CompressionType::Gzip as i32);
        assert_eq!(decoded.file_sort_order.len(), 1);
        let keys = &decoded.file_sort_order[0].columns;
        assert_eq!(keys.len(), 2);
        assert_eq!((keys[0].name.as_str(), keys[0].ascending, keys[0].nulls_first), ("year", true, false));
        assert_eq!((keys[1].name.as_str(), keys[1].ascending, keys[1].nulls_first), ("id", false, false));
    }

    #[test]
    fn unnamed_sort_columns_are_rejected() {
        let error = CsvReadOptions::new()
            .with_file_sort_order(vec![SortKey::asc("")])
            .to_payload()
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn write_options_encode_partitioning() {
        let payload = WriteOptions::new()
            .with_partition_by(vec!["region".to_string()])
            .to_payload()
            .unwrap();
        let decoded = wire::WriteOptions::decode(payload.as_slice()).unwrap();
        assert!(!decoded.single_file_output);
        assert_eq!(decoded.partition_by, vec!["region".to_string()]);
    }
}
