use super::Field;

/// Compression applied to source files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CompressionType {
    /// Plain files.
    Uncompressed = 0,
    /// gzip
    Gzip = 1,
    /// bzip2
    Bzip2 = 2,
    /// xz
    Xz = 3,
    /// zstd
    Zstd = 4,
}

/// Options for registering a CSV source. Unset optional fields take the
/// engine's defaults.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CsvReadOptions {
    /// Whether the first line is a header (engine default: `true`).
    #[prost(bool, optional, tag = "1")]
    pub has_header: Option<bool>,
    /// Single ASCII character. Empty means `,`.
    #[prost(string, tag = "2")]
    pub delimiter: String,
    /// Single ASCII character. Empty means `"`.
    #[prost(string, tag = "3")]
    pub quote: String,
    /// Optional single ASCII line terminator.
    #[prost(string, optional, tag = "4")]
    pub terminator: Option<String>,
    /// Optional single ASCII escape character.
    #[prost(string, optional, tag = "5")]
    pub escape: Option<String>,
    /// Optional single ASCII comment prefix.
    #[prost(string, optional, tag = "6")]
    pub comment: Option<String>,
    /// Allow quoted values to span lines.
    #[prost(bool, tag = "7")]
    pub newlines_in_values: bool,
    /// Explicit schema as an IPC stream; empty to infer.
    #[prost(bytes = "vec", tag = "8")]
    pub schema: Vec<u8>,
    /// Rows sampled when inferring the schema.
    #[prost(uint64, optional, tag = "9")]
    pub schema_infer_max_records: Option<u64>,
    /// File extension filter.
    #[prost(string, optional, tag = "10")]
    pub file_extension: Option<String>,
    /// Hive-style partition columns.
    #[prost(message, repeated, tag = "11")]
    pub table_partition_cols: Vec<Field>,
    /// Source compression.
    #[prost(enumeration = "CompressionType", tag = "12")]
    pub file_compression_type: i32,
    /// Orderings the files are already sorted by.
    #[prost(message, repeated, tag = "13")]
    pub file_sort_order: Vec<SortOrder>,
}

/// One sort key of a [`SortOrder`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct SortColumn {
    /// Unqualified column name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Ascending when `true`.
    #[prost(bool, tag = "2")]
    pub ascending: bool,
    /// Nulls sort before other values when `true`.
    #[prost(bool, tag = "3")]
    pub nulls_first: bool,
}

/// A lexicographic ordering over columns.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SortOrder {
    /// Sort keys, most significant first.
    #[prost(message, repeated, tag = "1")]
    pub columns: Vec<SortColumn>,
}

/// Options for registering a newline-delimited JSON source.
#[derive(Clone, PartialEq, prost::Message)]
pub struct JsonReadOptions {
    /// Explicit schema as an IPC stream; empty to infer.
    #[prost(bytes = "vec", tag = "1")]
    pub schema: Vec<u8>,
    /// Rows sampled when inferring the schema.
    #[prost(uint64, optional, tag = "2")]
    pub schema_infer_max_records: Option<u64>,
    /// File extension filter.
    #[prost(string, optional, tag = "3")]
    pub file_extension: Option<String>,
    /// Hive-style partition columns.
    #[prost(message, repeated, tag = "4")]
    pub table_partition_cols: Vec<Field>,
    /// Source compression.
    #[prost(enumeration = "CompressionType", tag = "5")]
    pub file_compression_type: i32,
}

/// Options for registering a Parquet source.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ParquetReadOptions {
    /// File extension filter.
    #[prost(string, optional, tag = "1")]
    pub file_extension: Option<String>,
    /// Hive-style partition columns.
    #[prost(message, repeated, tag = "2")]
    pub table_partition_cols: Vec<Field>,
    /// Row-group pruning from statistics.
    #[prost(bool, optional, tag = "3")]
    pub parquet_pruning: Option<bool>,
    /// Ignore embedded schema metadata.
    #[prost(bool, optional, tag = "4")]
    pub skip_metadata: Option<bool>,
    /// Explicit schema as an IPC stream; empty to use the file's.
    #[prost(bytes = "vec", tag = "5")]
    pub schema: Vec<u8>,
}

/// Options shared by every write sink.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteOptions {
    /// Write one file rather than a directory of parts.
    #[prost(bool, tag = "1")]
    pub single_file_output: bool,
    /// Columns to partition the output by.
    #[prost(string, repeated, tag = "2")]
    pub partition_by: Vec<String>,
}
