//! Conversion of decoded option payloads into DataFusion's option structs.

use crate::wire;
use anyhow::{anyhow, bail, Result};
use datafusion::arrow::datatypes::{DataType, Schema};
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::datasource::file_format::file_compression_type::FileCompressionType;
use datafusion::logical_expr::{ident, SortExpr};

fn single_byte(field: &'static str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => bail!("{field} must be exactly one ASCII character (got {value:?})"),
    }
}

/// An empty string selects the engine default.
fn byte_or(field: &'static str, value: &str, default: u8) -> Result<u8> {
    if value.is_empty() {
        Ok(default)
    } else {
        single_byte(field, value)
    }
}

fn opt_byte(field: &'static str, value: Option<&String>) -> Result<Option<u8>> {
    value.map(|v| single_byte(field, v)).transpose()
}

fn partition_cols(cols: &[wire::Field]) -> Result<Vec<(String, DataType)>> {
    cols.iter()
        .map(|col| {
            let arrow_type = col
                .arrow_type
                .as_deref()
                .ok_or_else(|| anyhow!("Partition column '{}' missing arrow type", col.name))?;
            Ok((col.name.clone(), DataType::try_from(arrow_type)?))
        })
        .collect()
}

fn sort_orders(orders: &[wire::SortOrder]) -> Result<Vec<Vec<SortExpr>>> {
    orders
        .iter()
        .map(|order| {
            order
                .columns
                .iter()
                .map(|column| {
                    if column.name.is_empty() {
                        bail!("sort column name must not be empty");
                    }
                    Ok(ident(column.name.as_str()).sort(column.ascending, column.nulls_first))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

fn compression(raw: i32) -> Result<FileCompressionType> {
    let variant =
        wire::CompressionType::try_from(raw).map_err(|_| anyhow!("invalid CompressionType value: {raw}"))?;
    Ok(match variant {
        wire::CompressionType::Uncompressed => FileCompressionType::UNCOMPRESSED,
        wire::CompressionType::Gzip => FileCompressionType::GZIP,
        wire::CompressionType::Bzip2 => FileCompressionType::BZIP2,
        wire::CompressionType::Xz => FileCompressionType::XZ,
        wire::CompressionType::Zstd => FileCompressionType::ZSTD,
    })
}

pub(crate) fn csv_read_options<'a>(
    options: &'a wire::CsvReadOptions,
    schema: Option<&'a Schema>,
) -> Result<datafusion::prelude::CsvReadOptions<'a>> {
    let mut dfo = datafusion::prelude::CsvReadOptions::new();

    if let Some(has_header) = options.has_header {
        dfo.has_header = has_header;
    }
    dfo.delimiter = byte_or("delimiter", &options.delimiter, dfo.delimiter)?;
    dfo.quote = byte_or("quote", &options.quote, dfo.quote)?;
    dfo.terminator = opt_byte("terminator", options.terminator.as_ref())?;
    dfo.escape = opt_byte("escape", options.escape.as_ref())?;
    dfo.comment = opt_byte("comment", options.comment.as_ref())?;
    dfo.newlines_in_values = options.newlines_in_values;
    dfo.schema = schema;
    if let Some(max) = options.schema_infer_max_records {
        dfo.schema_infer_max_records = max as usize;
    }
    if let Some(extension) = options.file_extension.as_deref() {
        dfo.file_extension = extension;
    }
    dfo.table_partition_cols = partition_cols(&options.table_partition_cols)?;
    dfo.file_compression_type = compression(options.file_compression_type)?;
    dfo.file_sort_order = sort_orders(&options.file_sort_order)?;

    Ok(dfo)
}

pub(crate) fn json_read_options<'a>(
    options: &'a wire::JsonReadOptions,
    schema: Option<&'a Schema>,
) -> Result<datafusion::prelude::NdJsonReadOptions<'a>> {
    let mut dfo = datafusion::prelude::NdJsonReadOptions::default();

    dfo.schema = schema;
    if let Some(max) = options.schema_infer_max_records {
        dfo.schema_infer_max_records = max as usize;
    }
    if let Some(extension) = options.file_extension.as_deref() {
        dfo.file_extension = extension;
    }
    dfo.table_partition_cols = partition_cols(&options.table_partition_cols)?;
    dfo.file_compression_type = compression(options.file_compression_type)?;

    Ok(dfo)
}

pub(crate) fn parquet_read_options<'a>(
    options: &'a wire::ParquetReadOptions,
    schema: Option<&'a Schema>,
) -> Result<datafusion::prelude::ParquetReadOptions<'a>> {
    let mut dfo = datafusion::prelude::ParquetReadOptions::default();

    if let Some(extension) = options.file_extension.as_deref() {
        dfo.file_extension = extension;
    }
    dfo.table_partition_cols = partition_cols(&options.table_partition_cols)?;
    dfo.parquet_pruning = options.parquet_pruning;
    dfo.skip_metadata = options.skip_metadata;
    dfo.schema = schema;

    Ok(dfo)
}

pub(crate) fn write_options(options: &wire::WriteOptions) -> DataFrameWriteOptions {
    DataFrameWriteOptions::new()
        .with_single_file_output(options.single_file_output)
        .with_partition_by(options.partition_by.clone())
}
