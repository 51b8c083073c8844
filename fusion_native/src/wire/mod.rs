//! Protobuf messages exchanged with hosts: option payloads for sources and
//! sinks, and the column type description used inside them.

mod options;
mod types;

pub use options::{
    CompressionType, CsvReadOptions, JsonReadOptions, ParquetReadOptions, SortColumn, SortOrder, WriteOptions,
};
pub use types::{
    arrow_type, ArrowType, Decimal, Dictionary, Empty, Field, FixedSizeList, IntervalUnit, List, Map, Struct,
    TimeUnit, Timestamp, Union, UnionMode,
};
