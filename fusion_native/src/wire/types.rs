//! The column type sum type. Every Arrow [`DataType`] with a wire
//! representation maps to exactly one [`arrow_type::ArrowTypeEnum`] variant;
//! both directions are exhaustive matches, so adding a variant on either
//! side fails the build until it is mapped.

use anyhow::{anyhow, bail, Result};
use arrow_schema::{
    DataType, Field as ArrowField, Fields, IntervalUnit as ArrowIntervalUnit, TimeUnit as ArrowTimeUnit,
    UnionFields, UnionMode as ArrowUnionMode,
};
use arrow_type::ArrowTypeEnum;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Marker payload for variants without parameters.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Empty {}

/// Time resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TimeUnit {
    /// Seconds.
    Second = 0,
    /// Milliseconds.
    Millisecond = 1,
    /// Microseconds.
    Microsecond = 2,
    /// Nanoseconds.
    Nanosecond = 3,
}

/// Interval resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum IntervalUnit {
    /// Months.
    YearMonth = 0,
    /// Days and milliseconds.
    DayTime = 1,
    /// Months, days and nanoseconds.
    MonthDayNano = 2,
}

/// Union layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum UnionMode {
    /// Every child has one slot per row.
    Sparse = 0,
    /// Children are addressed through offsets.
    Dense = 1,
}

/// A named, typed column.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Field {
    /// Column name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Column type. Required.
    #[prost(message, optional, boxed, tag = "2")]
    pub arrow_type: Option<Box<ArrowType>>,
    /// Whether the column may hold nulls.
    #[prost(bool, tag = "3")]
    pub nullable: bool,
    /// Free-form key/value metadata.
    #[prost(map = "string, string", tag = "4")]
    pub metadata: HashMap<String, String>,
}

/// Timestamp parameters. An empty timezone means "none".
#[derive(Clone, PartialEq, prost::Message)]
pub struct Timestamp {
    /// Resolution.
    #[prost(enumeration = "TimeUnit", tag = "1")]
    pub time_unit: i32,
    /// IANA name or fixed offset.
    #[prost(string, tag = "2")]
    pub timezone: String,
}

/// Decimal parameters.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Decimal {
    /// Total digits.
    #[prost(uint32, tag = "1")]
    pub precision: u32,
    /// Digits after the decimal point.
    #[prost(int32, tag = "2")]
    pub scale: i32,
}

/// Variable length list (32 or 64 bit offsets).
#[derive(Clone, PartialEq, prost::Message)]
pub struct List {
    /// Element field.
    #[prost(message, optional, boxed, tag = "1")]
    pub field_type: Option<Box<Field>>,
}

/// Fixed length list.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FixedSizeList {
    /// Element field.
    #[prost(message, optional, boxed, tag = "1")]
    pub field_type: Option<Box<Field>>,
    /// Elements per list.
    #[prost(int32, tag = "2")]
    pub list_size: i32,
}

/// Nested record.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Struct {
    /// Child fields, in order.
    #[prost(message, repeated, tag = "1")]
    pub sub_field_types: Vec<Field>,
}

/// Tagged union.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Union {
    /// Child fields, one per type id.
    #[prost(message, repeated, tag = "1")]
    pub union_types: Vec<Field>,
    /// Layout.
    #[prost(enumeration = "UnionMode", tag = "2")]
    pub union_mode: i32,
    /// Type id of each child.
    #[prost(int32, repeated, tag = "3")]
    pub type_ids: Vec<i32>,
}

/// Dictionary encoded values.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Dictionary {
    /// Index type.
    #[prost(message, optional, boxed, tag = "1")]
    pub key: Option<Box<ArrowType>>,
    /// Value type.
    #[prost(message, optional, boxed, tag = "2")]
    pub value: Option<Box<ArrowType>>,
}

/// Key/value map.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Map {
    /// The entries struct field.
    #[prost(message, optional, boxed, tag = "1")]
    pub field_type: Option<Box<Field>>,
    /// Whether keys are sorted.
    #[prost(bool, tag = "2")]
    pub keys_sorted: bool,
}

/// A column type.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ArrowType {
    /// The type. Required.
    #[prost(
        oneof = "arrow_type::ArrowTypeEnum",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36"
    )]
    pub arrow_type_enum: Option<ArrowTypeEnum>,
}

/// The variants of [`ArrowType`].
pub mod arrow_type {
    /// Closed set of column types.
    #[allow(missing_docs)]
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum ArrowTypeEnum {
        #[prost(message, tag = "1")]
        None(super::Empty),
        #[prost(message, tag = "2")]
        Bool(super::Empty),
        #[prost(message, tag = "3")]
        Uint8(super::Empty),
        #[prost(message, tag = "4")]
        Int8(super::Empty),
        #[prost(message, tag = "5")]
        Uint16(super::Empty),
        #[prost(message, tag = "6")]
        Int16(super::Empty),
        #[prost(message, tag = "7")]
        Uint32(super::Empty),
        #[prost(message, tag = "8")]
        Int32(super::Empty),
        #[prost(message, tag = "9")]
        Uint64(super::Empty),
        #[prost(message, tag = "10")]
        Int64(super::Empty),
        #[prost(message, tag = "11")]
        Float16(super::Empty),
        #[prost(message, tag = "12")]
        Float32(super::Empty),
        #[prost(message, tag = "13")]
        Float64(super::Empty),
        #[prost(message, tag = "14")]
        Utf8(super::Empty),
        #[prost(message, tag = "15")]
        LargeUtf8(super::Empty),
        #[prost(message, tag = "16")]
        Utf8View(super::Empty),
        #[prost(message, tag = "17")]
        Binary(super::Empty),
        #[prost(message, tag = "18")]
        LargeBinary(super::Empty),
        #[prost(message, tag = "19")]
        BinaryView(super::Empty),
        #[prost(int32, tag = "20")]
        FixedSizeBinary(i32),
        #[prost(message, tag = "21")]
        Date32(super::Empty),
        #[prost(message, tag = "22")]
        Date64(super::Empty),
        #[prost(enumeration = "super::TimeUnit", tag = "23")]
        Time32(i32),
        #[prost(enumeration = "super::TimeUnit", tag = "24")]
        Time64(i32),
        #[prost(enumeration = "super::TimeUnit", tag = "25")]
        Duration(i32),
        #[prost(message, tag = "26")]
        Timestamp(super::Timestamp),
        #[prost(enumeration = "super::IntervalUnit", tag = "27")]
        Interval(i32),
        #[prost(message, tag = "28")]
        Decimal128(super::Decimal),
        #[prost(message, tag = "29")]
        Decimal256(super::Decimal),
        #[prost(message, tag = "30")]
        List(Box<super::List>),
        #[prost(message, tag = "31")]
        LargeList(Box<super::List>),
        #[prost(message, tag = "32")]
        FixedSizeList(Box<super::FixedSizeList>),
        #[prost(message, tag = "33")]
        Struct(super::Struct),
        #[prost(message, tag = "34")]
        Union(super::Union),
        #[prost(message, tag = "35")]
        Dictionary(Box<super::Dictionary>),
        #[prost(message, tag = "36")]
        Map(Box<super::Map>),
    }
}

fn time_unit(raw: i32) -> Result<ArrowTimeUnit> {
    let unit = TimeUnit::try_from(raw).map_err(|_| anyhow!("invalid TimeUnit value: {raw}"))?;
    Ok(match unit {
        TimeUnit::Second => ArrowTimeUnit::Second,
        TimeUnit::Millisecond => ArrowTimeUnit::Millisecond,
        TimeUnit::Microsecond => ArrowTimeUnit::Microsecond,
        TimeUnit::Nanosecond => ArrowTimeUnit::Nanosecond,
    })
}

impl From<&ArrowTimeUnit> for TimeUnit {
    fn from(value: &ArrowTimeUnit) -> Self {
        match value {
            ArrowTimeUnit::Second => TimeUnit::Second,
            ArrowTimeUnit::Millisecond => TimeUnit::Millisecond,
            ArrowTimeUnit::Microsecond => TimeUnit::Microsecond,
            ArrowTimeUnit::Nanosecond => TimeUnit::Nanosecond,
        }
    }
}

fn interval_unit(raw: i32) -> Result<ArrowIntervalUnit> {
    let unit = IntervalUnit::try_from(raw).map_err(|_| anyhow!("invalid IntervalUnit value: {raw}"))?;
    Ok(match unit {
        IntervalUnit::YearMonth => ArrowIntervalUnit::YearMonth,
        IntervalUnit::DayTime => ArrowIntervalUnit::DayTime,
        IntervalUnit::MonthDayNano => ArrowIntervalUnit::MonthDayNano,
    })
}

impl From<&ArrowIntervalUnit> for IntervalUnit {
    fn from(value: &ArrowIntervalUnit) -> Self {
        match value {
            ArrowIntervalUnit::YearMonth => IntervalUnit::YearMonth,
            ArrowIntervalUnit::DayTime => IntervalUnit::DayTime,
            ArrowIntervalUnit::MonthDayNano => IntervalUnit::MonthDayNano,
        }
    }
}

fn decimal(d: &Decimal) -> Result<(u8, i8)> {
    let precision = u8::try_from(d.precision).map_err(|_| anyhow!("decimal precision {} out of range", d.precision))?;
    let scale = i8::try_from(d.scale).map_err(|_| anyhow!("decimal scale {} out of range", d.scale))?;
    Ok((precision, scale))
}

fn child_field(field: &Option<Box<Field>>) -> Result<Arc<ArrowField>> {
    let field = field.as_deref().ok_or_else(|| anyhow!("nested type is missing its child field"))?;
    Ok(Arc::new(ArrowField::try_from(field)?))
}

fn inner_type(arrow_type: &Option<Box<ArrowType>>) -> Result<Box<DataType>> {
    let arrow_type = arrow_type.as_deref().ok_or_else(|| anyhow!("dictionary is missing a key or value type"))?;
    Ok(Box::new(DataType::try_from(arrow_type)?))
}

fn fields(fields: &[Field]) -> Result<Fields> {
    fields.iter().map(ArrowField::try_from).collect::<Result<Vec<_>>>().map(Fields::from)
}

fn union_fields(union: &Union) -> Result<UnionFields> {
    if union.type_ids.len() != union.union_types.len() {
        bail!(
            "union has {} type ids for {} fields",
            union.type_ids.len(),
            union.union_types.len()
        );
    }
    let mut seen = HashSet::new();
    let mut type_ids = Vec::with_capacity(union.type_ids.len());
    for id in &union.type_ids {
        let id = i8::try_from(*id).map_err(|_| anyhow!("union type id {id} out of range"))?;
        if !seen.insert(id) {
            bail!("duplicate union type id {id}");
        }
        type_ids.push(id);
    }
    let children = union.union_types.iter().map(ArrowField::try_from).collect::<Result<Vec<_>>>()?;
    Ok(UnionFields::new(type_ids, children))
}

fn union_mode(raw: i32) -> Result<ArrowUnionMode> {
    let mode = UnionMode::try_from(raw).map_err(|_| anyhow!("invalid UnionMode value: {raw}"))?;
    Ok(match mode {
        UnionMode::Sparse => ArrowUnionMode::Sparse,
        UnionMode::Dense => ArrowUnionMode::Dense,
    })
}

impl From<&ArrowUnionMode> for UnionMode {
    fn from(value: &ArrowUnionMode) -> Self {
        match value {
            ArrowUnionMode::Sparse => UnionMode::Sparse,
            ArrowUnionMode::Dense => UnionMode::Dense,
        }
    }
}

impl TryFrom<&ArrowType> for DataType {
    type Error = anyhow::Error;

    fn try_from(value: &ArrowType) -> Result<Self> {
        let variant = value
            .arrow_type_enum
            .as_ref()
            .ok_or_else(|| anyhow!("ArrowType has no variant set"))?;

        Ok(match variant {
            ArrowTypeEnum::None(_) => DataType::Null,
            ArrowTypeEnum::Bool(_) => DataType::Boolean,
            ArrowTypeEnum::Uint8(_) => DataType::UInt8,
            ArrowTypeEnum::Int8(_) => DataType::Int8,
            ArrowTypeEnum::Uint16(_) => DataType::UInt16,
            ArrowTypeEnum::Int16(_) => DataType::Int16,
            ArrowTypeEnum::Uint32(_) => DataType::UInt32,
            ArrowTypeEnum::Int32(_) => DataType::Int32,
            ArrowTypeEnum::Uint64(_) => DataType::UInt64,
            ArrowTypeEnum::Int64(_) => DataType::Int64,
            ArrowTypeEnum::Float16(_) => DataType::Float16,
            ArrowTypeEnum::Float32(_) => DataType::Float32,
            ArrowTypeEnum::Float64(_) => DataType::Float64,
            ArrowTypeEnum::Utf8(_) => DataType::Utf8,
            ArrowTypeEnum::LargeUtf8(_) => DataType::LargeUtf8,
            ArrowTypeEnum::Utf8View(_) => DataType::Utf8View,
            ArrowTypeEnum::Binary(_) => DataType::Binary,
            ArrowTypeEnum::LargeBinary(_) => DataType::LargeBinary,
            ArrowTypeEnum::BinaryView(_) => DataType::BinaryView,
            ArrowTypeEnum::FixedSizeBinary(size) => DataType::FixedSizeBinary(*size),
            ArrowTypeEnum::Date32(_) => DataType::Date32,
            ArrowTypeEnum::Date64(_) => DataType::Date64,
            ArrowTypeEnum::Time32(unit) => DataType::Time32(time_unit(*unit)?),
            ArrowTypeEnum::Time64(unit) => DataType::Time64(time_unit(*unit)?),
            ArrowTypeEnum::Duration(unit) => DataType::Duration(time_unit(*unit)?),
            ArrowTypeEnum::Timestamp(ts) => {
                let tz = (!ts.timezone.is_empty()).then(|| Arc::from(ts.timezone.as_str()));
                DataType::Timestamp(time_unit(ts.time_unit)?, tz)
            }
            ArrowTypeEnum::Interval(unit) => DataType::Interval(interval_unit(*unit)?),
            ArrowTypeEnum::Decimal128(d) => {
                let (precision, scale) = decimal(d)?;
                DataType::Decimal128(precision, scale)
            }
            ArrowTypeEnum::Decimal256(d) => {
                let (precision, scale) = decimal(d)?;
                DataType::Decimal256(precision, scale)
            }
            ArrowTypeEnum::List(list) => DataType::List(child_field(&list.field_type)?),
            ArrowTypeEnum::LargeList(list) => DataType::LargeList(child_field(&list.field_type)?),
            ArrowTypeEnum::FixedSizeList(list) => {
                DataType::FixedSizeList(child_field(&list.field_type)?, list.list_size)
            }
            ArrowTypeEnum::Struct(s) => DataType::Struct(fields(&s.sub_field_types)?),
            ArrowTypeEnum::Union(u) => DataType::Union(union_fields(u)?, union_mode(u.union_mode)?),
            ArrowTypeEnum::Dictionary(d) => DataType::Dictionary(inner_type(&d.key)?, inner_type(&d.value)?),
            ArrowTypeEnum::Map(m) => DataType::Map(child_field(&m.field_type)?, m.keys_sorted),
        })
    }
}

fn wire_child(field: &ArrowField) -> Result<Option<Box<Field>>> {
    Ok(Some(Box::new(Field::try_from(field)?)))
}

fn wire_type(data_type: &DataType) -> Result<Option<Box<ArrowType>>> {
    Ok(Some(Box::new(ArrowType::try_from(data_type)?)))
}

impl TryFrom<&DataType> for ArrowType {
    type Error = anyhow::Error;

    fn try_from(value: &DataType) -> Result<Self> {
        let variant = match value {
            DataType::Null => ArrowTypeEnum::None(Empty {}),
            DataType::Boolean => ArrowTypeEnum::Bool(Empty {}),
            DataType::UInt8 => ArrowTypeEnum::Uint8(Empty {}),
            DataType::Int8 => ArrowTypeEnum::Int8(Empty {}),
            DataType::UInt16 => ArrowTypeEnum::Uint16(Empty {}),
            DataType::Int16 => ArrowTypeEnum::Int16(Empty {}),
            DataType::UInt32 => ArrowTypeEnum::Uint32(Empty {}),
            DataType::Int32 => ArrowTypeEnum::Int32(Empty {}),
            DataType::UInt64 => ArrowTypeEnum::Uint64(Empty {}),
            DataType::Int64 => ArrowTypeEnum::Int64(Empty {}),
            DataType::Float16 => ArrowTypeEnum::Float16(Empty {}),
            DataType::Float32 => ArrowTypeEnum::Float32(Empty {}),
            DataType::Float64 => ArrowTypeEnum::Float64(Empty {}),
            DataType::Utf8 => ArrowTypeEnum::Utf8(Empty {}),
            DataType::LargeUtf8 => ArrowTypeEnum::LargeUtf8(Empty {}),
            DataType::Utf8View => ArrowTypeEnum::Utf8View(Empty {}),
            DataType::Binary => ArrowTypeEnum::Binary(Empty {}),
            DataType::LargeBinary => ArrowTypeEnum::LargeBinary(Empty {}),
            DataType::BinaryView => ArrowTypeEnum::BinaryView(Empty {}),
            DataType::FixedSizeBinary(size) => ArrowTypeEnum::FixedSizeBinary(*size),
            DataType::Date32 => ArrowTypeEnum::Date32(Empty {}),
            DataType::Date64 => ArrowTypeEnum::Date64(Empty {}),
            DataType::Time32(unit) => ArrowTypeEnum::Time32(TimeUnit::from(unit) as i32),
            DataType::Time64(unit) => ArrowTypeEnum::Time64(TimeUnit::from(unit) as i32),
            DataType::Duration(unit) => ArrowTypeEnum::Duration(TimeUnit::from(unit) as i32),
            DataType::Timestamp(unit, tz) => ArrowTypeEnum::Timestamp(Timestamp {
                time_unit: TimeUnit::from(unit) as i32,
                timezone: tz.as_deref().unwrap_or_default().to_string(),
            }),
            DataType::Interval(unit) => ArrowTypeEnum::Interval(IntervalUnit::from(unit) as i32),
            DataType::Decimal128(precision, scale) => ArrowTypeEnum::Decimal128(Decimal {
                precision: u32::from(*precision),
                scale: i32::from(*scale),
            }),
            DataType::Decimal256(precision, scale) => ArrowTypeEnum::Decimal256(Decimal {
                precision: u32::from(*precision),
                scale: i32::from(*scale),
            }),
            DataType::List(field) => ArrowTypeEnum::List(Box::new(List {
                field_type: wire_child(field)?,
            })),
            DataType::LargeList(field) => ArrowTypeEnum::LargeList(Box::new(List {
                field_type: wire_child(field)?,
            })),
            DataType::FixedSizeList(field, size) => ArrowTypeEnum::FixedSizeList(Box::new(FixedSizeList {
                field_type: wire_child(field)?,
                list_size: *size,
            })),
            DataType::Struct(children) => ArrowTypeEnum::Struct(Struct {
                sub_field_types: children
                    .iter()
                    .map(|f| Field::try_from(f.as_ref()))
                    .collect::<Result<Vec<_>>>()?,
            }),
            DataType::Union(children, mode) => ArrowTypeEnum::Union(Union {
                union_types: children
                    .iter()
                    .map(|(_, f)| Field::try_from(f.as_ref()))
                    .collect::<Result<Vec<_>>>()?,
                union_mode: UnionMode::from(mode) as i32,
                type_ids: children.iter().map(|(id, _)| i32::from(id)).collect(),
            }),
            DataType::Dictionary(key, value) => ArrowTypeEnum::Dictionary(Box::new(Dictionary {
                key: wire_type(key)?,
                value: wire_type(value)?,
            })),
            DataType::Map(field, keys_sorted) => ArrowTypeEnum::Map(Box::new(Map {
                field_type: wire_child(field)?,
                keys_sorted: *keys_sorted,
            })),
            DataType::ListView(_) => bail!("ListView has no wire representation"),
            DataType::LargeListView(_) => bail!("LargeListView has no wire representation"),
            DataType::RunEndEncoded(_, _) => bail!("RunEndEncoded has no wire representation"),
        };
        Ok(ArrowType {
            arrow_type_enum: Some(variant),
        })
    }
}

impl TryFrom<&Field> for ArrowField {
    type Error = anyhow::Error;

    fn try_from(value: &Field) -> Result<Self> {
        let arrow_type = value
            .arrow_type
            .as_deref()
            .ok_or_else(|| anyhow!("field '{}' is missing its arrow type", value.name))?;
        let data_type = DataType::try_from(arrow_type)?;
        Ok(ArrowField::new(&value.name, data_type, value.nullable).with_metadata(value.metadata.clone()))
    }
}

impl TryFrom<&ArrowField> for Field {
    type Error = anyhow::Error;

    fn try_from(value: &ArrowField) -> Result<Self> {
        Ok(Field {
            name: value.name().clone(),
            arrow_type: wire_type(value.data_type())?,
            nullable: value.is_nullable(),
            metadata: value.metadata().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn through_wire(data_type: &DataType) -> DataType {
        let wire = ArrowType::try_from(data_type).unwrap();
        let bytes = wire.encode_to_vec();
        let decoded = ArrowType::decode(bytes.as_slice()).unwrap();
        DataType::try_from(&decoded).unwrap()
    }

    #[test]
    fn nested_types_survive_encoding() {
        let entries = ArrowField::new(
            "entries",
            DataType::Struct(Fields::from(vec![
                ArrowField::new("key", DataType::Utf8, false),
                ArrowField::new("value", DataType::Decimal128(12, 3), true),
            ])),
            false,
        );
        let map = DataType::Map(Arc::new(entries), false);
        assert_eq!(through_wire(&map), map);

        let list = DataType::LargeList(Arc::new(ArrowField::new(
            "item",
            DataType::Timestamp(ArrowTimeUnit::Microsecond, Some("UTC".into())),
            true,
        )));
        assert_eq!(through_wire(&list), list);

        let dictionary = DataType::Dictionary(Box::new(DataType::Int16), Box::new(DataType::Utf8View));
        assert_eq!(through_wire(&dictionary), dictionary);
    }

    #[test]
    fn union_keeps_type_ids() {
        let union = DataType::Union(
            UnionFields::new(
                vec![5, 9],
                vec![
                    ArrowField::new("a", DataType::Int32, true),
                    ArrowField::new("b", DataType::Interval(ArrowIntervalUnit::MonthDayNano), true),
                ],
            ),
            ArrowUnionMode::Dense,
        );
        assert_eq!(through_wire(&union), union);
    }

    #[test]
    fn run_end_encoded_is_rejected() {
        let ree = DataType::RunEndEncoded(
            Arc::new(ArrowField::new("run_ends", DataType::Int32, false)),
            Arc::new(ArrowField::new("values", DataType::Utf8, true)),
        );
        assert!(ArrowType::try_from(&ree).is_err());
    }

    #[test]
    fn unset_variant_is_an_error() {
        let empty = ArrowType { arrow_type_enum: None };
        assert!(DataType::try_from(&empty).is_err());
    }

    #[test]
    fn duplicate_union_ids_are_rejected() {
        let int_field = Field::try_from(&ArrowField::new("a", DataType::Int8, true)).unwrap();
        let wire = ArrowType {
            arrow_type_enum: Some(ArrowTypeEnum::Union(Union {
                union_types: vec![int_field.clone(), int_field],
                union_mode: UnionMode::Sparse as i32,
                type_ids: vec![1, 1],
            })),
        };
        assert!(DataType::try_from(&wire).is_err());
    }
}
