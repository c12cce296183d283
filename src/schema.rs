use crate::row::Slice;
use crate::OError;
use std::mem::size_of;

// duplicate-handling mode of the table a memtable belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeysType {
    DupKeys,
    UniqueKeys,
    AggKeys,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    LargeInt,
    Float,
    Double,
    // scaled i128, compared by the scaled value
    Decimal,
    // days, natural ordering
    Date,
    DateTime,
    Char,
    Varchar,
    Hll,
    Bitmap,
}

impl FieldType {
    // hll/bitmap cells hold an aggregate object until flush finalizes them
    pub fn is_object(&self) -> bool {
        matches!(self, FieldType::Hll | FieldType::Bitmap)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, FieldType::Varchar) || self.is_object()
    }

    pub fn valid_key(&self) -> bool {
        !matches!(
            self,
            FieldType::Float | FieldType::Double | FieldType::Hll | FieldType::Bitmap
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggMethod {
    // key columns carry no aggregation
    None,
    Sum,
    Min,
    Max,
    Replace,
    HllUnion,
    BitmapUnion,
}

impl AggMethod {
    pub fn valid_for(&self, ft: FieldType) -> bool {
        match self {
            AggMethod::None | AggMethod::Replace => !ft.is_object(),
            AggMethod::Sum => matches!(
                ft,
                FieldType::TinyInt
                    | FieldType::SmallInt
                    | FieldType::Int
                    | FieldType::BigInt
                    | FieldType::LargeInt
                    | FieldType::Float
                    | FieldType::Double
                    | FieldType::Decimal
            ),
            AggMethod::Min | AggMethod::Max => !ft.is_object(),
            AggMethod::HllUnion => ft == FieldType::Hll,
            AggMethod::BitmapUnion => ft == FieldType::Bitmap,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnSchema {
    pub name: String,
    pub field_type: FieldType,
    pub is_nullable: bool,
    pub agg: AggMethod,
    // byte width of char columns, unused otherwise
    pub length: usize,
}

impl ColumnSchema {
    pub fn new(name: &str, field_type: FieldType, is_nullable: bool, agg: AggMethod) -> Self {
        ColumnSchema {
            name: name.to_string(),
            field_type,
            is_nullable,
            agg,
            length: 0,
        }
    }

    pub fn char(name: &str, length: usize, is_nullable: bool, agg: AggMethod) -> Self {
        ColumnSchema {
            name: name.to_string(),
            field_type: FieldType::Char,
            is_nullable,
            agg,
            length,
        }
    }

    // width of the fixed slot inside a row cell, null byte excluded
    pub fn value_width(&self) -> usize {
        match self.field_type {
            FieldType::TinyInt => 1,
            FieldType::SmallInt => 2,
            FieldType::Int => 4,
            FieldType::BigInt => 8,
            FieldType::LargeInt => 16,
            FieldType::Float => 4,
            FieldType::Double => 8,
            FieldType::Decimal => 16,
            FieldType::Date => 4,
            FieldType::DateTime => 8,
            FieldType::Char => self.length,
            FieldType::Varchar | FieldType::Hll | FieldType::Bitmap => size_of::<Slice>(),
        }
    }

    pub fn cell_width(&self) -> usize {
        1 + self.value_width()
    }
}

// fixed slot plan over a contiguous row buffer. the first
// `num_key_columns` columns are the key prefix.
#[derive(Debug)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
    cell_offsets: Vec<usize>,
    schema_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>, num_key_columns: usize) -> Result<Schema, OError> {
        if num_key_columns == 0 || num_key_columns > columns.len() {
            return Err(OError::Internal(format!(
                "bad key column count {} for {} columns",
                num_key_columns,
                columns.len()
            )));
        }
        for (i, c) in columns.iter().enumerate() {
            if i < num_key_columns {
                if !c.field_type.valid_key() {
                    return Err(OError::Internal(format!(
                        "column '{}' cannot be a key column",
                        c.name
                    )));
                }
                if c.agg != AggMethod::None {
                    return Err(OError::Internal(format!(
                        "key column '{}' must not carry an aggregation",
                        c.name
                    )));
                }
            }
            if !c.agg.valid_for(c.field_type) {
                return Err(OError::Internal(format!(
                    "aggregation {:?} does not apply to column '{}'",
                    c.agg, c.name
                )));
            }
            if c.field_type == FieldType::Char && c.length == 0 {
                return Err(OError::Internal(format!(
                    "char column '{}' needs a length",
                    c.name
                )));
            }
        }
        let mut cell_offsets = Vec::with_capacity(columns.len());
        let mut off = 0;
        for c in columns.iter() {
            cell_offsets.push(off);
            off += c.cell_width();
        }
        Ok(Schema {
            columns,
            num_key_columns,
            cell_offsets,
            schema_size: off,
        })
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, i: usize) -> &ColumnSchema {
        &self.columns[i]
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    // byte size of one encoded row buffer
    pub fn schema_size(&self) -> usize {
        self.schema_size
    }

    pub fn cell_offset(&self, i: usize) -> usize {
        self.cell_offsets[i]
    }
}

#[cfg(test)]
mod test {
    use super::{AggMethod, ColumnSchema, FieldType, Schema};

    #[test]
    fn test_layout() {
        let s = Schema::new(
            vec![
                ColumnSchema::new("k1", FieldType::Int, false, AggMethod::None),
                ColumnSchema::char("k2", 6, true, AggMethod::None),
                ColumnSchema::new("v1", FieldType::BigInt, true, AggMethod::Sum),
                ColumnSchema::new("v2", FieldType::Varchar, true, AggMethod::Replace),
            ],
            2,
        )
        .unwrap();
        assert_eq!(s.cell_offset(0), 0);
        assert_eq!(s.cell_offset(1), 5);
        assert_eq!(s.cell_offset(2), 12);
        assert_eq!(s.cell_offset(3), 21);
        assert_eq!(s.schema_size(), 21 + 1 + 16);
        assert_eq!(s.num_key_columns(), 2);
    }

    #[test]
    fn test_rejects_bad_schemas() {
        // float key
        assert!(Schema::new(
            vec![ColumnSchema::new("k", FieldType::Double, false, AggMethod::None)],
            1
        )
        .is_err());
        // aggregated key
        assert!(Schema::new(
            vec![ColumnSchema::new("k", FieldType::Int, false, AggMethod::Sum)],
            1
        )
        .is_err());
        // sum over varchar
        assert!(Schema::new(
            vec![
                ColumnSchema::new("k", FieldType::Int, false, AggMethod::None),
                ColumnSchema::new("v", FieldType::Varchar, true, AggMethod::Sum),
            ],
            1
        )
        .is_err());
        // hll column with plain replace
        assert!(Schema::new(
            vec![
                ColumnSchema::new("k", FieldType::Int, false, AggMethod::None),
                ColumnSchema::new("v", FieldType::Hll, true, AggMethod::Replace),
            ],
            1
        )
        .is_err());
        // zero key columns
        assert!(Schema::new(
            vec![ColumnSchema::new("k", FieldType::Int, false, AggMethod::None)],
            0
        )
        .is_err());
    }
}
