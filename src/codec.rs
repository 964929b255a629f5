//! Fixed-width row encoding.
//!
//! A row is stored as one block of `row_size` bytes. Every field takes a
//! presence flag byte (`1` when the value is non-null) directly followed by
//! its value slot:
//!
//! ```text
//! | flag0 | value0 | flag1 | value1 | ... | flagN | valueN |
//! ```
//!
//! Numeric slots use the codec's [Endianness]. Booleans and characters take
//! one byte. Text takes exactly its declared length, right-padded with NUL.
//! A null field stores its type's default value, the flag alone decides
//! whether the field reads back as null. No alignment padding is inserted.

use std::collections::HashMap;
use std::sync::Arc;

use bitvec::prelude::*;
use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::error::{DbError, Result};
use crate::schema::Schema;
use crate::value::Value;

/// Largest encoded row, flags included.
pub const MAX_ROW_SIZE: usize = 1 << 24;

/// Byte order of the numeric slots of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Big,
    Little,
    /// Byte order of the machine that writes the rows.
    Native,
}

/// A logical row handed to the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Values in schema column order, one per column.
    Positional(Vec<Value>),
    /// Values keyed by column name. Missing columns are null.
    Named(HashMap<String, Value>),
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<HashMap<String, Value>> for Row {
    fn from(values: HashMap<String, Value>) -> Self {
        Self::Named(values)
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSlot {
    /// Offset of the presence flag; the value starts one byte later.
    offset: usize,
    width: usize,
    data_type: DataType,
}

/// Encoder/decoder between logical rows and fixed-size byte blocks.
#[derive(Debug, Clone)]
pub struct RowCodec {
    schema: Schema,
    endian: Endianness,
    fields: Vec<FieldSlot>,
    row_size: usize,
}

impl RowCodec {
    /// Computes the row layout of `schema`.
    ///
    /// # Errors
    /// Returns [DbError::Schema] if the schema has no column, if a text
    /// column has no declared length, or if a row would exceed
    /// [MAX_ROW_SIZE] bytes.
    pub fn new(schema: &Schema, endian: Endianness) -> Result<Self> {
        if schema.is_empty() {
            return Err(DbError::schema("a row needs at least one column"));
        }

        let mut fields = Vec::with_capacity(schema.len());
        let mut offset = 0;
        for col in schema.columns() {
            let width = col.data_type.width().ok_or_else(|| {
                DbError::schema(format!(
                    "column {:?} of type {} needs a length",
                    col.name, col.data_type
                ))
            })?;
            fields.push(FieldSlot {
                offset,
                width,
                data_type: col.data_type,
            });
            offset = offset
                .checked_add(1 + width)
                .filter(|&size| size <= MAX_ROW_SIZE)
                .ok_or_else(|| {
                    DbError::schema(format!("rows of {schema} exceed {MAX_ROW_SIZE} bytes"))
                })?;
        }

        Ok(Self {
            schema: schema.clone(),
            endian,
            fields,
            row_size: offset,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    /// Size in bytes of every encoded row.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Expands `row` to the full schema order and validates every value.
    ///
    /// # Errors
    /// Returns [DbError::Schema] for a positional row of the wrong arity, a
    /// named row with an unknown column, or a value its column rejects.
    pub fn normalize(&self, row: Row) -> Result<Vec<Value>> {
        let values = match row {
            Row::Positional(values) => {
                if values.len() != self.schema.len() {
                    return Err(DbError::schema(format!(
                        "row has {} values but the schema has {} columns",
                        values.len(),
                        self.schema.len()
                    )));
                }
                values
            }
            Row::Named(named) => {
                let mut by_name: HashMap<String, Value> = HashMap::with_capacity(named.len());
                for (key, value) in named {
                    let key = key.to_lowercase();
                    if by_name.contains_key(&key) {
                        return Err(DbError::schema(format!(
                            "column {key:?} is given more than once"
                        )));
                    }
                    by_name.insert(key, value);
                }
                if let Some(unknown) = by_name.keys().find(|k| self.schema.position(k).is_none()) {
                    return Err(DbError::schema(format!("unknown column {unknown:?}")));
                }
                self.schema
                    .columns()
                    .iter()
                    .map(|col| by_name.remove(&col.name).unwrap_or(Value::Null))
                    .collect()
            }
        };

        for (col, value) in self.schema.columns().iter().zip(&values) {
            col.data_type.validate(value).map_err(|e| match e {
                DbError::Schema(msg) => DbError::Schema(format!("column {:?}: {msg}", col.name)),
                other => other,
            })?;
        }
        Ok(values)
    }

    /// Encodes `row` into a block of exactly [RowCodec::row_size] bytes.
    ///
    /// # Example
    /// ```
    /// # use flatdb::{DataType, Endianness, RowCodec, Schema, Value};
    /// let schema = Schema::new([("a", DataType::Int32), ("b", DataType::Bool)]).unwrap();
    /// let codec = RowCodec::new(&schema, Endianness::Big).unwrap();
    ///
    /// let bytes = codec.encode(vec![Value::Int32(1), Value::Null].into()).unwrap();
    /// assert_eq!(bytes, [1, 0, 0, 0, 1, 0, 0]);
    /// assert_eq!(codec.decode(&bytes).unwrap(), vec![Value::Int32(1), Value::Null]);
    /// ```
    pub fn encode(&self, row: Row) -> Result<Vec<u8>> {
        let values = self.normalize(row)?;
        Ok(match self.endian {
            Endianness::Big => self.pack::<BigEndian>(&values),
            Endianness::Little => self.pack::<LittleEndian>(&values),
            Endianness::Native => self.pack::<NativeEndian>(&values),
        })
    }

    /// Decodes a block produced by [RowCodec::encode] into values in schema
    /// order.
    ///
    /// # Errors
    /// Returns [DbError::Decode] if `bytes` is not exactly one row long and
    /// [DbError::Corruption] if a text slot is not valid UTF-8.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>> {
        let present = self.presence(bytes)?;
        match self.endian {
            Endianness::Big => self.unpack::<BigEndian>(bytes, &present),
            Endianness::Little => self.unpack::<LittleEndian>(bytes, &present),
            Endianness::Native => self.unpack::<NativeEndian>(bytes, &present),
        }
    }

    /// Reads only the presence flags of a block: bit `i` is set when field
    /// `i` holds a value.
    pub fn presence(&self, bytes: &[u8]) -> Result<BitVec> {
        self.check_len(bytes)?;
        Ok(self.fields.iter().map(|f| bytes[f.offset] != 0).collect())
    }

    fn check_len(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.row_size {
            return Err(DbError::Decode {
                expected: self.row_size,
                actual: bytes.len(),
            });
        }
        Ok(())
    }

    fn pack<B: ByteOrder>(&self, values: &[Value]) -> Vec<u8> {
        // Zeroed buffer: null text and unused text tail are already padding.
        let mut buf = vec![0u8; self.row_size];
        for (field, value) in self.fields.iter().zip(values) {
            buf[field.offset] = u8::from(!value.is_null());
            let slot = &mut buf[field.offset + 1..field.offset + 1 + field.width];
            if value.is_null() {
                write_slot::<B>(slot, &field.data_type.default_value());
            } else {
                write_slot::<B>(slot, value);
            }
        }
        buf
    }

    fn unpack<B: ByteOrder>(&self, bytes: &[u8], present: &BitSlice) -> Result<Vec<Value>> {
        self.fields
            .iter()
            .zip(present.iter().by_vals())
            .map(|(field, is_present)| {
                if !is_present {
                    return Ok(Value::Null);
                }
                let slot = &bytes[field.offset + 1..field.offset + 1 + field.width];
                read_slot::<B>(field.data_type, slot)
            })
            .collect()
    }
}

fn write_slot<B: ByteOrder>(slot: &mut [u8], value: &Value) {
    match value {
        Value::Null => {}
        Value::Int32(v) => B::write_i32(slot, *v),
        Value::Int64(v) => B::write_i64(slot, *v),
        Value::Float32(v) => B::write_f32(slot, *v),
        Value::Float64(v) => B::write_f64(slot, *v),
        Value::Bool(v) => slot[0] = u8::from(*v),
        // validated as ASCII
        Value::Char(c) => slot[0] = u8::try_from(*c).unwrap_or_default(),
        Value::Text(s) => slot[..s.len()].copy_from_slice(s.as_bytes()),
    }
}

fn read_slot<B: ByteOrder>(data_type: DataType, slot: &[u8]) -> Result<Value> {
    Ok(match data_type {
        DataType::Int32 => Value::Int32(B::read_i32(slot)),
        DataType::Int64 => Value::Int64(B::read_i64(slot)),
        DataType::Float32 => Value::Float32(B::read_f32(slot)),
        DataType::Float64 => Value::Float64(B::read_f64(slot)),
        DataType::Bool => Value::Bool(slot[0] != 0),
        DataType::Char => Value::Char(char::from(slot[0])),
        DataType::Text(_) => {
            let end = slot.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            let text = std::str::from_utf8(&slot[..end])
                .map_err(|e| DbError::corruption(format!("text slot is not UTF-8: {e}")))?;
            Value::Text(Arc::from(text))
        }
    })
}
