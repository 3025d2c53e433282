//! Serializer that flattens any `Serialize` type into a [`Value`] tree.
//!
//! This is how caller-supplied struct defaults become a mergeable tree before
//! binding: serde's rename and skip attributes carry the field-naming rules,
//! so a struct default flattens under exactly the same keys as the
//! destination fields.

use serde::ser::{self, Serialize};

use crate::error::{Error, Result};

use super::{Table, Value};

/// Serialize `value` into a [`Value`] tree.
///
/// # Errors
///
/// Returns [`Error::Bind`] when the type cannot be represented as a
/// configuration value (for example a map with composite keys).
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    value.serialize(ValueSerializer)
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;
    type SerializeSeq = SeqCollector;
    type SerializeTuple = SeqCollector;
    type SerializeTupleStruct = SeqCollector;
    type SerializeTupleVariant = VariantSeqCollector;
    type SerializeMap = MapCollector;
    type SerializeStruct = MapCollector;
    type SerializeStructVariant = VariantMapCollector;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::Uint(u64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::Uint(u64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::Uint(u64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::Uint(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::Array(
            v.iter().map(|b| Value::Uint(u64::from(*b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        let mut table = Table::new();
        table.insert(variant.to_owned(), value.serialize(ValueSerializer)?);
        Ok(Value::Table(table))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCollector> {
        Ok(SeqCollector {
            items: Vec::with_capacity(len.unwrap_or_default()),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCollector> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqCollector> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqCollector> {
        Ok(VariantSeqCollector {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapCollector> {
        Ok(MapCollector {
            name: None,
            table: Table::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<MapCollector> {
        Ok(MapCollector {
            name: Some(name),
            table: Table::new(),
            pending_key: None,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapCollector> {
        Ok(VariantMapCollector {
            variant,
            table: Table::new(),
        })
    }
}

struct SeqCollector {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqCollector {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        let mut table = Table::new();
        table.insert(self.variant.to_owned(), Value::Array(self.items));
        Ok(Value::Table(table))
    }
}

struct MapCollector {
    name: Option<&'static str>,
    table: Table,
    pending_key: Option<String>,
}

/// std's `Duration` and `SystemTime` serialize as two-field structs;
/// rebuild the native variants so they survive a round trip through
/// [`to_value`] and back.
fn rebuild_time_value(name: Option<&'static str>, table: &Table) -> Option<Value> {
    let part = |key: &str| table.get(key).and_then(|v| crate::convert::to_u64(v).ok());
    match name {
        Some("Duration") if table.len() == 2 => {
            let secs = part("secs")?;
            let nanos = u32::try_from(part("nanos")?).ok()?;
            Some(Value::Duration(std::time::Duration::new(secs, nanos)))
        }
        Some("SystemTime") if table.len() == 2 => {
            let secs = part("secs_since_epoch")?;
            let nanos = u32::try_from(part("nanos_since_epoch")?).ok()?;
            Some(Value::Timestamp(
                std::time::UNIX_EPOCH + std::time::Duration::new(secs, nanos),
            ))
        }
        _ => None,
    }
}

impl ser::SerializeMap for MapCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        let key = match key.serialize(ValueSerializer)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            scalar @ (Value::Bool(_)
            | Value::Int(_)
            | Value::Uint(_)
            | Value::Float(_)
            | Value::Duration(_)
            | Value::Timestamp(_)) => crate::convert::to_string_lossy(&scalar),
            other => {
                return Err(Error::unsupported(format!(
                    "{} map key",
                    other.type_name()
                )));
            }
        };
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::bind("map value serialized before its key"))?;
        self.table.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Table(self.table))
    }
}

impl ser::SerializeStruct for MapCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.table
            .insert(key.to_owned(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        if let Some(rebuilt) = rebuild_time_value(self.name, &self.table) {
            return Ok(rebuilt);
        }
        Ok(Value::Table(self.table))
    }
}

struct VariantMapCollector {
    variant: &'static str,
    table: Table,
}

impl ser::SerializeStructVariant for VariantMapCollector {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.table
            .insert(key.to_owned(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        let mut outer = Table::new();
        outer.insert(self.variant.to_owned(), Value::Table(self.table));
        Ok(Value::Table(outer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Server {
        host: String,
        port: u16,
        #[serde(rename = "tls_enabled")]
        tls: bool,
        #[serde(skip)]
        _scratch: u8,
    }

    #[test]
    fn struct_flattens_under_serde_names() {
        let value = to_value(&Server {
            host: "localhost".into(),
            port: 8080,
            tls: true,
            _scratch: 0,
        })
        .unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.get("host"), Some(&Value::String("localhost".into())));
        assert_eq!(table.get("port"), Some(&Value::Uint(8080)));
        assert_eq!(table.get("tls_enabled"), Some(&Value::Bool(true)));
        assert!(!table.contains_key("_scratch"));
    }

    #[test]
    fn durations_and_timestamps_keep_their_native_variants() {
        use std::time::{Duration, UNIX_EPOCH};

        #[derive(Serialize)]
        struct Timeouts {
            connect: Duration,
            deadline: std::time::SystemTime,
        }

        let value = to_value(&Timeouts {
            connect: Duration::from_secs(30),
            deadline: UNIX_EPOCH + Duration::from_secs(1_000),
        })
        .unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(
            table.get("connect"),
            Some(&Value::Duration(Duration::from_secs(30)))
        );
        assert_eq!(
            table.get("deadline"),
            Some(&Value::Timestamp(UNIX_EPOCH + Duration::from_secs(1_000)))
        );
    }

    #[test]
    fn options_and_sequences_round_trip() {
        let value = to_value(&(Some(1_i32), Option::<i32>::None, vec!["a", "b"])).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int(1),
                Value::Null,
                Value::Array(vec!["a".into(), "b".into()]),
            ])
        );
    }
}
