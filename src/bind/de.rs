//! The layered deserializer behind struct binding.
//!
//! A [`Binder`] carries up to two trees at every node: the live
//! configuration and the caller-supplied default. Scalars coerce through
//! [`crate::convert`], falling back to the default layer and then the
//! type's zero value unless strict mode is on. Struct access is
//! field-driven rather than data-driven so that case-insensitive lookup,
//! required-field checks, and layer unioning all happen against the
//! target's field list.

use std::time::{Duration, UNIX_EPOCH};

use serde::de::value::StrDeserializer;
use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use uncased::UncasedStr;

use crate::convert;
use crate::error::{Error, Result};
use crate::value::{Table, Value};

use super::BindOptions;

#[derive(Clone, Copy)]
pub(crate) struct Binder<'a> {
    live: Option<&'a Value>,
    fallback: Option<&'a Value>,
    options: &'a BindOptions,
}

impl<'a> Binder<'a> {
    pub(crate) fn new(
        live: Option<&'a Value>,
        fallback: Option<&'a Value>,
        options: &'a BindOptions,
    ) -> Self {
        Self {
            live,
            fallback,
            options,
        }
    }

    fn strict(&self) -> bool {
        self.options.error_on_missing
    }

    /// Null counts as absent at every layer.
    fn live_value(&self) -> Option<&'a Value> {
        self.live.filter(|v| !v.is_null())
    }

    fn fallback_value(&self) -> Option<&'a Value> {
        self.fallback.filter(|v| !v.is_null())
    }

    fn effective(&self) -> Option<&'a Value> {
        self.live_value().or_else(|| self.fallback_value())
    }

    /// Resolve a scalar with the layered leniency rule: a failed coercion of
    /// the live value falls back to the default layer, then to `zero`.
    /// Strict mode turns every failure into an error instead.
    fn scalar<T>(&self, convert: impl Fn(&Value) -> Result<T>, zero: T) -> Result<T> {
        if let Some(value) = self.live_value() {
            return match convert(value) {
                Ok(converted) => Ok(converted),
                Err(err) if self.strict() => Err(err),
                Err(_) => Ok(self
                    .fallback_value()
                    .and_then(|fallback| convert(fallback).ok())
                    .unwrap_or(zero)),
            };
        }
        if let Some(value) = self.fallback_value() {
            return match convert(value) {
                Ok(converted) => Ok(converted),
                Err(err) if self.strict() => Err(err),
                Err(_) => Ok(zero),
            };
        }
        if self.strict() {
            Err(Error::bind("no value available to bind"))
        } else {
            Ok(zero)
        }
    }

    /// The table layers visible at this node. When the live side is not a
    /// table, the default layer stands in for it; the default then serves as
    /// a per-field fallback only when deep merging is on.
    fn layers(&self) -> (Option<&'a Table>, Option<&'a Table>) {
        let live = self.live_value().and_then(Value::as_table);
        let fallback = self.fallback_value().and_then(Value::as_table);
        match live {
            Some(live) if self.options.deep_merge => (Some(live), fallback),
            Some(live) => (Some(live), None),
            None => (fallback, None),
        }
    }
}

fn lookup<'a>(table: &'a Table, field: &str, ignore_case: bool) -> Option<&'a Value> {
    let found = table.get(field).or_else(|| {
        if ignore_case {
            table
                .iter()
                .find(|(key, _)| UncasedStr::new(key) == UncasedStr::new(field))
                .map(|(_, value)| value)
        } else {
            None
        }
    });
    found.filter(|v| !v.is_null())
}

macro_rules! deserialize_narrow_int {
    ($($method:ident => $visit:ident via $conv:path as $ty:ty),* $(,)?) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            visitor.$visit(self.scalar($conv, 0)? as $ty)
        }
    )*};
}

impl<'de> de::Deserializer<'de> for Binder<'_> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.effective() {
            None | Some(Value::Null) => visitor.visit_unit(),
            Some(Value::Bool(b)) => visitor.visit_bool(*b),
            Some(Value::Int(n)) => visitor.visit_i64(*n),
            Some(Value::Uint(n)) => visitor.visit_u64(*n),
            Some(Value::Float(f)) => visitor.visit_f64(*f),
            Some(Value::String(s)) => visitor.visit_str(s),
            Some(Value::Duration(d)) => {
                visitor.visit_string(humantime::format_duration(*d).to_string())
            }
            Some(Value::Timestamp(t)) => {
                visitor.visit_string(humantime::format_rfc3339(*t).to_string())
            }
            Some(Value::Array(_)) => self.deserialize_seq(visitor),
            Some(Value::Table(_)) => self.deserialize_map(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(self.scalar(convert::to_bool, false)?)
    }

    deserialize_narrow_int! {
        deserialize_i8 => visit_i8 via convert::to_i64 as i8,
        deserialize_i16 => visit_i16 via convert::to_i64 as i16,
        deserialize_i32 => visit_i32 via convert::to_i64 as i32,
        deserialize_u8 => visit_u8 via convert::to_u64 as u8,
        deserialize_u16 => visit_u16 via convert::to_u64 as u16,
        deserialize_u32 => visit_u32 via convert::to_u64 as u32,
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i64(self.scalar(convert::to_i64, 0)?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u64(self.scalar(convert::to_u64, 0)?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f32(self.scalar(convert::to_f64, 0.0)? as f32)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(self.scalar(convert::to_f64, 0.0)?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let s = self.scalar(|v| Ok(convert::to_string_lossy(v)), String::new())?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(Error::conversion(
                "char",
                format!("expected a single character, got {s:?}"),
            )),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.scalar(|v| Ok(convert::to_string_lossy(v)), String::new())?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.effective() {
            Some(Value::String(s)) => visitor.visit_byte_buf(s.clone().into_bytes()),
            Some(Value::Array(items)) => {
                let bytes = items
                    .iter()
                    .map(|item| convert::to_u64(item).map(|n| n as u8))
                    .collect::<Result<Vec<u8>>>()?;
                visitor.visit_byte_buf(bytes)
            }
            other => Err(Error::conversion(
                "bytes",
                format!(
                    "cannot convert {}",
                    other.map_or("nothing", Value::type_name)
                ),
            )),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.effective() {
            Some(_) => visitor.visit_some(self),
            None => visitor.visit_none(),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.effective() {
            Some(Value::Array(items)) => visitor.visit_seq(SeqBinder {
                iter: items.iter(),
                options: self.options,
            }),
            Some(Value::Table(_)) => {
                if self.strict() {
                    Err(Error::conversion("sequence", "cannot convert table"))
                } else {
                    visitor.visit_seq(SeqBinder {
                        iter: std::slice::Iter::default(),
                        options: self.options,
                    })
                }
            }
            // A lone scalar promotes to a one-element sequence.
            Some(scalar) => visitor.visit_seq(SeqBinder {
                iter: std::slice::from_ref(scalar).iter(),
                options: self.options,
            }),
            None => visitor.visit_seq(SeqBinder {
                iter: std::slice::Iter::default(),
                options: self.options,
            }),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let (live, fallback) = self.layers();
        if live.is_none() && self.effective().is_some() && self.strict() {
            return Err(Error::conversion(
                "table",
                format!(
                    "cannot convert {}",
                    self.effective().map_or("nothing", Value::type_name)
                ),
            ));
        }
        let mut entries: std::collections::BTreeMap<&str, (Option<&Value>, Option<&Value>)> =
            std::collections::BTreeMap::new();
        if let Some(table) = fallback {
            for (key, value) in table {
                entries.insert(key.as_str(), (None, Some(value)));
            }
        }
        if let Some(table) = live {
            for (key, value) in table {
                entries.entry(key.as_str()).or_insert((None, None)).0 = Some(value);
            }
        }
        visitor.visit_map(MapBinder {
            entries: entries.into_iter().collect::<Vec<_>>().into_iter(),
            pending: None,
            options: self.options,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        // std's Duration and SystemTime deserialize as two-field structs;
        // intercept them so config-native forms ("2m", integer seconds,
        // RFC 3339 strings) bind directly.
        if name == "Duration" && fields == &["secs", "nanos"][..] {
            let duration = self.scalar(convert::to_duration, Duration::ZERO)?;
            return visitor.visit_map(PartsBinder::new([
                ("secs", duration.as_secs()),
                ("nanos", u64::from(duration.subsec_nanos())),
            ]));
        }
        if name == "SystemTime" && fields == &["secs_since_epoch", "nanos_since_epoch"][..] {
            let time = self.scalar(convert::to_timestamp, UNIX_EPOCH)?;
            let since_epoch = time.duration_since(UNIX_EPOCH).map_err(|_| {
                Error::conversion("timestamp", "times before the UNIX epoch are not supported")
            })?;
            return visitor.visit_map(PartsBinder::new([
                ("secs_since_epoch", since_epoch.as_secs()),
                ("nanos_since_epoch", u64::from(since_epoch.subsec_nanos())),
            ]));
        }
        let (live, fallback) = self.layers();
        visitor.visit_map(StructBinder {
            fields: fields.iter(),
            live,
            fallback,
            options: self.options,
            pending: None,
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.effective() {
            Some(Value::String(s)) => visitor.visit_enum(s.as_str().into_deserializer()),
            Some(Value::Table(table)) if table.len() == 1 => {
                // Externally tagged form: {"variant": payload}.
                let (variant, payload) = table.iter().next().ok_or_else(|| {
                    Error::bind("enum table emptied during iteration")
                })?;
                visitor.visit_enum(EnumBinder {
                    variant,
                    payload,
                    options: self.options,
                })
            }
            other => Err(Error::conversion(
                "enum",
                format!(
                    "expected a variant name or single-key table, got {}",
                    other.map_or("nothing", Value::type_name)
                ),
            )),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct SeqBinder<'a> {
    iter: std::slice::Iter<'a, Value>,
    options: &'a BindOptions,
}

impl<'de> de::SeqAccess<'de> for SeqBinder<'_> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        self.iter
            .next()
            .map(|item| seed.deserialize(Binder::new(Some(item), None, self.options)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

type LayeredEntry<'a> = (&'a str, (Option<&'a Value>, Option<&'a Value>));

struct MapBinder<'a> {
    entries: std::vec::IntoIter<LayeredEntry<'a>>,
    pending: Option<(Option<&'a Value>, Option<&'a Value>)>,
    options: &'a BindOptions,
}

impl<'de> de::MapAccess<'de> for MapBinder<'_> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.entries.next() {
            Some((key, layers)) => {
                self.pending = Some(layers);
                seed.deserialize(StrDeserializer::new(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let (live, fallback) = self
            .pending
            .take()
            .ok_or_else(|| Error::bind("map value requested before its key"))?;
        seed.deserialize(Binder::new(live, fallback, self.options))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct StructBinder<'a> {
    fields: std::slice::Iter<'static, &'static str>,
    live: Option<&'a Table>,
    fallback: Option<&'a Table>,
    options: &'a BindOptions,
    pending: Option<(Option<&'a Value>, Option<&'a Value>)>,
}

impl<'de> de::MapAccess<'de> for StructBinder<'_> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        while let Some(&field) = self.fields.next() {
            let live = self
                .live
                .and_then(|table| lookup(table, field, self.options.ignore_case));
            let fallback = self
                .fallback
                .and_then(|table| lookup(table, field, self.options.ignore_case));
            if live.is_none() && fallback.is_none() {
                if self.options.error_on_missing && self.options.is_required(field) {
                    return Err(Error::required(field));
                }
                // Absent at every layer: skip the field so the target's own
                // default applies.
                continue;
            }
            self.pending = Some((live, fallback));
            return seed.deserialize(StrDeserializer::new(field)).map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let (live, fallback) = self
            .pending
            .take()
            .ok_or_else(|| Error::bind("field value requested before its key"))?;
        seed.deserialize(Binder::new(live, fallback, self.options))
    }
}

/// Emits the two-field map form std's `Duration` and `SystemTime` expect.
struct PartsBinder {
    parts: std::array::IntoIter<(&'static str, u64), 2>,
    pending: Option<u64>,
}

impl PartsBinder {
    fn new(parts: [(&'static str, u64); 2]) -> Self {
        Self {
            parts: parts.into_iter(),
            pending: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for PartsBinder {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.parts.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(StrDeserializer::new(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| Error::bind("part value requested before its key"))?;
        seed.deserialize(value.into_deserializer())
    }
}

struct EnumBinder<'a> {
    variant: &'a str,
    payload: &'a Value,
    options: &'a BindOptions,
}

impl<'de, 'a> de::EnumAccess<'de> for EnumBinder<'a> {
    type Error = Error;
    type Variant = VariantBinder<'a>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let tag = seed.deserialize(StrDeserializer::new(self.variant))?;
        Ok((
            tag,
            VariantBinder {
                payload: self.payload,
                options: self.options,
            },
        ))
    }
}

struct VariantBinder<'a> {
    payload: &'a Value,
    options: &'a BindOptions,
}

impl<'de> de::VariantAccess<'de> for VariantBinder<'_> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(Binder::new(Some(self.payload), None, self.options))
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(Binder::new(Some(self.payload), None, self.options), visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_struct(
            Binder::new(Some(self.payload), None, self.options),
            "",
            fields,
            visitor,
        )
    }
}
