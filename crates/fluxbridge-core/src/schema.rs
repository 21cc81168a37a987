//! Schema: an ordered list of named, typed fields that describes one kind
//! of record flowing through the bridge.
//!
//! A `Schema` both encodes/decodes record tuples (`Vec<Value>`) against
//! itself and serializes its own shape onto the wire, so a consumer that
//! has never seen a particular record type can still read its field names
//! and types before decoding a payload.

use std::collections::HashMap;

use crate::wire::{self, CodecError, PackExt, Type, Value};

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("duplicate field name {0:?}")]
    DuplicateName(String),
    #[error("schema has {schema} fields but {given} values were given")]
    ArityMismatch { schema: usize, given: usize },
    #[error("field {field:?} expects type {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: Type,
        found: Type,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// An ordered, name-unique list of fields describing one record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema from `(name, type)` pairs, rejecting duplicate names.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (impl Into<String>, Type)>) -> Result<Self, SchemaError> {
        let mut seen = HashMap::new();
        let mut fields = Vec::new();
        for (name, ty) in pairs {
            let name = name.into();
            if seen.insert(name.clone(), ()).is_some() {
                return Err(SchemaError::DuplicateName(name));
            }
            fields.push(Field { name, ty });
        }
        Ok(Schema { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn check_arity(&self, given: usize) -> Result<(), SchemaError> {
        if given < self.fields.len() {
            return Err(SchemaError::ArityMismatch {
                schema: self.fields.len(),
                given,
            });
        }
        Ok(())
    }

    fn check_type(&self, field: &Field, v: &Value) -> Result<(), SchemaError> {
        if v.type_of() != field.ty {
            return Err(SchemaError::TypeMismatch {
                field: field.name.clone(),
                expected: field.ty,
                found: v.type_of(),
            });
        }
        Ok(())
    }

    /// Encodes `values` (one per field, in schema order) into a flat byte
    /// buffer. `values` may be longer than the schema; trailing entries are
    /// ignored, mirroring the original tuple-slice encoder.
    pub fn encode_tuple(&self, values: &[Value]) -> Result<Vec<u8>, SchemaError> {
        let mut buf = Vec::new();
        self.encode_tuple_into(&mut buf, values)?;
        Ok(buf)
    }

    /// Like [`Schema::encode_tuple`], but writes into a caller-supplied
    /// buffer instead of allocating a fresh one. This is the form
    /// [`crate::encoder::SchemaEncoder`] uses so a publisher worker's
    /// pre-grown buffer (see `fluxbridge-producer::logger`) is reused across
    /// every record it encodes rather than allocating one per message.
    pub fn encode_tuple_into(&self, buf: &mut Vec<u8>, values: &[Value]) -> Result<(), SchemaError> {
        self.validate(values)?;
        for (field, value) in self.fields.iter().zip(values) {
            debug_assert_eq!(field.ty, value.type_of());
            wire::write_value(buf, value);
        }
        Ok(())
    }

    /// Checks that `values` has at least one entry per field and that each
    /// entry's type matches its field, without encoding anything. Lets a
    /// caller (e.g. `Logger::send_record`) fail fast on a malformed record
    /// before handing it off for deferred, worker-side encoding.
    pub fn validate(&self, values: &[Value]) -> Result<(), SchemaError> {
        self.check_arity(values.len())?;
        for (field, value) in self.fields.iter().zip(values) {
            self.check_type(field, value)?;
        }
        Ok(())
    }

    /// Decodes `buf` into a tuple of values, one per field in schema order.
    pub fn decode_to_slice(&self, buf: &[u8]) -> Result<Vec<Value>, SchemaError> {
        let (values, _) = self.decode_to_slice_zero_copy(buf)?;
        Ok(values.into_iter().map(owned_value).collect())
    }

    /// Decodes `buf` the same way as [`Schema::decode_to_slice`], but
    /// borrows string and binary payloads directly from `buf` instead of
    /// allocating, returning the number of bytes consumed alongside.
    pub fn decode_to_slice_zero_copy<'a>(&self, buf: &'a [u8]) -> Result<(Vec<BorrowedValue<'a>>, usize), SchemaError> {
        let mut out = Vec::with_capacity(self.fields.len());
        let mut pos = 0;
        for field in &self.fields {
            let rest = &buf[pos..];
            let (value, n) = read_typed(rest, field.ty)?;
            pos += n;
            out.push(value);
        }
        Ok((out, pos))
    }

    /// Decodes `buf` into a name-keyed map instead of a positional tuple.
    pub fn decode_to_map(&self, buf: &[u8]) -> Result<HashMap<String, Value>, SchemaError> {
        let (values, _) = self.decode_to_slice_zero_copy(buf)?;
        Ok(self
            .fields
            .iter()
            .zip(values)
            .map(|(f, v)| (f.name.clone(), owned_value(v)))
            .collect())
    }

    /// Serializes the schema's own shape: a length prefix followed by
    /// `(type, name)` pairs, so a reader can reconstruct an equivalent
    /// `Schema` without out-of-band knowledge of the record type.
    pub fn serialize_to(&self, buf: &mut Vec<u8>) {
        wire::write_uint(buf, self.fields.len() as u64);
        for field in &self.fields {
            wire::write_uint(buf, field.ty as u64);
            wire::write_string(buf, &field.name);
        }
    }

    /// Reads a schema previously written by [`Schema::serialize_to`],
    /// returning it along with the number of bytes consumed.
    pub fn read_schema(buf: &[u8]) -> Result<(Schema, usize), SchemaError> {
        let mut pos = 0;
        let (count, n) = wire::read_uint_bytes(&buf[pos..])?;
        pos += n;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (ty_code, n) = wire::read_uint_bytes(&buf[pos..])?;
            pos += n;
            let ty = Type::from_u8(ty_code as u8)?;
            let (name, n) = wire::read_string_zero_copy(&buf[pos..])?;
            pos += n;
            fields.push(Field {
                name: name.to_owned(),
                ty,
            });
        }
        Ok((Schema { fields }, pos))
    }

    /// Renders a decoded tuple as a JSON object keyed by field name.
    /// `Bin` and `Ext` payloads are base64-encoded, matching the original
    /// wire-to-JSON bridge behavior so downstream consumers (Elasticsearch,
    /// InfluxDB) receive consistently-shaped bodies regardless of field type.
    pub fn render_json(&self, values: &[Value]) -> Result<serde_json::Value, SchemaError> {
        self.check_arity(values.len())?;
        let mut map = serde_json::Map::new();
        for (field, value) in self.fields.iter().zip(values) {
            self.check_type(field, value)?;
            map.insert(field.name.clone(), render_value_json(value));
        }
        Ok(serde_json::Value::Object(map))
    }
}

/// Renders a single decoded value as JSON, the same way [`Schema::render_json`]
/// renders each field. Exposed so endpoint drivers that build a bespoke JSON
/// shape (rather than the generic per-field object) can still reuse the same
/// scalar rendering rules — e.g. the InfluxDB driver's `columns`/`points`
/// framing (see `fluxbridge-services::influxdb`).
pub fn render_value_json(value: &Value) -> serde_json::Value {
    use base64::Engine as _;
    match value {
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Uint(u) => serde_json::Value::from(*u),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Bool(b) => serde_json::Value::from(*b),
        Value::String(s) => serde_json::Value::from(s.clone()),
        Value::Bin(b) => serde_json::Value::from(base64::engine::general_purpose::STANDARD.encode(b)),
        Value::Ext(PackExt { extension_type, data }) => {
            let mut ext = serde_json::Map::new();
            ext.insert("extension_type".into(), serde_json::Value::from(*extension_type as i64));
            ext.insert(
                "data".into(),
                serde_json::Value::from(base64::engine::general_purpose::STANDARD.encode(data)),
            );
            serde_json::Value::Object(ext)
        }
    }
}

/// Like [`Value`] but string/bin payloads borrow from the decode buffer
/// instead of owning a copy. Produced by the zero-copy decode path.
#[derive(Debug, Clone, PartialEq)]
pub enum BorrowedValue<'a> {
    Int(i64),
    Uint(u64),
    String(&'a str),
    Bool(bool),
    Bin(&'a [u8]),
    Ext(i8, &'a [u8]),
    Float(f64),
}

fn owned_value(v: BorrowedValue<'_>) -> Value {
    match v {
        BorrowedValue::Int(i) => Value::Int(i),
        BorrowedValue::Uint(u) => Value::Uint(u),
        BorrowedValue::String(s) => Value::String(s.to_owned()),
        BorrowedValue::Bool(b) => Value::Bool(b),
        BorrowedValue::Bin(b) => Value::Bin(b.to_vec()),
        BorrowedValue::Ext(extension_type, data) => Value::Ext(PackExt {
            extension_type,
            data: data.to_vec(),
        }),
        BorrowedValue::Float(f) => Value::Float(f),
    }
}

fn read_typed(buf: &[u8], ty: Type) -> Result<(BorrowedValue<'_>, usize), SchemaError> {
    Ok(match ty {
        Type::Int => {
            let (v, n) = wire::read_int_bytes(buf)?;
            (BorrowedValue::Int(v), n)
        }
        Type::Uint => {
            let (v, n) = wire::read_uint_bytes(buf)?;
            (BorrowedValue::Uint(v), n)
        }
        Type::String => {
            let (v, n) = wire::read_string_zero_copy(buf)?;
            (BorrowedValue::String(v), n)
        }
        Type::Bool => {
            let (v, n) = wire::read_bool_bytes(buf)?;
            (BorrowedValue::Bool(v), n)
        }
        Type::Bin => {
            let (v, n) = wire::read_bin_zero_copy(buf)?;
            (BorrowedValue::Bin(v), n)
        }
        Type::Ext => {
            let ((etype, data), n) = wire::read_ext_zero_copy(buf)?;
            (BorrowedValue::Ext(etype, data), n)
        }
        Type::Float => {
            let (v, n) = wire::read_float_bytes(buf)?;
            (BorrowedValue::Float(v), n)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::from_pairs([
            ("host", Type::String),
            ("cpu_pct", Type::Float),
            ("up", Type::Bool),
            ("restarts", Type::Uint),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Schema::from_pairs([("a", Type::Int), ("a", Type::Int)]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName(ref n) if n == "a"));
    }

    #[test]
    fn encode_decode_round_trip() {
        let schema = sample_schema();
        let values = vec![
            Value::String("web-01".into()),
            Value::Float(42.5),
            Value::Bool(true),
            Value::Uint(3),
        ];
        let buf = schema.encode_tuple(&values).unwrap();
        let back = schema.decode_to_slice(&buf).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn decode_to_map() {
        let schema = sample_schema();
        let values = vec![
            Value::String("web-02".into()),
            Value::Float(1.0),
            Value::Bool(false),
            Value::Uint(0),
        ];
        let buf = schema.encode_tuple(&values).unwrap();
        let map = schema.decode_to_map(&buf).unwrap();
        assert_eq!(map.get("host"), Some(&Value::String("web-02".into())));
        assert_eq!(map.get("up"), Some(&Value::Bool(false)));
    }

    #[test]
    fn type_mismatch_rejected() {
        let schema = sample_schema();
        let values = vec![
            Value::Int(1), // wrong: host expects String
            Value::Float(1.0),
            Value::Bool(true),
            Value::Uint(0),
        ];
        assert!(matches!(schema.encode_tuple(&values), Err(SchemaError::TypeMismatch { .. })));
    }

    #[test]
    fn arity_mismatch_rejected() {
        let schema = sample_schema();
        let values = vec![Value::String("only-one".into())];
        assert!(matches!(schema.encode_tuple(&values), Err(SchemaError::ArityMismatch { .. })));
    }

    #[test]
    fn self_serialization_round_trip() {
        let schema = sample_schema();
        let mut buf = Vec::new();
        schema.serialize_to(&mut buf);
        let (back, n) = Schema::read_schema(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(back, schema);
    }

    #[test]
    fn render_json_base64_encodes_bin_and_ext() {
        let schema = Schema::from_pairs([("payload", Type::Bin), ("tag", Type::Ext)]).unwrap();
        let values = vec![
            Value::Bin(vec![1, 2, 3]),
            Value::Ext(PackExt {
                extension_type: 9,
                data: vec![4, 5],
            }),
        ];
        let json = schema.render_json(&values).unwrap();
        assert_eq!(json["payload"], serde_json::Value::from("AQID"));
        assert_eq!(json["tag"]["extension_type"], serde_json::Value::from(9));
        assert_eq!(json["tag"]["data"], serde_json::Value::from("BAU="));
    }
}
