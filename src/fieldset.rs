//! Typed, schema-driven result records.
//!
//! A [`FieldsetSchema`] is assembled once at start-up from three blocks, in
//! order: fixed IP-header fields, the probe module's fields, and fixed system
//! fields. Each packet gets a fresh [`Fieldset`] borrowed from that schema,
//! so index-based access is always checked against the schema that built it.
//! A [`Translation`] projects a fieldset into the [`OutputRecord`] shape the
//! output module asked for.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::packet::Ipv4Header;

/// Declared type of a field slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bool,
    Int,
    String,
    Binary,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::Binary => "binary",
        };
        write!(f, "{s}")
    }
}

/// Value stored in a field slot. `Null` is accepted for any declared type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(u64),
    Str(String),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldType::Bool),
            Self::Int(_) => Some(FieldType::Int),
            Self::Str(_) => Some(FieldType::String),
            Self::Binary(_) => Some(FieldType::Binary),
        }
    }

    /// Integer view: booleans read as 0/1, everything else is `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Non-zero integer or `true`.
    pub fn is_truthy(&self) -> bool {
        self.as_u64().is_some_and(|v| v != 0)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(v) => serializer.serialize_u64(*v),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Binary(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                serializer.serialize_str(&hex)
            }
        }
    }
}

/// Schema entry for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub desc: &'static str,
}

impl FieldDef {
    pub const fn new(name: &'static str, ty: FieldType, desc: &'static str) -> Self {
        Self { name, ty, desc }
    }
}

/// Field errors. Probe modules are pluggable, so every write is checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldsetError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field index {index} out of range (schema has {len} fields)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("type mismatch for field '{name}': declared {expected}, got {actual}")]
    TypeMismatch {
        name: &'static str,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("field '{0}' declared more than once")]
    DuplicateField(&'static str),

    #[error("probe module must declare a bool or int 'success' field")]
    MissingSuccessField,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixed field blocks
// ─────────────────────────────────────────────────────────────────────────────

/// Fields populated from the IPv4 header of every validated reply.
pub const IP_FIELDS: &[FieldDef] = &[
    FieldDef::new("saddr", FieldType::String, "source IP address of response"),
    FieldDef::new("saddr_raw", FieldType::Int, "network order integer form of source IP address"),
    FieldDef::new("daddr", FieldType::String, "destination IP address of response"),
    FieldDef::new("daddr_raw", FieldType::Int, "network order integer form of destination IP address"),
    FieldDef::new("ipid", FieldType::Int, "IP identification number of response"),
    FieldDef::new("ttl", FieldType::Int, "time-to-live of response packet"),
];

/// Fields populated by the receive pipeline after the probe module runs.
pub const SYSTEM_FIELDS: &[FieldDef] = &[
    FieldDef::new("repeat", FieldType::Bool, "is response a repeat response from host"),
    FieldDef::new("cooldown", FieldType::Bool, "was response received during the cooldown period"),
    FieldDef::new("timestamp_str", FieldType::String, "timestamp of when response arrived in ISO8601 format"),
    FieldDef::new("timestamp_ts", FieldType::Int, "timestamp of when response arrived in seconds since Epoch"),
    FieldDef::new("timestamp_us", FieldType::Int, "microsecond part of timestamp (e.g. microseconds since 'timestamp-ts')"),
];

const SYS_REPEAT: usize = 0;
const SYS_COOLDOWN: usize = 1;
const SYS_TS_STR: usize = 2;
const SYS_TS_SECS: usize = 3;
const SYS_TS_MICROS: usize = 4;

const SUCCESS_FIELD: &str = "success";
const APP_SUCCESS_FIELD: &str = "app_success";

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered slot layout shared by every fieldset of a scan.
#[derive(Debug, Clone)]
pub struct FieldsetSchema {
    defs: Vec<FieldDef>,
    by_name: HashMap<&'static str, usize>,
    system_offset: usize,
    success_index: usize,
    app_success_index: Option<usize>,
}

impl FieldsetSchema {
    /// Assemble IP fields + `probe_fields` + system fields.
    ///
    /// The probe block must declare a `success` field (bool or int); an
    /// `app_success` field is optional.
    pub fn build(probe_fields: &[FieldDef]) -> Result<Self, FieldsetError> {
        let defs: Vec<FieldDef> = IP_FIELDS
            .iter()
            .chain(probe_fields)
            .chain(SYSTEM_FIELDS)
            .copied()
            .collect();

        let mut by_name = HashMap::with_capacity(defs.len());
        for (i, d) in defs.iter().enumerate() {
            if by_name.insert(d.name, i).is_some() {
                return Err(FieldsetError::DuplicateField(d.name));
            }
        }

        let flag_index = |name: &str| {
            by_name
                .get(name)
                .copied()
                .filter(|&i| matches!(defs[i].ty, FieldType::Bool | FieldType::Int))
        };
        let success_index = flag_index(SUCCESS_FIELD).ok_or(FieldsetError::MissingSuccessField)?;
        let app_success_index = flag_index(APP_SUCCESS_FIELD);
        let system_offset = defs.len() - SYSTEM_FIELDS.len();

        Ok(Self {
            defs,
            by_name,
            system_offset,
            success_index,
            app_success_index,
        })
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn defs(&self) -> &[FieldDef] {
        &self.defs
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn def(&self, index: usize) -> Option<&FieldDef> {
        self.defs.get(index)
    }

    pub fn success_index(&self) -> usize {
        self.success_index
    }

    pub fn app_success_index(&self) -> Option<usize> {
        self.app_success_index
    }

    /// Fresh fieldset with every slot `Null`.
    pub fn new_fieldset(&self) -> Fieldset<'_> {
        Fieldset {
            schema: self,
            values: vec![FieldValue::Null; self.defs.len()],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fieldset
// ─────────────────────────────────────────────────────────────────────────────

/// Per-packet record. Single owner, dropped at the end of classification.
#[derive(Debug, Clone)]
pub struct Fieldset<'s> {
    schema: &'s FieldsetSchema,
    values: Vec<FieldValue>,
}

impl<'s> Fieldset<'s> {
    pub fn schema(&self) -> &'s FieldsetSchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_by_index(&mut self, index: usize, value: FieldValue) -> Result<(), FieldsetError> {
        let def = self.schema.def(index).ok_or(FieldsetError::IndexOutOfRange {
            index,
            len: self.values.len(),
        })?;
        if let Some(actual) = value.field_type() {
            if actual != def.ty {
                return Err(FieldsetError::TypeMismatch {
                    name: def.name,
                    expected: def.ty,
                    actual,
                });
            }
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: FieldValue) -> Result<(), FieldsetError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| FieldsetError::UnknownField(name.to_string()))?;
        self.set_by_index(index, value)
    }

    pub fn set_int(&mut self, name: &str, v: u64) -> Result<(), FieldsetError> {
        self.set_by_name(name, FieldValue::Int(v))
    }

    pub fn set_bool(&mut self, name: &str, v: bool) -> Result<(), FieldsetError> {
        self.set_by_name(name, FieldValue::Bool(v))
    }

    pub fn set_str(&mut self, name: &str, v: impl Into<String>) -> Result<(), FieldsetError> {
        self.set_by_name(name, FieldValue::Str(v.into()))
    }

    pub fn set_binary(&mut self, name: &str, v: &[u8]) -> Result<(), FieldsetError> {
        self.set_by_name(name, FieldValue::Binary(v.to_vec()))
    }

    pub fn get_by_index(&self, index: usize) -> Result<&FieldValue, FieldsetError> {
        self.values.get(index).ok_or(FieldsetError::IndexOutOfRange {
            index,
            len: self.values.len(),
        })
    }

    pub fn get_by_name(&self, name: &str) -> Result<&FieldValue, FieldsetError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| FieldsetError::UnknownField(name.to_string()))?;
        self.get_by_index(index)
    }

    /// Populate the IP-header block.
    pub fn add_ip_fields(&mut self, ip: &Ipv4Header<'_>) -> Result<(), FieldsetError> {
        let src = ip.src();
        let dst = ip.dst();
        let values = [
            FieldValue::Str(src.to_string()),
            FieldValue::Int(u32::from_ne_bytes(src.octets()) as u64),
            FieldValue::Str(dst.to_string()),
            FieldValue::Int(u32::from_ne_bytes(dst.octets()) as u64),
            FieldValue::Int(ip.id() as u64),
            FieldValue::Int(ip.ttl() as u64),
        ];
        for (i, v) in values.into_iter().enumerate() {
            self.set_by_index(i, v)?;
        }
        Ok(())
    }

    /// Populate the system block.
    pub fn add_system_fields(
        &mut self,
        is_repeat: bool,
        in_cooldown: bool,
        ts: DateTime<Utc>,
    ) -> Result<(), FieldsetError> {
        let base = self.schema.system_offset;
        self.set_by_index(base + SYS_REPEAT, FieldValue::Bool(is_repeat))?;
        self.set_by_index(base + SYS_COOLDOWN, FieldValue::Bool(in_cooldown))?;
        self.set_by_index(
            base + SYS_TS_STR,
            FieldValue::Str(ts.to_rfc3339_opts(SecondsFormat::Millis, false)),
        )?;
        self.set_by_index(base + SYS_TS_SECS, FieldValue::Int(ts.timestamp().max(0) as u64))?;
        self.set_by_index(
            base + SYS_TS_MICROS,
            FieldValue::Int(ts.timestamp_subsec_micros() as u64),
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Translation
// ─────────────────────────────────────────────────────────────────────────────

/// Projection from schema slots to an output record layout.
#[derive(Debug, Clone)]
pub struct Translation {
    slots: Vec<(usize, &'static str)>,
}

impl Translation {
    /// Select `names` in the given order; an empty list selects every field.
    pub fn new(schema: &FieldsetSchema, names: &[String]) -> Result<Self, FieldsetError> {
        let slots = if names.is_empty() {
            schema.defs().iter().enumerate().map(|(i, d)| (i, d.name)).collect()
        } else {
            names
                .iter()
                .map(|n| {
                    let i = schema
                        .index_of(n)
                        .ok_or_else(|| FieldsetError::UnknownField(n.clone()))?;
                    Ok((i, schema.defs()[i].name))
                })
                .collect::<Result<Vec<_>, FieldsetError>>()?
        };
        Ok(Self { slots })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().map(|(_, n)| *n)
    }

    pub fn translate(&self, fs: &Fieldset<'_>) -> OutputRecord {
        let fields = self
            .slots
            .iter()
            .map(|&(i, name)| (name, fs.values.get(i).cloned().unwrap_or_default()))
            .collect();
        OutputRecord { fields }
    }
}

/// Record handed to output modules. Serializes as an ordered JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    fields: Vec<(&'static str, FieldValue)>,
}

impl OutputRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for OutputRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
