//! Message-format definitions and the provider the encoder reads them from.
//!
//! A PGN maps to one or more [`FormatDefinition`]s. Several definitions for
//! the same PGN are variants told apart by a discriminator ("Match") field,
//! e.g. the request, command and acknowledge forms of PGN 126208. Custom
//! definitions take precedence over built-in ones.

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};

#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::{message::Message, well_known};

/// Declared length of formats whose size depends on their content.
pub const VARIABLE_LENGTH: u32 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum FieldType {
    #[default]
    Number,
    Float,
    Decimal,
    Lookup,
    IndirectLookup,
    #[cfg_attr(feature = "serde", serde(rename = "BITLOOKUP"))]
    BitLookup,
    #[cfg_attr(feature = "serde", serde(rename = "FIELDTYPE_LOOKUP"))]
    FieldTypeLookup,
    Date,
    Time,
    Duration,
    Pressure,
    Mmsi,
    Pgn,
    IsoName,
    StringFix,
    /// Length byte, characters, NUL.
    StringLz,
    /// Length byte, control byte, characters.
    StringLau,
    /// 0x02, characters, 0x01.
    StringStartStop,
    Binary,
    Reserved,
    Spare,
    /// Width and type come from another PGN's field, see [`FieldResolver`].
    Variable,
    /// Width comes from the "key" field's field-type enumeration.
    KeyValue,
    FieldIndex,
    #[cfg_attr(feature = "serde", serde(other))]
    Other,
}

impl FieldType {
    #[inline]
    #[must_use]
    pub const fn is_length_prefixed_string(self) -> bool {
        matches!(self, FieldType::StringLz | FieldType::StringLau)
    }
}

/// Layout and scaling of a single field.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "PascalCase"))]
pub struct FieldDefinition {
    pub id: String,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bit_length: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bit_length_variable: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub signed: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub resolution: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub offset: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub field_type: FieldType,
    #[cfg_attr(feature = "serde", serde(default, rename = "Match"))]
    pub discriminator: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lookup_enumeration: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lookup_bit_enumeration: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lookup_field_type_enumeration: Option<String>,
}

impl FieldDefinition {
    /// An unsigned number field without scaling.
    pub fn new(id: &str, name: &str, bit_length: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bit_length,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn of_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    #[must_use]
    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    #[must_use]
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn lookup(mut self, enumeration: &str) -> Self {
        self.field_type = FieldType::Lookup;
        self.lookup_enumeration = Some(enumeration.into());
        self
    }

    #[must_use]
    pub fn bit_lookup(mut self, enumeration: &str) -> Self {
        self.field_type = FieldType::BitLookup;
        self.lookup_bit_enumeration = Some(enumeration.into());
        self
    }

    #[must_use]
    pub fn field_type_lookup(mut self, enumeration: &str) -> Self {
        self.field_type = FieldType::FieldTypeLookup;
        self.lookup_field_type_enumeration = Some(enumeration.into());
        self
    }

    /// Make this field a discriminator selecting the variant whose code is
    /// `code`, described as `description`.
    #[must_use]
    pub fn matching(mut self, code: u32, description: &str) -> Self {
        self.discriminator = Some(code);
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn variable_length(mut self) -> Self {
        self.bit_length_variable = true;
        self
    }

    /// Reserved slots are zero-filled rather than marked "not available".
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.id.starts_with("reserved")
    }
}

/// The layout of one PGN (or one variant of it).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "PascalCase"))]
pub struct FormatDefinition {
    #[cfg_attr(feature = "serde", serde(rename = "PGN"))]
    pub pgn: u32,
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Total length in bytes, or [`VARIABLE_LENGTH`].
    #[cfg_attr(feature = "serde", serde(default = "variable_length"))]
    pub length: u32,
    /// Number of trailing fields that form the repeating field set.
    #[cfg_attr(feature = "serde", serde(default, rename = "RepeatingFieldSet1Size"))]
    pub repeating_fields: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Vec<FieldDefinition>,
}

#[cfg(feature = "serde")]
fn variable_length() -> u32 {
    VARIABLE_LENGTH
}

impl FormatDefinition {
    pub fn new(pgn: u32, id: &str, length: u32) -> Self {
        Self {
            pgn,
            id: id.into(),
            description: String::new(),
            length,
            repeating_fields: 0,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Append the fields of the repeating set. They must come last.
    #[must_use]
    pub fn repeating(mut self, fields: impl IntoIterator<Item = FieldDefinition>) -> Self {
        let before = self.fields.len();
        self.fields.extend(fields);
        self.repeating_fields = self.fields.len() - before;
        self
    }

    /// Fields written once, before the repeating set.
    #[inline]
    pub fn fixed_fields(&self) -> &[FieldDefinition] {
        &self.fields[..self.fields.len().saturating_sub(self.repeating_fields)]
    }

    /// Fields written once per repeating entry.
    #[inline]
    pub fn repeating_fields(&self) -> &[FieldDefinition] {
        &self.fields[self.fields.len().saturating_sub(self.repeating_fields)..]
    }
}

/// Read-only provider of format definitions and enumerations.
pub trait Registry {
    /// Candidate definitions for a PGN, custom ones first.
    fn lookup(&self, pgn: u32) -> Vec<&FormatDefinition>;

    /// Code of a named value in a lookup enumeration.
    fn enumeration_value(&self, enumeration: &str, name: &str) -> Option<u32>;

    /// Name of the flag at `bit` in a bit enumeration.
    fn bit_enumeration_name(&self, enumeration: &str, bit: u32) -> Option<&str>;

    /// Code of a named value in a field-type enumeration.
    fn field_type_value(&self, enumeration: &str, name: &str) -> Option<u32>;

    /// Bit width of the value tagged by `code` in a field-type enumeration.
    fn field_type_bits(&self, enumeration: &str, code: u32) -> Option<u32>;

    fn industry_code(&self, name: &str) -> Option<u32> {
        well_known::industry_code(name)
    }
}

impl<T: Registry + ?Sized> Registry for &T {
    fn lookup(&self, pgn: u32) -> Vec<&FormatDefinition> {
        (**self).lookup(pgn)
    }

    fn enumeration_value(&self, enumeration: &str, name: &str) -> Option<u32> {
        (**self).enumeration_value(enumeration, name)
    }

    fn bit_enumeration_name(&self, enumeration: &str, bit: u32) -> Option<&str> {
        (**self).bit_enumeration_name(enumeration, bit)
    }

    fn field_type_value(&self, enumeration: &str, name: &str) -> Option<u32> {
        (**self).field_type_value(enumeration, name)
    }

    fn field_type_bits(&self, enumeration: &str, code: u32) -> Option<u32> {
        (**self).field_type_bits(enumeration, code)
    }

    fn industry_code(&self, name: &str) -> Option<u32> {
        (**self).industry_code(name)
    }
}

/// The decoder's view of dynamically typed fields. Given the PGN a VARIABLE
/// field refers to and the byte written just before it (the 1-based order of
/// the referenced field), return the referenced field's definition.
pub trait FieldResolver {
    fn resolve_field(&self, pgn: u32, preceding: u8, message: &Message) -> Option<FieldDefinition>;
}

/// Resolves nothing; VARIABLE fields are then skipped.
pub struct NoResolver;

impl FieldResolver for NoResolver {
    fn resolve_field(&self, _pgn: u32, _preceding: u8, _message: &Message) -> Option<FieldDefinition> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FieldTypeEntry {
    name: String,
    code: u32,
    bits: Option<u32>,
}

/// In-memory [`Registry`]. Built once, then handed to the encoder or device.
#[derive(Debug, Clone, Default)]
pub struct FormatTable {
    builtin: BTreeMap<u32, Vec<FormatDefinition>>,
    custom: BTreeMap<u32, Vec<FormatDefinition>>,
    lookups: BTreeMap<String, Vec<(String, u32)>>,
    bit_lookups: BTreeMap<String, Vec<(u32, String)>>,
    field_type_lookups: BTreeMap<String, Vec<FieldTypeEntry>>,
}

impl FormatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, format: FormatDefinition) {
        self.builtin.entry(format.pgn).or_default().push(format);
    }

    /// Custom definitions are returned ahead of built-in ones.
    pub fn insert_custom(&mut self, format: FormatDefinition) {
        self.custom.entry(format.pgn).or_default().push(format);
    }

    pub fn add_lookup<'a>(&mut self, name: &str, values: impl IntoIterator<Item = (&'a str, u32)>) {
        self.lookups.insert(
            name.into(),
            values.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        );
    }

    pub fn add_bit_lookup<'a>(&mut self, name: &str, bits: impl IntoIterator<Item = (u32, &'a str)>) {
        self.bit_lookups.insert(
            name.into(),
            bits.into_iter().map(|(b, n)| (b, n.to_string())).collect(),
        );
    }

    /// Entries are `(name, code, bit width of the tagged value)`.
    pub fn add_field_type_lookup<'a>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = (&'a str, u32, Option<u32>)>,
    ) {
        self.field_type_lookups.insert(
            name.into(),
            values
                .into_iter()
                .map(|(n, code, bits)| FieldTypeEntry {
                    name: n.to_string(),
                    code,
                    bits,
                })
                .collect(),
        );
    }

    /// Number of PGNs with at least one definition.
    pub fn len(&self) -> usize {
        let mut pgns: Vec<u32> = self.builtin.keys().chain(self.custom.keys()).copied().collect();
        pgns.sort_unstable();
        pgns.dedup();
        pgns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtin.is_empty() && self.custom.is_empty()
    }
}

impl Registry for FormatTable {
    fn lookup(&self, pgn: u32) -> Vec<&FormatDefinition> {
        self.custom
            .get(&pgn)
            .into_iter()
            .chain(self.builtin.get(&pgn))
            .flatten()
            .collect()
    }

    fn enumeration_value(&self, enumeration: &str, name: &str) -> Option<u32> {
        self.lookups
            .get(enumeration)?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    fn bit_enumeration_name(&self, enumeration: &str, bit: u32) -> Option<&str> {
        self.bit_lookups
            .get(enumeration)?
            .iter()
            .find(|(b, _)| *b == bit)
            .map(|(_, n)| n.as_str())
    }

    fn field_type_value(&self, enumeration: &str, name: &str) -> Option<u32> {
        self.field_type_lookups
            .get(enumeration)?
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.code)
    }

    fn field_type_bits(&self, enumeration: &str, code: u32) -> Option<u32> {
        self.field_type_lookups
            .get(enumeration)?
            .iter()
            .find(|e| e.code == code)
            .and_then(|e| e.bits)
    }
}

/// Resolves VARIABLE fields against the table's own definitions, taking the
/// first candidate of the referenced PGN.
impl FieldResolver for FormatTable {
    fn resolve_field(&self, pgn: u32, preceding: u8, _message: &Message) -> Option<FieldDefinition> {
        let order = usize::from(preceding).checked_sub(1)?;
        self.lookup(pgn).first()?.fields.get(order).cloned()
    }
}

#[cfg(feature = "serde")]
mod canboat {
    use alloc::{string::String, vec::Vec};

    use serde::Deserialize;

    use super::{FieldTypeEntry, FormatDefinition, FormatTable};

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct EnumValue {
        name: String,
        value: u32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Enumeration {
        name: String,
        #[serde(default)]
        enum_values: Vec<EnumValue>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct BitValue {
        name: String,
        bit: u32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct BitEnumeration {
        name: String,
        #[serde(default)]
        enum_bit_values: Vec<BitValue>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct FieldTypeValue {
        name: String,
        value: u32,
        #[serde(default)]
        bits: Option<u32>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct FieldTypeEnumeration {
        name: String,
        #[serde(default)]
        enum_field_type_values: Vec<FieldTypeValue>,
    }

    /// A canboat-style definition document.
    #[derive(Deserialize)]
    pub struct Document {
        #[serde(rename = "PGNs", default)]
        pgns: Vec<FormatDefinition>,
        #[serde(rename = "LookupEnumerations", default)]
        lookups: Vec<Enumeration>,
        #[serde(rename = "LookupBitEnumerations", default)]
        bit_lookups: Vec<BitEnumeration>,
        #[serde(rename = "LookupFieldTypeEnumerations", default)]
        field_type_lookups: Vec<FieldTypeEnumeration>,
    }

    impl From<Document> for FormatTable {
        fn from(doc: Document) -> Self {
            let mut table = FormatTable::new();

            for pgn in doc.pgns {
                table.insert(pgn);
            }

            for e in doc.lookups {
                let values = e.enum_values.into_iter().map(|v| (v.name, v.value)).collect();
                table.lookups.insert(e.name, values);
            }

            for e in doc.bit_lookups {
                let bits = e.enum_bit_values.into_iter().map(|v| (v.bit, v.name)).collect();
                table.bit_lookups.insert(e.name, bits);
            }

            for e in doc.field_type_lookups {
                let values = e
                    .enum_field_type_values
                    .into_iter()
                    .map(|v| FieldTypeEntry {
                        name: v.name,
                        code: v.value,
                        bits: v.bits,
                    })
                    .collect();
                table.field_type_lookups.insert(e.name, values);
            }

            table
        }
    }
}

#[cfg(feature = "serde")]
pub use canboat::Document;
