//! Per-field encode strategies on top of a little-endian bit writer.
//!
//! Fields are packed LSB first: the first bit of a field lands in the lowest
//! free bit of the current byte, so byte-aligned integers come out as plain
//! little-endian bytes.

use alloc::{borrow::Cow, string::String, vec::Vec};
use core::slice;

use chrono::{DateTime, NaiveDate};

use crate::{
    message::{Fields, Message, Value},
    registry::{FieldDefinition, FieldResolver, FieldType, Registry},
};

/// Longest text a length-prefixed string can carry.
const MAX_LZ_LEN: usize = u8::MAX as usize;
const MAX_LAU_LEN: usize = u8::MAX as usize - 2;

/// Growable buffer written bit by bit.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    buf: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bits.div_ceil(8)
    }

    /// Write the low `count` bits of `value`. Bits above 64 are zero.
    pub fn write_bits(&mut self, mut value: u64, mut count: u32) {
        while count > 0 {
            let offset = (self.bits % 8) as u32;
            if offset == 0 {
                self.buf.push(0);
            }

            let take = (8 - offset).min(count);
            let mask = ((1u16 << take) - 1) as u64;
            self.buf[self.bits / 8] |= ((value & mask) << offset) as u8;

            value >>= take;
            count -= take;
            self.bits += take as usize;
        }
    }

    pub fn write_ones(&mut self, mut count: u32) {
        while count > 0 {
            let n = count.min(64);
            self.write_bits(u64::MAX, n);
            count -= n;
        }
    }

    pub fn write_zeros(&mut self, mut count: u32) {
        while count > 0 {
            let n = count.min(64);
            self.write_bits(0, n);
            count -= n;
        }
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(value.into(), 8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.write_u8(*b);
        }
    }

    /// Fill the rest of a partially written byte with one-bits.
    pub fn finish_byte(&mut self) {
        let rem = (8 - self.bits % 8) % 8;
        self.write_ones(rem as u32);
    }

    /// The last byte touched so far.
    #[inline]
    pub fn last_byte(&self) -> Option<u8> {
        self.buf.last().copied()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Value of `field` in a field map, by name first, then by id.
pub(crate) fn field_value<'m>(fields: &'m Fields, field: &FieldDefinition) -> Option<&'m Value> {
    fields.get(&field.name).or_else(|| fields.get(&field.id))
}

/// Round half away from zero.
pub(crate) fn round(x: f64) -> f64 {
    if !(x > -4.5e15 && x < 4.5e15) {
        return x;
    }

    let t = x as i64 as f64;
    let frac = x - t;

    if frac >= 0.5 {
        t + 1.0
    } else if frac <= -0.5 {
        t - 1.0
    } else {
        t
    }
}

/// Raw two's complement bits of a number, truncated toward zero.
#[inline]
fn raw_bits(number: f64, signed: bool) -> u64 {
    if signed || number < 0.0 {
        number as i64 as u64
    } else {
        number as u64
    }
}

fn days_since_epoch(text: &str) -> Option<f64> {
    let text = text.trim();
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;

    for fmt in ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some((date - epoch).num_days() as f64);
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp().div_euclid(86_400) as f64)
}

fn seconds_since_midnight(text: &str) -> Option<f64> {
    let mut parts = text.trim().split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = parts.next()?.trim().parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn scale_pressure(unit: Option<&str>, value: f64) -> f64 {
    match unit.and_then(|u| u.chars().next()) {
        Some('h' | 'H') => value / 100.0,
        Some('k' | 'K') => value / 1000.0,
        Some('d') => value * 10.0,
        _ => value,
    }
}

/// Everything a field writer may consult besides the field itself.
pub(crate) struct FieldContext<'a, R: ?Sized> {
    pub registry: &'a R,
    pub resolver: &'a dyn FieldResolver,
    pub message: &'a Message,
    /// Fields of the currently selected format.
    pub fields: &'a [FieldDefinition],
}

impl<R: Registry + ?Sized> FieldContext<'_, R> {
    /// Write one field. `width` overrides the field's own bit length.
    pub fn write_field(
        &self,
        w: &mut BitWriter,
        field: &FieldDefinition,
        value: Option<&Value>,
        width: Option<u32>,
    ) {
        let bits = match width {
            Some(bits) => bits,
            None if field.bit_length_variable && field.field_type == FieldType::KeyValue => {
                match self.key_bits() {
                    Some(bits) => bits,
                    None => {
                        debug!("pgn {}: no width for key-value field", self.message.pgn);
                        return;
                    }
                }
            }
            None => field.bit_length,
        };

        let Some(value) = value else {
            self.write_absent(w, field, bits);
            return;
        };

        let mut value = self.map_value(field, value);

        if let (Some(resolution), Value::Number(n)) = (field.resolution, value.as_ref()) {
            if resolution != 0.0 {
                value = Cow::Owned(Value::Number(round(n / resolution)));
            }
        }

        match field.field_type {
            FieldType::BitLookup => return self.write_bit_lookup(w, field, bits, Some(&*value)),
            FieldType::StringFix
            | FieldType::StringLz
            | FieldType::StringLau
            | FieldType::StringStartStop => return self.write_string(w, field, bits, Some(&*value)),
            FieldType::Variable => return self.write_variable(w, &*value),
            _ => {}
        }

        let mut number = match value.as_ref() {
            Value::Bytes(bytes) => return w.write_bytes(bytes),
            Value::Set(_) => return self.write_absent(w, field, bits),
            v => v.as_number().unwrap_or(f64::NAN),
        };

        if let Some(offset) = field.offset {
            number -= offset;
        }

        match field.unit.as_deref() {
            Some("kWh") => number /= 3.6e6,
            Some("Ah") => number /= 3600.0,
            _ => {}
        }

        match bits {
            8 | 16 | 32 => w.write_bits(raw_bits(number, field.signed), bits),
            24 | 48 => {
                // little-endian two's complement, one byte at a time
                let mut raw = number as i64;
                for _ in 0..bits / 8 {
                    w.write_u8(raw as u8);
                    raw >>= 8;
                }
            }
            64 => w.write_bytes(&raw_bits(number, field.signed).to_le_bytes()),
            _ => w.write_bits(raw_bits(number, field.signed), bits),
        }
    }

    /// "Not available": all ones, or a 0x7f top byte for signed byte-aligned
    /// fields. Byte-aligned reserved fields are zero.
    fn write_absent(&self, w: &mut BitWriter, field: &FieldDefinition, bits: u32) {
        match field.field_type {
            FieldType::BitLookup => self.write_bit_lookup(w, field, bits, None),
            FieldType::StringFix
            | FieldType::StringLz
            | FieldType::StringLau
            | FieldType::StringStartStop => self.write_string(w, field, bits, None),
            _ if bits > 0 && bits % 8 == 0 => {
                if field.is_reserved() {
                    w.write_zeros(bits);
                } else {
                    w.write_ones(bits - 8);
                    w.write_u8(if field.signed { 0x7f } else { 0xff });
                }
            }
            _ => w.write_ones(bits),
        }
    }

    /// Map symbolic values to numbers. Anything that fails to map is passed
    /// through as is.
    fn map_value<'v>(&self, field: &FieldDefinition, value: &'v Value) -> Cow<'v, Value> {
        let Value::Text(text) = value else {
            if let (FieldType::Pressure, Value::Number(n)) = (field.field_type, value) {
                return Cow::Owned(Value::Number(scale_pressure(field.unit.as_deref(), *n)));
            }
            return Cow::Borrowed(value);
        };

        let mapped = if field.id == "industryCode" {
            self.registry.industry_code(text).map(f64::from)
        } else {
            match field.field_type {
                FieldType::Date => days_since_epoch(text),
                FieldType::Pressure => value
                    .as_number()
                    .map(|n| scale_pressure(field.unit.as_deref(), n)),
                FieldType::Time => seconds_since_midnight(text),
                FieldType::Lookup | FieldType::FieldTypeLookup => {
                    let numeric_timestamp = field.id == "timeStamp"
                        && text.trim().parse::<f64>().is_ok_and(|n| n < 60.0);

                    if numeric_timestamp {
                        None
                    } else {
                        self.lookup(field, text).map(f64::from)
                    }
                }
                _ => None,
            }
        };

        match mapped {
            Some(n) => Cow::Owned(Value::Number(n)),
            None => {
                if matches!(
                    field.field_type,
                    FieldType::Date
                        | FieldType::Time
                        | FieldType::Pressure
                        | FieldType::Lookup
                        | FieldType::FieldTypeLookup
                ) {
                    debug!("pgn {}: passing unmapped text through", self.message.pgn);
                }
                Cow::Borrowed(value)
            }
        }
    }

    fn lookup(&self, field: &FieldDefinition, name: &str) -> Option<u32> {
        if let Some(enumeration) = &field.lookup_enumeration {
            self.registry.enumeration_value(enumeration, name)
        } else {
            let enumeration = field.lookup_field_type_enumeration.as_deref()?;
            self.registry.field_type_value(enumeration, name)
        }
    }

    /// Width of a key-value field, tagged by the value of the "key" field.
    fn key_bits(&self) -> Option<u32> {
        let key = self.fields.iter().find(|f| f.id == "key")?;
        let enumeration = key.lookup_field_type_enumeration.as_deref()?;

        let code = match field_value(&self.message.fields, key)? {
            Value::Text(name) => self.registry.field_type_value(enumeration, name)?,
            other => other.as_number()? as u32,
        };

        self.registry.field_type_bits(enumeration, code)
    }

    /// One bit per flag, set iff the flag's name is in the given set.
    fn write_bit_lookup(
        &self,
        w: &mut BitWriter,
        field: &FieldDefinition,
        bits: u32,
        value: Option<&Value>,
    ) {
        let names: &[String] = match value {
            Some(Value::Set(names)) => names,
            Some(Value::Text(name)) => slice::from_ref(name),
            Some(v @ (Value::Number(_) | Value::Flag(_))) => {
                let raw = v.as_number().unwrap_or_default();
                return w.write_bits(raw_bits(raw, false), bits);
            }
            _ => &[],
        };

        if names.is_empty() {
            if bits % 8 == 0 {
                w.write_zeros(bits);
            } else {
                w.write_ones(bits);
            }
            return;
        }

        let enumeration = field.lookup_bit_enumeration.as_deref();
        for bit in 0..bits {
            let set = enumeration
                .and_then(|e| self.registry.bit_enumeration_name(e, bit))
                .is_some_and(|name| names.iter().any(|n| n == name));
            w.write_bits(set as u64, 1);
        }
    }

    fn write_string(
        &self,
        w: &mut BitWriter,
        field: &FieldDefinition,
        bits: u32,
        value: Option<&Value>,
    ) {
        let text = value.and_then(Value::as_text).unwrap_or_default();
        let mut bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        let pgn = self.message.pgn;

        match field.field_type {
            FieldType::StringFix => {
                let width = (bits / 8) as usize;
                let fill = if bytes.is_empty() && Self::at_filled(pgn, &field.id) {
                    0x40
                } else {
                    0xff
                };

                bytes.resize(width, fill);
                w.write_bytes(&bytes);
            }
            FieldType::StringLz => {
                bytes.truncate(MAX_LZ_LEN);
                w.write_u8(bytes.len() as u8);
                w.write_bytes(&bytes);
                w.write_u8(0);
            }
            FieldType::StringLau => {
                if pgn == 129_041 && field.id == "atonName" && value.is_some() {
                    bytes.resize(18, b' ');
                }

                // the length byte counts itself and the control byte
                bytes.truncate(MAX_LAU_LEN);
                w.write_u8(bytes.len() as u8 + 2);
                w.write_u8(1); // ASCII
                w.write_bytes(&bytes);
            }
            _ => {
                w.write_u8(0x02);
                w.write_bytes(&bytes);
                w.write_u8(0x01);
            }
        }
    }

    /// Fixed strings padded with '@' rather than 0xff when empty.
    fn at_filled(pgn: u32, id: &str) -> bool {
        (pgn == 129_810 && (id == "vendorId" || id == "callsign")) || (pgn == 129_809 && id == "name")
    }

    /// The field referenced by the preceding parameter byte, written with its
    /// own scaling and a width rounded up to whole bytes.
    fn write_variable(&self, w: &mut BitWriter, value: &Value) {
        let Some(pgn) = self.message.number("PGN") else {
            debug!("pgn {}: variable field without a PGN field", self.message.pgn);
            return;
        };
        let Some(preceding) = w.last_byte() else {
            return;
        };
        let Some(target) = self.resolver.resolve_field(pgn as u32, preceding, self.message) else {
            debug!("pgn {}: could not resolve field {}", pgn as u32, preceding);
            return;
        };

        let bits = (target.bit_length + 7) & !7;
        self.write_field(w, &target, Some(value), Some(bits));
    }
}
