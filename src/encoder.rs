//! Turns a symbolic [`Message`] into its on-wire bytes.
//!
//! ```
//! use nmea2000_node::{encode, well_known, Message};
//!
//! let registry = well_known::registry();
//! let msg = Message::new(well_known::PGN_ISO_REQUEST).with_field("PGN", 60928);
//!
//! assert_eq!(encode(&registry, &msg), Some(vec![0x00, 0xee, 0x00]));
//! ```

use alloc::vec::Vec;

use crate::{
    codec::{field_value, BitWriter, FieldContext},
    message::{Message, Value},
    registry::{FieldDefinition, FieldResolver, FormatDefinition, NoResolver, Registry, VARIABLE_LENGTH},
};

/// Formats whose declared length is shorter than what goes on the wire.
const LENGTH_OVERRIDES: [(u32, usize); 4] = [(129_029, 45), (127_257, 8), (127_258, 8), (127_251, 8)];

fn padded_length(format: &FormatDefinition) -> usize {
    LENGTH_OVERRIDES
        .iter()
        .find(|(pgn, _)| *pgn == format.pgn)
        .map_or(format.length as usize, |(_, len)| *len)
}

/// Does a candidate's field at the same position accept `value`? Text is
/// compared against the description, anything else against the code.
fn discriminator_matches(candidate: Option<&FieldDefinition>, value: &Value) -> bool {
    let Some(field) = candidate else {
        return false;
    };

    match value {
        Value::Text(text) => field.description.as_deref() == Some(text.as_str()),
        other => match (field.discriminator, other.as_number()) {
            (Some(code), Some(n)) => f64::from(code) == n,
            _ => false,
        },
    }
}

pub struct Encoder<'a, R: ?Sized> {
    registry: &'a R,
    resolver: &'a dyn FieldResolver,
}

impl<'a, R: Registry + ?Sized> Encoder<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self {
            registry,
            resolver: &NoResolver,
        }
    }

    /// Use `resolver` to type VARIABLE fields.
    #[must_use]
    pub fn with_resolver(mut self, resolver: &'a dyn FieldResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Encode a message, or `None` if the registry has no format for its PGN.
    pub fn encode(&self, message: &Message) -> Option<Vec<u8>> {
        let mut candidates = self.registry.lookup(message.pgn);
        let Some(&first) = candidates.first() else {
            debug!("no format for pgn {}", message.pgn);
            return None;
        };

        let mut format = first;
        let mut w = BitWriter::new();

        let mut index = 0;
        while index < format.fixed_fields().len() {
            let mut value = field_value(&message.fields, &format.fields[index]);
            let code;

            if format.fields[index].discriminator.is_some() {
                if let Some(v) = value {
                    candidates.retain(|c| discriminator_matches(c.fields.get(index), v));
                    if let Some(&selected) = candidates.first() {
                        format = selected;
                    }
                }

                if let Some(c) = format.fields[index].discriminator {
                    if value.is_none() || candidates.first().is_some() {
                        code = Value::Number(c.into());
                        value = Some(&code);
                    }
                }
            }

            let ctx = FieldContext {
                registry: self.registry,
                resolver: self.resolver,
                message,
                fields: &format.fields,
            };
            ctx.write_field(&mut w, &format.fields[index], value, None);

            index += 1;
        }

        let ctx = FieldContext {
            registry: self.registry,
            resolver: self.resolver,
            message,
            fields: &format.fields,
        };

        if format.repeating_fields > 0 {
            for entry in &message.list {
                for field in format.repeating_fields() {
                    ctx.write_field(&mut w, field, field_value(entry, field), None);
                }
            }
        }

        w.finish_byte();

        let ends_with_string = format
            .fields
            .last()
            .is_some_and(|f| f.field_type.is_length_prefixed_string());

        if format.length != VARIABLE_LENGTH && !ends_with_string && format.repeating_fields == 0 {
            let len = padded_length(format);
            while w.byte_len() < len {
                w.write_u8(0xff);
            }
        }

        Some(w.into_bytes())
    }
}

/// Encode `message` against `registry` without a field resolver.
pub fn encode<R: Registry + ?Sized>(registry: &R, message: &Message) -> Option<Vec<u8>> {
    Encoder::new(registry).encode(message)
}
