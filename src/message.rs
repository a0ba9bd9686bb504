//! Symbolic NMEA 2000 messages: a PGN, addressing, and a map of field values
//! keyed by field name (or field id).

use alloc::{
    borrow::Cow,
    collections::BTreeMap,
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    frame::{Frames, NmeaFrame},
    id::{Id, DESTINATION_BROADCAST},
};

/// Priority used for the CAN identifier when a message does not carry one.
pub const DEFAULT_PRIORITY: u8 = 3;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Flag(bool),
    Bytes(Vec<u8>),
    /// Names of the flags that are set, for bit-enumeration fields.
    Set(Vec<String>),
}

impl Value {
    /// Numeric view of the value. Text is parsed, flags become 0 or 1.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Flag(b) => Some(*b as u8 as f64),
            Value::Bytes(_) | Value::Set(_) => None,
        }
    }

    /// Textual view of the value. Numbers are rendered without a trailing
    /// `.0` when they are integral.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Text(s) => Some(Cow::Borrowed(s)),
            Value::Number(n) if (*n as i64) as f64 == *n => {
                Some(Cow::Owned((*n as i64).to_string()))
            }
            Value::Number(n) => Some(Cow::Owned(format!("{n}"))),
            Value::Flag(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Value::Bytes(_) | Value::Set(_) => None,
        }
    }
}

macro_rules! value_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Number(value as f64)
                }
            }
        )*
    };
}

value_from_number!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, usize);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Flag(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<&[&str]> for Value {
    fn from(value: &[&str]) -> Self {
        Value::Set(value.iter().map(|s| s.to_string()).collect())
    }
}

pub type Fields = BTreeMap<String, Value>;

/// A NMEA 2000 message in symbolic form.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub pgn: u32,
    pub priority: Option<u8>,
    pub source: Option<u8>,
    pub destination: u8,
    pub fields: Fields,
    /// Entries of the repeating field set, in wire order.
    pub list: Vec<Fields>,
}

impl Message {
    /// A broadcast message without any fields.
    pub fn new(pgn: u32) -> Self {
        Self {
            pgn,
            priority: None,
            source: None,
            destination: DESTINATION_BROADCAST,
            fields: Fields::new(),
            list: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: u8) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Append one entry of the repeating field set.
    #[must_use]
    pub fn with_entry<'a, I, V>(mut self, entry: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<Value>,
    {
        self.list.push(
            entry
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.into()))
                .collect(),
        );
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric value of a field, see [`Value::as_number`].
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    /// Text value of a field, only for [`Value::Text`].
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.destination == DESTINATION_BROADCAST
    }

    /// The 29-bit CAN identifier this message is sent with.
    pub fn id(&self) -> Id {
        Id::new(
            self.priority.unwrap_or(DEFAULT_PRIORITY),
            self.pgn,
            self.source.unwrap_or(0),
            self.destination,
        )
    }

    /// Split the encoded form of this message into CAN frames. Messages
    /// longer than 8 bytes become a Fast Packet sequence; `None` if the data
    /// does not fit one.
    pub fn frames<'d>(&self, data: &'d [u8], sequence_no: u8) -> Option<Frames<'d>> {
        NmeaFrame::split(self.id(), data, sequence_no)
    }
}
