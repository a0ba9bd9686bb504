//! An NMEA 2000 (N2K) node for embedded systems and gateways.
//!
//! The crate has two halves. The [`encoder`] turns a symbolic [`Message`],
//! a PGN plus named field values, into its on-wire bytes, driven by format
//! definitions from a [`Registry`]. Definitions follow the layout of [the
//! Canboat project's PGN database](https://canboat.github.io/canboat/canboat.html)
//! and can be loaded from its JSON export with the `serde` feature.
//!
//! The [`device`] half is an ISO 11783 network participant: it claims a
//! source address, defends it against conflicting claims, answers the
//! mandatory network management requests and sends heartbeats. It is
//! sans-IO; the [`client`] module (feature `client`) drives it with embassy.
//!
//! ```
//! use nmea2000_node::{well_known, Encoder, Message};
//!
//! let registry = well_known::registry();
//! let heartbeat = Message::new(well_known::PGN_HEARTBEAT)
//!     .with_field("Data transmit offset", 60)
//!     .with_field("Sequence Counter", 5)
//!     .with_field("Controller 1 State", "Error Active");
//!
//! let data = Encoder::new(&registry).encode(&heartbeat).unwrap();
//! assert_eq!(data, [0x70, 0x17, 0x05, 0xfc, 0xff, 0xff, 0xff, 0xff]);
//! ```

#![no_std]

extern crate alloc;

#[macro_use]
mod fmt;

#[cfg(feature = "client")]
pub mod client;
mod codec;
pub mod device;
pub mod encoder;
pub mod fast_packet;
mod frame;
mod id;
pub mod message;
pub mod registry;
pub mod well_known;

pub use device::{Device, DeviceConfig, Event, Host, State};
pub use encoder::{encode, Encoder};
pub use fast_packet::FastPacket;
pub use frame::{Frames, NmeaFrame};
pub use id::{Format, Id, ADDRESS_NULL, DESTINATION_BROADCAST};
pub use message::{Message, Value};
pub use registry::{FieldResolver, FormatTable, Registry};
