//! An ISO 11783 network node: address claiming, heartbeats, and answers to
//! the network management requests every NMEA 2000 device must handle.
//!
//! [`Device`] performs no I/O and reads no clock. Inbound messages are handed
//! to [`Device::deliver`], time is advanced with [`Device::poll`], and every
//! outbound message goes through the [`Host`] it was built with. The
//! [`client`](crate::client) module drives it with embassy timers.
//!
//! NMEA 2000 addresses are distributed by having a new device send an
//! address claim upon startup. If another device with a numerically smaller
//! NAME already holds the address, it refutes the claim and the newcomer
//! moves on to the next free address. The claim only settles once a full
//! detection window passes without contest.

use alloc::{format, string::String, vec::Vec};
use core::cmp::Ordering;

use embassy_time::{Duration, Instant};

use crate::{
    encoder::Encoder,
    id::{ADDRESS_NULL, DESTINATION_BROADCAST},
    message::{Message, Value},
    registry::Registry,
    well_known::{
        self, ClaimRecord, ConfigurationInfo, DeviceName, ProductInfo, PGN_CONFIGURATION_INFORMATION,
        PGN_ERROR_NOT_SUPPORTED, PGN_GROUP_FUNCTION, PGN_HEARTBEAT, PGN_ISO_ACKNOWLEDGEMENT,
        PGN_ISO_ADDRESS_CLAIM, PGN_ISO_REQUEST, PGN_PGN_LIST, PGN_PRODUCT_INFORMATION,
    },
};

mod devices;
mod timer;

pub use devices::{DeviceEntry, DeviceRegistry, MAX_ADDRESS};
pub use timer::TimerHandle;

/// Delay between the startup ISO request and our first claim.
pub const START_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Unclaimed,
    /// A claim has been sent and the detection window is running.
    Claiming,
    Claimed,
}

/// Notifications passed to [`Host::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The device may transmit application messages. Emitted once per
    /// device, on the first settled claim.
    TransmitAvailable { address: u8 },
    /// A claim settled, including re-claims after a conflict.
    Claimed { address: u8 },
    /// We lost an address conflict and moved on.
    AddressChanged { from: u8, to: u8 },
    /// First address claim seen from another node.
    DeviceDiscovered { address: u8 },
}

/// What a [`Device`] needs from its environment.
pub trait Host {
    type Error;

    /// Put an encoded message on the bus. `message` carries the addressing
    /// (priority, source, destination) for the CAN identifier.
    fn send_pgn(&mut self, message: &Message, data: &[u8]) -> Result<(), Self::Error>;

    fn notify(&mut self, _event: Event) {}
}

impl<T> Host for &mut T
where
    T: Host,
{
    type Error = T::Error;

    fn send_pgn(&mut self, message: &Message, data: &[u8]) -> Result<(), Self::Error> {
        (*self).send_pgn(message, data)
    }

    fn notify(&mut self, event: Event) {
        (*self).notify(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// The host failed to send.
    Send(E),
    /// The registry has no format for this PGN.
    UnknownPgn(u32),
    MissingField { pgn: u32, field: &'static str },
    /// Application messages can only be sent once an address is claimed.
    NotClaimed,
}

impl<E> Error<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Send(_) => "send failed",
            Error::UnknownPgn(_) => "unknown pgn",
            Error::MissingField { .. } => "missing field",
            Error::NotClaimed => "no address claimed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub claim: ClaimRecord,
    pub product_info: ProductInfo,
    /// Answer requests for PGN 126998 with this, if set.
    pub configuration_info: Option<ConfigurationInfo>,
    pub preferred_address: u8,
    /// Quiet time after a claim before it counts as settled.
    pub address_claim_detection_time: Duration,
    pub heartbeat_interval: Duration,
    pub disable_default_transmit_pgns: bool,
    pub disable_default_receive_pgns: bool,
    /// Advertised in addition to the defaults.
    pub transmit_pgns: Vec<u32>,
    pub receive_pgns: Vec<u32>,
    /// Drop unsupported requests silently instead of answering with a NAK.
    pub disable_naks: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            claim: ClaimRecord::default(),
            product_info: ProductInfo::default(),
            configuration_info: None,
            preferred_address: 100,
            address_claim_detection_time: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_secs(60),
            disable_default_transmit_pgns: false,
            disable_default_receive_pgns: false,
            transmit_pgns: Vec::new(),
            receive_pgns: Vec::new(),
            disable_naks: false,
        }
    }
}

impl DeviceConfig {
    pub fn new(unique_number: u32) -> Self {
        Self {
            claim: ClaimRecord::new(unique_number),
            ..Self::default()
        }
    }

    fn pgn_list(defaults: &[u32], disabled: bool, extra: &[u32]) -> Vec<u32> {
        let defaults: &[u32] = if disabled { &[] } else { defaults };
        well_known::union(&[&well_known::DEVICE_PGNS[..], defaults, extra])
    }
}

pub struct Device<R, H> {
    config: DeviceConfig,
    registry: R,
    host: H,
    name: DeviceName,
    address: u8,
    state: State,
    can_send: bool,
    sent_available: bool,
    found_conflict: bool,
    stopped: bool,
    heartbeat_counter: u8,
    devices: DeviceRegistry,
    claim_timer: TimerHandle,
    heartbeat_timer: TimerHandle,
    transmit_pgns: Vec<u32>,
    receive_pgns: Vec<u32>,
}

type DeviceResult<T, H> = Result<T, Error<<H as Host>::Error>>;

impl<R, H> Device<R, H>
where
    R: Registry,
    H: Host,
{
    pub fn new(config: DeviceConfig, registry: R, host: H) -> Self {
        let claim = config.claim.to_message();
        let name = Encoder::new(&registry)
            .encode(&claim)
            .and_then(|data| DeviceName::from_le_bytes(&data))
            .unwrap_or_else(|| config.claim.name());

        let transmit_pgns = DeviceConfig::pgn_list(
            &well_known::DEFAULT_TRANSMIT_PGNS,
            config.disable_default_transmit_pgns,
            &config.transmit_pgns,
        );
        let receive_pgns = DeviceConfig::pgn_list(
            &well_known::DEFAULT_RECEIVE_PGNS,
            config.disable_default_receive_pgns,
            &config.receive_pgns,
        );

        Self {
            address: config.preferred_address,
            config,
            registry,
            host,
            name,
            state: State::Unclaimed,
            can_send: false,
            sent_available: false,
            found_conflict: false,
            stopped: false,
            heartbeat_counter: 0,
            devices: DeviceRegistry::new(),
            claim_timer: TimerHandle::new(),
            heartbeat_timer: TimerHandle::new(),
            transmit_pgns,
            receive_pgns,
        }
    }

    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn name(&self) -> DeviceName {
        self.name
    }

    /// True once the first claim has settled. Stays true across later
    /// conflicts.
    #[inline]
    pub fn can_send(&self) -> bool {
        self.can_send
    }

    /// True once we have lost an address conflict.
    #[inline]
    pub fn found_conflict(&self) -> bool {
        self.found_conflict
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn transmit_pgns(&self) -> &[u32] {
        &self.transmit_pgns
    }

    pub fn receive_pgns(&self) -> &[u32] {
        &self.receive_pgns
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn status(&self) -> String {
        match self.state {
            State::Unclaimed => "Unclaimed".into(),
            State::Claiming => format!("Claiming address {}", self.address),
            State::Claimed => format!("Claimed address {}", self.address),
        }
    }

    /// The earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.stopped {
            return None;
        }

        match (self.claim_timer.deadline(), self.heartbeat_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Ask the bus who holds which address, then claim ours after
    /// [`START_DELAY`]. Only the first call has an effect.
    pub fn start(&mut self, now: Instant) -> DeviceResult<(), H> {
        if self.stopped || self.state != State::Unclaimed || self.claim_timer.is_armed() {
            return Ok(());
        }

        info!("starting, preferred address {}", self.address);
        self.claim_timer.arm(now + START_DELAY);

        let request = Message::new(PGN_ISO_REQUEST)
            .with_priority(6)
            .with_field("PGN", PGN_ISO_ADDRESS_CLAIM);
        self.transmit(request, ADDRESS_NULL)
    }

    /// Cancel both timers. The device ignores all input afterwards.
    pub fn shutdown(&mut self) {
        debug!("shutting down at address {}", self.address);
        self.stopped = true;
        self.claim_timer.cancel();
        self.heartbeat_timer.cancel();
    }

    /// Run whatever timers have expired at `now`.
    pub fn poll(&mut self, now: Instant) -> DeviceResult<(), H> {
        if self.stopped {
            return Ok(());
        }

        if self.claim_timer.fire(now).is_some() {
            match self.state {
                State::Unclaimed => self.send_address_claim(now)?,
                State::Claiming => self.claim_settled(now)?,
                State::Claimed => {}
            }
        }

        if let Some(at) = self.heartbeat_timer.fire(now) {
            self.heartbeat_timer.arm(at + self.config.heartbeat_interval);
            self.send_heartbeat()?;
        }

        Ok(())
    }

    /// Handle an inbound message. Messages addressed to other nodes are
    /// ignored. Failures are logged and the message is dropped.
    pub fn deliver(&mut self, message: &Message, now: Instant) {
        if self.stopped || !(message.is_broadcast() || message.destination == self.address) {
            return;
        }

        if let Err(_err) = self.dispatch(message, now) {
            error!(
                "dropping pgn {} from {}: {}",
                message.pgn,
                message.source.unwrap_or(ADDRESS_NULL),
                _err.kind()
            );
        }
    }

    /// Send an application message from our claimed address.
    pub fn send(&mut self, message: Message) -> DeviceResult<(), H> {
        if !self.can_send {
            return Err(Error::NotClaimed);
        }

        self.transmit(message, self.address)
    }

    fn dispatch(&mut self, message: &Message, now: Instant) -> DeviceResult<(), H> {
        match message.pgn {
            PGN_ISO_REQUEST => self.handle_iso_request(message),
            PGN_GROUP_FUNCTION => self.handle_group_function(message),
            PGN_ISO_ADDRESS_CLAIM => self.handle_address_claim(message, now),
            PGN_PRODUCT_INFORMATION => {
                self.handle_product_information(message);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn transmit(&mut self, mut message: Message, source: u8) -> DeviceResult<(), H> {
        message.source = Some(source);

        let data = Encoder::new(&self.registry)
            .encode(&message)
            .ok_or(Error::UnknownPgn(message.pgn))?;

        trace!("sending pgn {} ({} bytes)", message.pgn, data.len());
        self.host.send_pgn(&message, &data).map_err(Error::Send)
    }

    fn send_address_claim(&mut self, now: Instant) -> DeviceResult<(), H> {
        if self.devices.contains(self.address) {
            let from = self.address;
            self.address = self.devices.next_free(from);
            debug!("address {} is taken, trying {}", from, self.address);
        }

        info!("claiming address {}", self.address);
        self.state = State::Claiming;
        self.claim_timer.arm(now + self.config.address_claim_detection_time);

        self.transmit(self.config.claim.to_message(), self.address)
    }

    fn claim_settled(&mut self, now: Instant) -> DeviceResult<(), H> {
        info!("claimed address {}", self.address);
        self.state = State::Claimed;
        self.can_send = true;
        self.host.notify(Event::Claimed {
            address: self.address,
        });

        if !self.sent_available {
            self.sent_available = true;
            self.host.notify(Event::TransmitAvailable {
                address: self.address,
            });
        }

        if !self.heartbeat_timer.is_armed() {
            self.heartbeat_timer.arm(now + self.config.heartbeat_interval);
        }

        let request = Message::new(PGN_ISO_REQUEST)
            .with_priority(6)
            .with_field("PGN", PGN_PRODUCT_INFORMATION);
        self.transmit(request, self.address)
    }

    fn send_heartbeat(&mut self) -> DeviceResult<(), H> {
        self.heartbeat_counter = if self.heartbeat_counter >= MAX_ADDRESS {
            0
        } else {
            self.heartbeat_counter + 1
        };

        let offset = self.config.heartbeat_interval.as_millis() as f64 / 1000.0;
        let heartbeat = Message::new(PGN_HEARTBEAT)
            .with_priority(7)
            .with_field("Data transmit offset", offset)
            .with_field("Sequence Counter", self.heartbeat_counter)
            .with_field("Controller 1 State", "Error Active");

        self.transmit(heartbeat, self.address)
    }

    fn handle_iso_request(&mut self, message: &Message) -> DeviceResult<(), H> {
        let requested = required_pgn::<H>(message)?;
        let requester = message.source.unwrap_or(DESTINATION_BROADCAST);

        // no answers from an address we have not claimed yet
        if self.state == State::Unclaimed {
            debug!("ignoring request for {} before claiming", requested);
            return Ok(());
        }

        match requested {
            PGN_PRODUCT_INFORMATION => {
                self.transmit(self.config.product_info.to_message(), self.address)
            }
            PGN_CONFIGURATION_INFORMATION => {
                let info = self.config.configuration_info.as_ref();
                match info.map(ConfigurationInfo::to_message) {
                    Some(info) => self.transmit(info, self.address),
                    None => Ok(()),
                }
            }
            PGN_ISO_ADDRESS_CLAIM => self.transmit(self.config.claim.to_message(), self.address),
            PGN_PGN_LIST => self.send_pgn_lists(requester),
            other if !self.config.disable_naks => self.send_nak(requester, other),
            _ => Ok(()),
        }
    }

    fn send_pgn_lists(&mut self, destination: u8) -> DeviceResult<(), H> {
        let list = |function: u8, pgns: &[u32]| {
            pgns.iter().fold(
                Message::new(PGN_PGN_LIST)
                    .with_priority(6)
                    .with_destination(destination)
                    .with_field("Function Code", function),
                |msg, pgn| msg.with_entry([("PGN", *pgn)]),
            )
        };

        let receive = list(1, &self.receive_pgns);
        let transmit = list(0, &self.transmit_pgns);

        self.transmit(receive, self.address)?;
        self.transmit(transmit, self.address)
    }

    fn send_nak(&mut self, destination: u8, pgn: u32) -> DeviceResult<(), H> {
        debug!("nak for pgn {} to {}", pgn, destination);

        let nak = Message::new(PGN_ISO_ACKNOWLEDGEMENT)
            .with_priority(6)
            .with_destination(destination)
            .with_field("Control", 1)
            .with_field("Group Function", 255)
            .with_field("PGN", pgn);
        self.transmit(nak, self.address)
    }

    fn handle_group_function(&mut self, message: &Message) -> DeviceResult<(), H> {
        let function = match message.get("Function Code") {
            Some(Value::Text(text)) => match text.as_str() {
                "Request" => Some(0),
                "Command" => Some(1),
                _ => None,
            },
            Some(other) => other.as_number().map(|n| n as i64),
            None => None,
        };

        if !matches!(function, Some(0 | 1)) || self.config.disable_naks {
            return Ok(());
        }

        let pgn = required_pgn::<H>(message)?;
        let requester = message.source.unwrap_or(DESTINATION_BROADCAST);

        let ack = Message::new(PGN_GROUP_FUNCTION)
            .with_destination(requester)
            .with_field("Function Code", 2)
            .with_field("PGN", pgn)
            .with_field("PGN error code", PGN_ERROR_NOT_SUPPORTED)
            .with_field("Transmission interval/Priority error code", 0)
            .with_field("# of Parameters", 0);
        self.transmit(ack, self.address)
    }

    fn handle_address_claim(&mut self, message: &Message, now: Instant) -> DeviceResult<(), H> {
        let source = message.source.ok_or(Error::MissingField {
            pgn: message.pgn,
            field: "source",
        })?;

        if source != self.address {
            self.register_claim(source, message);
            return Ok(());
        }

        let data = Encoder::new(&self.registry)
            .encode(message)
            .ok_or(Error::UnknownPgn(message.pgn))?;
        let theirs = DeviceName::from_le_bytes(&data).ok_or(Error::MissingField {
            pgn: message.pgn,
            field: "NAME",
        })?;

        // not claiming yet: a stronger holder is skipped once we do, a
        // weaker one will be displaced by our claim
        if self.state == State::Unclaimed {
            if self.name > theirs {
                self.register_claim(source, message);
            }
            return Ok(());
        }

        match self.name.cmp(&theirs) {
            Ordering::Less => {
                info!("address {} contested, we keep it", self.address);
                self.send_address_claim(now)
            }
            Ordering::Greater => {
                self.found_conflict = true;
                let from = self.address;
                self.devices.record_claim(from, message);
                self.address = self.devices.next_free(from);
                info!("lost address {}, moving to {}", from, self.address);
                self.host.notify(Event::AddressChanged {
                    from,
                    to: self.address,
                });
                self.send_address_claim(now)
            }
            Ordering::Equal => Ok(()),
        }
    }

    fn register_claim(&mut self, source: u8, claim: &Message) {
        if source <= MAX_ADDRESS && self.devices.record_claim(source, claim) {
            debug!("registered device at {}", source);
            self.host.notify(Event::DeviceDiscovered { address: source });
        }
    }

    fn handle_product_information(&mut self, message: &Message) {
        match message.source {
            Some(source) if source != self.address && source <= MAX_ADDRESS => {
                self.devices.record_product_information(source, message);
            }
            _ => {}
        }
    }
}

fn required_pgn<H: Host>(message: &Message) -> DeviceResult<u32, H> {
    message
        .number("PGN")
        .map(|n| n as u32)
        .ok_or(Error::MissingField {
            pgn: message.pgn,
            field: "PGN",
        })
}
