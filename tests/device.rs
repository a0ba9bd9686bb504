use std::convert::Infallible;

use embassy_time::{Duration, Instant};
use nmea2000_node::{
    device::{Error, START_DELAY},
    well_known::{
        self, ClaimRecord, ConfigurationInfo, PGN_CONFIGURATION_INFORMATION, PGN_GROUP_FUNCTION,
        PGN_HEARTBEAT, PGN_ISO_ACKNOWLEDGEMENT, PGN_ISO_ADDRESS_CLAIM, PGN_ISO_REQUEST, PGN_PGN_LIST,
        PGN_PRODUCT_INFORMATION,
    },
    Device, DeviceConfig, Event, FormatTable, Host, Message, State, ADDRESS_NULL,
};

#[derive(Debug, Default)]
struct Recorder {
    sent: Vec<(Message, Vec<u8>)>,
    events: Vec<Event>,
}

impl Recorder {
    fn take(&mut self) -> Vec<(Message, Vec<u8>)> {
        std::mem::take(&mut self.sent)
    }
}

impl Host for Recorder {
    type Error = Infallible;

    fn send_pgn(&mut self, message: &Message, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.push((message.clone(), data.to_vec()));
        Ok(())
    }

    fn notify(&mut self, event: Event) {
        self.events.push(event);
    }
}

fn ms(millis: u64) -> Instant {
    Instant::from_millis(millis)
}

fn device(config: DeviceConfig) -> Device<FormatTable, Recorder> {
    Device::new(config, well_known::registry(), Recorder::default())
}

fn claim_from(source: u8, unique_number: u32) -> Message {
    ClaimRecord::new(unique_number).to_message().with_source(source)
}

fn request(source: u8, pgn: u32) -> Message {
    Message::new(PGN_ISO_REQUEST).with_source(source).with_field("PGN", pgn)
}

/// A device that has settled on its preferred address at t = 6000 ms.
fn claimed(config: DeviceConfig) -> Device<FormatTable, Recorder> {
    let mut dev = device(config);
    dev.start(ms(0)).unwrap();
    dev.poll(ms(1000)).unwrap();
    dev.poll(ms(6000)).unwrap();
    assert_eq!(dev.state(), State::Claimed);
    dev.host_mut().take();
    dev.host_mut().events.clear();
    dev
}

#[test]
fn start_asks_for_claims_then_claims() {
    let mut dev = device(DeviceConfig::new(7));
    assert_eq!(dev.status(), "Unclaimed");

    dev.start(ms(0)).unwrap();
    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.pgn, PGN_ISO_REQUEST);
    assert_eq!(sent[0].0.source, Some(ADDRESS_NULL));
    assert!(sent[0].0.is_broadcast());
    assert_eq!(sent[0].1, [0x00, 0xee, 0x00]);

    // starting twice does nothing
    dev.start(ms(10)).unwrap();
    assert!(dev.host().sent.is_empty());

    dev.poll(ms(999)).unwrap();
    assert_eq!(dev.state(), State::Unclaimed);
    assert_eq!(dev.next_deadline(), Some(ms(0) + START_DELAY));

    dev.poll(ms(1000)).unwrap();
    let sent = dev.host_mut().take();
    assert_eq!(dev.state(), State::Claiming);
    assert_eq!(dev.status(), "Claiming address 100");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.pgn, PGN_ISO_ADDRESS_CLAIM);
    assert_eq!(sent[0].0.source, Some(100));
    assert_eq!(sent[0].0.priority, Some(6));
    assert_eq!(sent[0].1, dev.name().0.to_le_bytes());
}

#[test]
fn claim_settles_after_a_quiet_window() {
    let mut dev = device(DeviceConfig::new(7));
    dev.start(ms(0)).unwrap();
    dev.poll(ms(1000)).unwrap();
    dev.host_mut().take();

    dev.poll(ms(5999)).unwrap();
    assert_eq!(dev.state(), State::Claiming);
    assert!(!dev.can_send());

    dev.poll(ms(6000)).unwrap();
    assert_eq!(dev.state(), State::Claimed);
    assert_eq!(dev.status(), "Claimed address 100");
    assert!(dev.can_send());
    assert_eq!(
        dev.host().events,
        [
            Event::Claimed { address: 100 },
            Event::TransmitAvailable { address: 100 },
        ]
    );

    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.pgn, PGN_ISO_REQUEST);
    assert_eq!(sent[0].0.number("PGN"), Some(PGN_PRODUCT_INFORMATION.into()));
    assert_eq!(sent[0].0.source, Some(100));

    assert_eq!(dev.next_deadline(), Some(ms(66_000)));
}

#[test]
fn every_claim_restarts_the_window() {
    let mut dev = device(DeviceConfig::new(1));
    dev.start(ms(0)).unwrap();
    dev.poll(ms(1000)).unwrap();

    // a weaker node contests our address; we defend it and start over
    dev.deliver(&claim_from(100, 5000), ms(4000));
    let sent = dev.host_mut().take();
    assert_eq!(sent.last().unwrap().0.pgn, PGN_ISO_ADDRESS_CLAIM);
    assert_eq!(dev.address(), 100);
    assert!(!dev.found_conflict());

    dev.poll(ms(6000)).unwrap();
    assert_eq!(dev.state(), State::Claiming);

    dev.poll(ms(9000)).unwrap();
    assert_eq!(dev.state(), State::Claimed);
    assert_eq!(dev.address(), 100);
}

#[test]
fn losing_a_conflict_moves_to_the_next_free_address() {
    let mut dev = device(DeviceConfig::new(5000));
    dev.start(ms(0)).unwrap();
    dev.deliver(&claim_from(101, 9), ms(500));
    dev.poll(ms(1000)).unwrap();
    dev.host_mut().take();

    dev.deliver(&claim_from(100, 1), ms(2000));

    assert!(dev.found_conflict());
    assert_eq!(dev.address(), 102);
    assert_eq!(dev.state(), State::Claiming);
    assert!(dev.devices().contains(100));
    assert!(dev.host().events.contains(&Event::AddressChanged { from: 100, to: 102 }));

    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.pgn, PGN_ISO_ADDRESS_CLAIM);
    assert_eq!(sent[0].0.source, Some(102));

    dev.poll(ms(7000)).unwrap();
    assert_eq!(dev.status(), "Claimed address 102");
}

#[test]
fn conflicts_after_claiming_go_back_to_claiming() {
    let mut dev = claimed(DeviceConfig::new(5000));

    dev.deliver(&claim_from(100, 1), ms(10_000));
    assert_eq!(dev.state(), State::Claiming);
    assert_eq!(dev.address(), 101);

    dev.poll(ms(15_000)).unwrap();
    assert_eq!(dev.state(), State::Claimed);
    // transmit availability is announced only once
    assert_eq!(
        dev.host().events,
        [
            Event::AddressChanged { from: 100, to: 101 },
            Event::Claimed { address: 101 },
        ]
    );
}

#[test]
fn known_addresses_are_skipped_before_claiming() {
    let mut dev = device(DeviceConfig::new(7));
    dev.start(ms(0)).unwrap();

    dev.deliver(&claim_from(100, 1), ms(100));
    dev.deliver(&claim_from(101, 2), ms(200));
    dev.deliver(&claim_from(101, 2), ms(300));

    assert_eq!(
        dev.host().events,
        [
            Event::DeviceDiscovered { address: 100 },
            Event::DeviceDiscovered { address: 101 },
        ]
    );

    dev.poll(ms(1000)).unwrap();
    assert_eq!(dev.address(), 102);
    assert!(!dev.found_conflict());
    assert_eq!(dev.devices().len(), 2);
}

#[test]
fn weaker_holders_are_displaced() {
    let mut dev = device(DeviceConfig::new(1));
    dev.start(ms(0)).unwrap();

    dev.deliver(&claim_from(100, 5000), ms(500));
    assert!(dev.devices().is_empty());

    dev.poll(ms(1000)).unwrap();
    assert_eq!(dev.status(), "Claiming address 100");
}

#[test]
fn heartbeats_cycle_their_counter() {
    let mut dev = claimed(DeviceConfig::new(7));

    dev.poll(ms(65_999)).unwrap();
    assert!(dev.host().sent.is_empty());

    dev.poll(ms(66_000)).unwrap();
    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 1);
    let (heartbeat, data) = &sent[0];
    assert_eq!(heartbeat.pgn, PGN_HEARTBEAT);
    assert_eq!(heartbeat.priority, Some(7));
    assert_eq!(heartbeat.source, Some(100));
    assert_eq!(data, &[0x70, 0x17, 0x01, 0xfc, 0xff, 0xff, 0xff, 0xff]);

    let mut counters = vec![data[2]];
    for n in 2..=254u64 {
        dev.poll(ms(6000 + 60_000 * n)).unwrap();
        counters.push(dev.host_mut().take()[0].1[2]);
    }

    assert_eq!(counters[251], 252);
    assert_eq!(counters[252], 0);
    assert_eq!(counters[253], 1);
}

#[test]
fn answers_information_requests() {
    let config = DeviceConfig {
        configuration_info: Some(ConfigurationInfo::for_server("http://gw", "gateway", "1.0")),
        ..DeviceConfig::new(7)
    };
    let mut dev = claimed(config);

    dev.deliver(&request(33, PGN_PRODUCT_INFORMATION), ms(7000));
    dev.deliver(&request(33, PGN_CONFIGURATION_INFORMATION), ms(7000));
    dev.deliver(&request(33, PGN_ISO_ADDRESS_CLAIM), ms(7000));

    let sent = dev.host_mut().take();
    let pgns: Vec<_> = sent.iter().map(|(m, _)| m.pgn).collect();
    assert_eq!(
        pgns,
        [PGN_PRODUCT_INFORMATION, PGN_CONFIGURATION_INFORMATION, PGN_ISO_ADDRESS_CLAIM]
    );
    assert_eq!(sent[0].1.len(), 134);
    assert!(sent.iter().all(|(m, _)| m.source == Some(100)));

    // answering a claim request does not restart claiming
    assert_eq!(dev.state(), State::Claimed);
}

#[test]
fn configuration_requests_need_configuration() {
    let mut dev = claimed(DeviceConfig::new(7));

    dev.deliver(&request(33, PGN_CONFIGURATION_INFORMATION), ms(7000));
    assert!(dev.host().sent.is_empty());
}

#[test]
fn pgn_lists_go_to_the_requester() {
    let mut dev = claimed(DeviceConfig::new(7));

    dev.deliver(&request(33, PGN_PGN_LIST), ms(7000));
    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 2);

    let (receive, data) = &sent[0];
    assert_eq!(receive.pgn, PGN_PGN_LIST);
    assert_eq!(receive.destination, 33);
    assert_eq!(receive.number("Function Code"), Some(1.0));
    assert_eq!(receive.list.len(), dev.receive_pgns().len());
    assert_eq!(data.len(), 1 + 3 * dev.receive_pgns().len());

    let (transmit, _) = &sent[1];
    assert_eq!(transmit.number("Function Code"), Some(0.0));
    assert_eq!(transmit.list.len(), dev.transmit_pgns().len());
}

#[test]
fn pgn_lists_merge_configuration() {
    let config = DeviceConfig {
        disable_default_transmit_pgns: true,
        transmit_pgns: vec![130_306, PGN_ISO_REQUEST, 130_306],
        receive_pgns: vec![127_250],
        ..DeviceConfig::new(7)
    };
    let dev = device(config);

    assert_eq!(
        dev.transmit_pgns(),
        [PGN_ISO_ADDRESS_CLAIM, PGN_ISO_REQUEST, PGN_PRODUCT_INFORMATION, PGN_PGN_LIST, 130_306]
    );
    assert_eq!(dev.receive_pgns().len(), well_known::DEVICE_PGNS.len() + well_known::DEFAULT_RECEIVE_PGNS.len() + 1);
    assert_eq!(dev.receive_pgns().last(), Some(&127_250));
}

#[test]
fn unsupported_requests_are_nakked() {
    let mut dev = claimed(DeviceConfig::new(7));

    dev.deliver(&request(33, 130_000), ms(7000));
    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.pgn, PGN_ISO_ACKNOWLEDGEMENT);
    assert_eq!(sent[0].0.destination, 33);
    assert_eq!(sent[0].1, [0x01, 0xff, 0x00, 0x00, 0x00, 0xd0, 0xfb, 0x01]);

    let mut quiet = claimed(DeviceConfig {
        disable_naks: true,
        ..DeviceConfig::new(7)
    });
    quiet.deliver(&request(33, 130_000), ms(7000));
    assert!(quiet.host().sent.is_empty());
}

#[test]
fn group_functions_are_not_supported() {
    let mut dev = claimed(DeviceConfig::new(7));

    let command = Message::new(PGN_GROUP_FUNCTION)
        .with_source(40)
        .with_destination(100)
        .with_field("Function Code", "Command")
        .with_field("PGN", 130_000)
        .with_field("Priority", 8)
        .with_field("# of Parameters", 0);
    dev.deliver(&command, ms(7000));

    let request = command.clone().with_field("Function Code", 0);
    dev.deliver(&request, ms(7000));

    let acknowledge = command.clone().with_field("Function Code", "Acknowledge");
    dev.deliver(&acknowledge, ms(7000));

    let sent = dev.host_mut().take();
    assert_eq!(sent.len(), 2);
    for (ack, data) in &sent {
        assert_eq!(ack.pgn, PGN_GROUP_FUNCTION);
        assert_eq!(ack.destination, 40);
        assert_eq!(data, &[0x02, 0xd0, 0xfb, 0x01, 0x04, 0x00]);
    }
}

#[test]
fn messages_for_other_nodes_are_ignored() {
    let mut dev = claimed(DeviceConfig::new(7));

    dev.deliver(&request(33, PGN_PRODUCT_INFORMATION).with_destination(50), ms(7000));
    assert!(dev.host().sent.is_empty());

    dev.deliver(&request(33, PGN_PRODUCT_INFORMATION).with_destination(100), ms(7000));
    assert_eq!(dev.host().sent.len(), 1);
}

#[test]
fn requests_before_claiming_are_ignored() {
    let mut dev = device(DeviceConfig::new(7));
    dev.deliver(&request(33, PGN_PRODUCT_INFORMATION), ms(0));

    assert!(dev.host().sent.is_empty());
}

#[test]
fn malformed_messages_are_dropped() {
    let mut dev = claimed(DeviceConfig::new(7));

    dev.deliver(&Message::new(PGN_ISO_REQUEST).with_source(33), ms(7000));
    dev.deliver(&ClaimRecord::new(1).to_message(), ms(7000));

    assert!(dev.host().sent.is_empty());
    assert_eq!(dev.state(), State::Claimed);
}

#[test]
fn product_information_is_recorded() {
    let mut dev = claimed(DeviceConfig::new(7));
    let info = well_known::ProductInfo::default().to_message();

    dev.deliver(&info.clone().with_source(12), ms(7000));
    dev.deliver(&info.clone().with_source(100), ms(7000));

    let entry = dev.devices().get(12).unwrap();
    assert!(entry.product_information.is_some());
    assert!(entry.address_claim.is_none());
    assert!(dev.devices().get(100).is_none());
}

#[test]
fn sending_requires_a_claimed_address() {
    let mut dev = device(DeviceConfig::new(7));
    let heartbeat = Message::new(PGN_HEARTBEAT).with_field("Sequence Counter", 1);

    assert_eq!(dev.send(heartbeat.clone()), Err(Error::NotClaimed));

    let mut dev = claimed(DeviceConfig::new(7));
    dev.send(heartbeat.with_source(3)).unwrap();
    assert_eq!(dev.host().sent[0].0.source, Some(100));

    assert_eq!(dev.send(Message::new(130_000)), Err(Error::UnknownPgn(130_000)));
}

#[test]
fn shutdown_cancels_timers() {
    let mut dev = claimed(DeviceConfig::new(7));
    assert!(dev.next_deadline().is_some());

    dev.shutdown();
    assert_eq!(dev.next_deadline(), None);

    dev.poll(ms(1_000_000)).unwrap();
    dev.deliver(&request(33, PGN_PRODUCT_INFORMATION), ms(1_000_000));
    assert!(dev.host().sent.is_empty());
}

#[test]
fn custom_timings() {
    let mut dev = device(DeviceConfig {
        address_claim_detection_time: Duration::from_millis(250),
        heartbeat_interval: Duration::from_secs(10),
        preferred_address: 20,
        ..DeviceConfig::new(7)
    });

    dev.start(ms(0)).unwrap();
    dev.poll(ms(1000)).unwrap();
    dev.poll(ms(1250)).unwrap();
    assert_eq!(dev.status(), "Claimed address 20");
    dev.host_mut().take();

    dev.poll(ms(11_250)).unwrap();
    let sent = dev.host_mut().take();
    // 10 s at 0.01 s resolution
    assert_eq!(&sent[0].1[..2], 1000u16.to_le_bytes());
}

struct Broken;

impl Host for Broken {
    type Error = &'static str;

    fn send_pgn(&mut self, _message: &Message, _data: &[u8]) -> Result<(), Self::Error> {
        Err("bus off")
    }
}

#[test]
fn send_failures_do_not_stall_claiming() {
    let mut dev = Device::new(DeviceConfig::new(7), well_known::registry(), Broken);

    assert_eq!(dev.start(ms(0)), Err(Error::Send("bus off")));
    assert_eq!(dev.poll(ms(1000)), Err(Error::Send("bus off")));
    assert_eq!(dev.state(), State::Claiming);

    assert_eq!(dev.poll(ms(6000)), Err(Error::Send("bus off")));
    assert_eq!(dev.state(), State::Claimed);
}
