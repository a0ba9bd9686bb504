use std::{convert::Infallible, fmt::Debug};

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    pubsub::{PubSubChannel, Publisher, Subscriber},
    signal::Signal,
};
use nmea2000_node::{client::MessageSource, Event, Host, Message, NmeaFrame};

/// A message on the fake bus with the frames it went out as, tagged with the
/// node that sent it.
#[derive(Debug, Clone)]
pub struct Packet {
    pub from: usize,
    pub message: Message,
    pub frames: Vec<NmeaFrame>,
}

pub type Bus<const CAP: usize, const SUBS: usize, const PUBS: usize> =
    PubSubChannel<CriticalSectionRawMutex, Packet, CAP, SUBS, PUBS>;

pub struct FakeHost<'a, const CAP: usize, const SUBS: usize, const PUBS: usize> {
    node: usize,
    sequence_no: u8,
    tx: Publisher<'a, CriticalSectionRawMutex, Packet, CAP, SUBS, PUBS>,
    available: &'a Signal<CriticalSectionRawMutex, u8>,
}

pub struct FakeSource<'a, const CAP: usize, const SUBS: usize, const PUBS: usize> {
    node: usize,
    rx: Subscriber<'a, CriticalSectionRawMutex, Packet, CAP, SUBS, PUBS>,
}

impl<const CAP: usize, const SUBS: usize, const PUBS: usize> Debug
    for FakeHost<'_, CAP, SUBS, PUBS>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeHost").field("node", &self.node).finish()
    }
}

/// Attach node `node` to the bus. `available` is signalled with the claimed
/// address once the node may transmit.
pub fn attach<'a, const CAP: usize, const SUBS: usize, const PUBS: usize>(
    node: usize,
    bus: &'a Bus<CAP, SUBS, PUBS>,
    available: &'a Signal<CriticalSectionRawMutex, u8>,
) -> (FakeHost<'a, CAP, SUBS, PUBS>, FakeSource<'a, CAP, SUBS, PUBS>) {
    let host = FakeHost {
        node,
        sequence_no: 0,
        tx: bus.publisher().unwrap(),
        available,
    };
    let source = FakeSource {
        node,
        rx: bus.subscriber().unwrap(),
    };

    (host, source)
}

impl<const CAP: usize, const SUBS: usize, const PUBS: usize> Host for FakeHost<'_, CAP, SUBS, PUBS> {
    type Error = Infallible;

    fn send_pgn(&mut self, message: &Message, data: &[u8]) -> Result<(), Self::Error> {
        let frames = message.frames(data, self.sequence_no).into_iter().flatten().collect();
        self.sequence_no = (self.sequence_no + 1) & 0x07;

        self.tx.publish_immediate(Packet {
            from: self.node,
            message: message.clone(),
            frames,
        });
        Ok(())
    }

    fn notify(&mut self, event: Event) {
        if let Event::TransmitAvailable { address } = event {
            self.available.signal(address);
        }
    }
}

impl<const CAP: usize, const SUBS: usize, const PUBS: usize> MessageSource
    for FakeSource<'_, CAP, SUBS, PUBS>
{
    type Error = Infallible;

    async fn receive(&mut self) -> Result<Message, Self::Error> {
        // CAN controllers do not see their own frames
        loop {
            let packet = self.rx.next_message_pure().await;
            if packet.from != self.node {
                return Ok(packet.message);
            }
        }
    }
}
