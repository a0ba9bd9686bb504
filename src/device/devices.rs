use alloc::collections::BTreeMap;

use crate::message::Message;

/// Highest address a device can claim.
pub const MAX_ADDRESS: u8 = 252;

/// What we know about another node on the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceEntry {
    /// The last address claim seen from this address.
    pub address_claim: Option<Message>,
    pub product_information: Option<Message>,
}

/// Other nodes by source address. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: BTreeMap<u8, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, address: u8) -> Option<&DeviceEntry> {
        self.entries.get(&address)
    }

    #[inline]
    pub fn contains(&self, address: u8) -> bool {
        self.entries.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &DeviceEntry)> {
        self.entries.iter().map(|(a, e)| (*a, e))
    }

    /// Store the claim seen from `address`. Returns true on first sighting.
    pub fn record_claim(&mut self, address: u8, claim: &Message) -> bool {
        let first = !self.contains(address);
        self.entries.entry(address).or_default().address_claim = Some(claim.clone());
        first
    }

    pub fn record_product_information(&mut self, address: u8, info: &Message) {
        self.entries.entry(address).or_default().product_information = Some(info.clone());
    }

    /// The next address after `from` (cyclic over `0..=MAX_ADDRESS`) that no
    /// known device holds. After one full cycle without a free address,
    /// `from` is returned.
    pub fn next_free(&self, from: u8) -> u8 {
        let modulus = u16::from(MAX_ADDRESS) + 1;
        let mut address = u16::from(from);

        for _ in 0..modulus {
            address = (address + 1) % modulus;
            if !self.contains(address as u8) {
                return address as u8;
            }
        }

        from
    }
}
