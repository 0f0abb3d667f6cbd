//! Shared definitions for the Covid GATT service and its characteristics

use std::fmt;

use uuid::{Uuid, uuid};

/// GATT Service UUID advertised by key-exchanging peripherals
pub const COVID_SERVICE_UUID: Uuid = uuid!("F2110D79-699F-6A98-EA42-A7AD9EC75106");

/// Readable: index into our key list the peripheral wants next
pub const NEXT_KEY_UUID: Uuid = uuid!("F3110D79-699F-6A98-EA42-A7AD9EC75106");

/// Writable: the key at the index last read from [`NEXT_KEY_UUID`]
pub const NEW_KEY_UUID: Uuid = uuid!("F4110D79-699F-6A98-EA42-A7AD9EC75106");

/// Readable: number of period keys the peripheral flags as infected
pub const INFECTED_KEY_CNT_UUID: Uuid = uuid!("F5110D79-699F-6A98-EA42-A7AD9EC75106");

/// Number of indexed period key characteristics a peripheral exposes
pub const PERIOD_KEY_SLOT_COUNT: usize = 14;

const PERIOD_KEY_UUIDS: [Uuid; PERIOD_KEY_SLOT_COUNT] = [
    uuid!("00110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("01110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("02110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("03110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("04110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("05110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("06110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("07110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("08110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("09110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("0A110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("0B110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("0C110D79-699F-6A98-EA42-A7AD9EC75106"),
    uuid!("0D110D79-699F-6A98-EA42-A7AD9EC75106"),
];

/// Index of one of the period key characteristics, always below
/// [`PERIOD_KEY_SLOT_COUNT`]
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord)]
pub struct PeriodKeySlot(u8);

impl PeriodKeySlot {
    pub fn new(index: usize) -> Option<PeriodKeySlot> {
        (index < PERIOD_KEY_SLOT_COUNT).then(|| PeriodKeySlot(index as u8))
    }

    pub fn all() -> impl Iterator<Item = PeriodKeySlot> {
        (0..PERIOD_KEY_SLOT_COUNT as u8).map(PeriodKeySlot)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn uuid(self) -> Uuid {
        PERIOD_KEY_UUIDS[self.index()]
    }
}

/// Characteristics of the Covid service used during a key exchange
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub enum CovidCharacteristic {
    InfectedKeyCount,
    PeriodKey(PeriodKeySlot),
    NextKeyIndex,
    NewKey,
}

impl CovidCharacteristic {
    pub fn uuid(self) -> Uuid {
        use CovidCharacteristic::{InfectedKeyCount, NewKey, NextKeyIndex, PeriodKey};
        match self {
            InfectedKeyCount => INFECTED_KEY_CNT_UUID,
            PeriodKey(slot) => slot.uuid(),
            NextKeyIndex => NEXT_KEY_UUID,
            NewKey => NEW_KEY_UUID,
        }
    }

    /// Every characteristic a peripheral must expose for a full exchange
    pub fn all() -> impl Iterator<Item = CovidCharacteristic> {
        [
            CovidCharacteristic::NextKeyIndex,
            CovidCharacteristic::NewKey,
            CovidCharacteristic::InfectedKeyCount,
        ]
        .into_iter()
        .chain(PeriodKeySlot::all().map(CovidCharacteristic::PeriodKey))
    }
}

impl fmt::Display for CovidCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CovidCharacteristic::{InfectedKeyCount, NewKey, NextKeyIndex, PeriodKey};
        match self {
            InfectedKeyCount => write!(f, "infected key count"),
            PeriodKey(slot) => write!(f, "period key {}", slot.index()),
            NextKeyIndex => write!(f, "next key index"),
            NewKey => write!(f, "new key"),
        }
    }
}
