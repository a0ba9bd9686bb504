//! Definitions for the network-management PGNs a device emits and answers,
//! and typed payloads for the ones it builds itself.

use alloc::{string::String, vec::Vec};

use crate::{
    id::DESTINATION_BROADCAST,
    message::Message,
    registry::{FieldDefinition as Field, FieldType, FormatDefinition as Format, FormatTable, VARIABLE_LENGTH},
};

pub const PGN_ISO_ACKNOWLEDGEMENT: u32 = 59_392;
pub const PGN_ISO_REQUEST: u32 = 59_904;
pub const PGN_ISO_ADDRESS_CLAIM: u32 = 60_928;
pub const PGN_GROUP_FUNCTION: u32 = 126_208;
pub const PGN_PGN_LIST: u32 = 126_464;
pub const PGN_HEARTBEAT: u32 = 126_993;
pub const PGN_PRODUCT_INFORMATION: u32 = 126_996;
pub const PGN_CONFIGURATION_INFORMATION: u32 = 126_998;

/// PGNs every device transmits and receives.
pub const DEVICE_PGNS: [u32; 4] = [
    PGN_ISO_ADDRESS_CLAIM,
    PGN_ISO_REQUEST,
    PGN_PRODUCT_INFORMATION,
    PGN_PGN_LIST,
];

pub const DEFAULT_TRANSMIT_PGNS: [u32; 18] = [
    PGN_HEARTBEAT,
    127_245,
    127_250,
    127_251,
    127_257,
    127_258,
    127_488,
    127_489,
    127_505,
    127_508,
    128_259,
    128_267,
    129_025,
    129_026,
    129_029,
    129_283,
    129_284,
    130_306,
];

pub const DEFAULT_RECEIVE_PGNS: [u32; 6] = [
    PGN_ISO_ACKNOWLEDGEMENT,
    PGN_GROUP_FUNCTION,
    PGN_HEARTBEAT,
    126_992,
    129_025,
    129_026,
];

const INDUSTRY_CODES: [(&str, u32); 6] = [
    ("Global", 0),
    ("Highway", 1),
    ("Agriculture", 2),
    ("Construction", 3),
    ("Marine", 4),
    ("Industrial", 5),
];

/// Industry group code by name.
pub fn industry_code(name: &str) -> Option<u32> {
    INDUSTRY_CODES.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
}

/// Acknowledgement codes of PGN 126208 "PGN error code".
pub const PGN_ERROR_NOT_SUPPORTED: u8 = 4;

fn iso_acknowledgement() -> Format {
    Format::new(PGN_ISO_ACKNOWLEDGEMENT, "isoAcknowledgement", 8)
        .description("ISO Acknowledgement")
        .field(Field::new("control", "Control", 8).lookup("ISO_CONTROL"))
        .field(Field::new("groupFunction", "Group Function", 8))
        .field(Field::new("reserved", "Reserved", 24))
        .field(Field::new("pgn", "PGN", 24).of_type(FieldType::Pgn))
}

fn iso_request() -> Format {
    Format::new(PGN_ISO_REQUEST, "isoRequest", 3)
        .description("ISO Request")
        .field(Field::new("pgn", "PGN", 24).of_type(FieldType::Pgn))
}

fn iso_address_claim() -> Format {
    Format::new(PGN_ISO_ADDRESS_CLAIM, "isoAddressClaim", 8)
        .description("ISO Address Claim")
        .field(Field::new("uniqueNumber", "Unique Number", 21))
        .field(Field::new("manufacturerCode", "Manufacturer Code", 11).lookup("MANUFACTURER_CODE"))
        .field(Field::new("deviceInstanceLower", "Device Instance Lower", 3))
        .field(Field::new("deviceInstanceUpper", "Device Instance Upper", 5))
        .field(Field::new("deviceFunction", "Device Function", 8))
        .field(Field::new("reserved1", "Reserved1", 1))
        .field(Field::new("deviceClass", "Device Class", 7).lookup("DEVICE_CLASS"))
        .field(Field::new("systemInstance", "System Instance", 4))
        .field(Field::new("industryGroup", "Industry Group", 3).lookup("INDUSTRY_CODE"))
        .field(Field::new("reserved2", "Reserved2", 1))
}

fn function_code(code: u32, description: &str) -> Field {
    Field::new("functionCode", "Function Code", 8)
        .lookup("GROUP_FUNCTION")
        .matching(code, description)
}

fn parameters() -> [Field; 2] {
    [
        Field::new("parameter", "Parameter", 8).of_type(FieldType::FieldIndex),
        Field::new("value", "Value", 0).of_type(FieldType::Variable),
    ]
}

fn group_function_request() -> Format {
    Format::new(PGN_GROUP_FUNCTION, "nmeaRequestGroupFunction", VARIABLE_LENGTH)
        .description("NMEA - Request group function")
        .field(function_code(0, "Request"))
        .field(Field::new("pgn", "PGN", 24).of_type(FieldType::Pgn))
        .field(
            Field::new("transmissionInterval", "Transmission interval", 32)
                .of_type(FieldType::Duration)
                .resolution(0.001)
                .unit("s"),
        )
        .field(
            Field::new("transmissionIntervalOffset", "Transmission interval offset", 16)
                .of_type(FieldType::Duration)
                .resolution(0.01)
                .unit("s"),
        )
        .field(Field::new("numberOfParameters", "# of Parameters", 8))
        .repeating(parameters())
}

fn group_function_command() -> Format {
    Format::new(PGN_GROUP_FUNCTION, "nmeaCommandGroupFunction", VARIABLE_LENGTH)
        .description("NMEA - Command group function")
        .field(function_code(1, "Command"))
        .field(Field::new("pgn", "PGN", 24).of_type(FieldType::Pgn))
        .field(Field::new("priority", "Priority", 4))
        .field(Field::new("reserved", "Reserved", 4))
        .field(Field::new("numberOfParameters", "# of Parameters", 8))
        .repeating(parameters())
}

fn group_function_acknowledge() -> Format {
    Format::new(PGN_GROUP_FUNCTION, "nmeaAcknowledgeGroupFunction", VARIABLE_LENGTH)
        .description("NMEA - Acknowledge group function")
        .field(function_code(2, "Acknowledge"))
        .field(Field::new("pgn", "PGN", 24).of_type(FieldType::Pgn))
        .field(Field::new("pgnErrorCode", "PGN error code", 4).lookup("PGN_ERROR_CODE"))
        .field(
            Field::new(
                "transmissionIntervalPriorityErrorCode",
                "Transmission interval/Priority error code",
                4,
            )
            .lookup("TRANSMISSION_INTERVAL"),
        )
        .field(Field::new("numberOfParameters", "# of Parameters", 8))
        .repeating([Field::new("parameter", "Parameter", 4).lookup("PARAMETER_FIELD")])
}

fn pgn_list() -> Format {
    Format::new(PGN_PGN_LIST, "pgnListTransmitAndReceive", VARIABLE_LENGTH)
        .description("PGN List (Transmit and Receive)")
        .field(Field::new("functionCode", "Function Code", 8).lookup("PGN_LIST_FUNCTION"))
        .repeating([Field::new("pgn", "PGN", 24).of_type(FieldType::Pgn)])
}

fn heartbeat() -> Format {
    Format::new(PGN_HEARTBEAT, "heartbeat", 8)
        .description("Heartbeat")
        .field(
            Field::new("dataTransmitOffset", "Data transmit offset", 16)
                .of_type(FieldType::Time)
                .resolution(0.01)
                .unit("s"),
        )
        .field(Field::new("sequenceCounter", "Sequence Counter", 8))
        .field(Field::new("controller1State", "Controller 1 State", 2).lookup("CONTROLLER_STATE"))
        .field(Field::new("controller2State", "Controller 2 State", 2).lookup("CONTROLLER_STATE"))
        .field(Field::new("equipmentStatus", "Equipment Status", 2).lookup("EQUIPMENT_STATUS"))
        .field(Field::new("reserved", "Reserved", 34))
}

fn product_information() -> Format {
    let string = |id, name| Field::new(id, name, 256).of_type(FieldType::StringFix);

    Format::new(PGN_PRODUCT_INFORMATION, "productInformation", 134)
        .description("Product Information")
        .field(Field::new("nmea2000Version", "NMEA 2000 Version", 16))
        .field(Field::new("productCode", "Product Code", 16))
        .field(string("modelId", "Model ID"))
        .field(string("softwareVersionCode", "Software Version Code"))
        .field(string("modelVersion", "Model Version"))
        .field(string("modelSerialCode", "Model Serial Code"))
        .field(Field::new("certificationLevel", "Certification Level", 8))
        .field(Field::new("loadEquivalency", "Load Equivalency", 8))
}

fn configuration_information() -> Format {
    let string = |id, name| Field::new(id, name, 0).of_type(FieldType::StringLau);

    Format::new(PGN_CONFIGURATION_INFORMATION, "configurationInformation", VARIABLE_LENGTH)
        .description("Configuration Information")
        .field(string("installationDescription1", "Installation Description #1"))
        .field(string("installationDescription2", "Installation Description #2"))
        .field(string("manufacturerInformation", "Manufacturer Information"))
}

/// A table holding the network-management PGNs and their enumerations.
pub fn registry() -> FormatTable {
    let mut table = FormatTable::new();

    for format in [
        iso_acknowledgement(),
        iso_request(),
        iso_address_claim(),
        group_function_request(),
        group_function_command(),
        group_function_acknowledge(),
        pgn_list(),
        heartbeat(),
        product_information(),
        configuration_information(),
    ] {
        table.insert(format);
    }

    table.add_lookup(
        "ISO_CONTROL",
        [("ACK", 0), ("NAK", 1), ("Access Denied", 2), ("Address Busy", 3)],
    );
    table.add_lookup(
        "GROUP_FUNCTION",
        [
            ("Request", 0),
            ("Command", 1),
            ("Acknowledge", 2),
            ("Read Fields", 3),
            ("Read Fields Reply", 4),
            ("Write Fields", 5),
            ("Write Fields Reply", 6),
        ],
    );
    table.add_lookup(
        "PGN_ERROR_CODE",
        [
            ("Acknowledge", 0),
            ("PGN not supported", 1),
            ("PGN not available", 2),
            ("Access denied", 3),
            ("Not supported", 4),
            ("Tag not supported", 5),
            ("Read or Write not supported", 6),
        ],
    );
    table.add_lookup(
        "TRANSMISSION_INTERVAL",
        [
            ("Acknowledge", 0),
            ("Transmit Interval/Priority not supported", 1),
            ("Transmit Interval too low", 2),
            ("Access denied", 3),
            ("Not supported", 4),
        ],
    );
    table.add_lookup(
        "PARAMETER_FIELD",
        [
            ("Acknowledge", 0),
            ("Invalid parameter field", 1),
            ("Temporary error", 2),
            ("Parameter out of range", 3),
            ("Access denied", 4),
            ("Not supported", 5),
            ("Read or Write not supported", 6),
        ],
    );
    table.add_lookup(
        "PGN_LIST_FUNCTION",
        [("Transmit PGN list", 0), ("Receive PGN list", 1)],
    );
    table.add_lookup(
        "CONTROLLER_STATE",
        [("Error Active", 0), ("Error Passive", 1), ("Bus Off", 2)],
    );
    table.add_lookup("EQUIPMENT_STATUS", [("Operational", 0), ("Fault", 1)]);
    table.add_lookup("INDUSTRY_CODE", INDUSTRY_CODES);
    table.add_lookup(
        "DEVICE_CLASS",
        [
            ("Reserved for 2000 Use", 0),
            ("System tools", 10),
            ("Safety systems", 20),
            ("Internetwork device", 25),
            ("Electrical Distribution", 30),
            ("Electrical Generation", 35),
            ("Steering and Control surfaces", 40),
            ("Propulsion", 50),
            ("Navigation", 60),
            ("Communication", 70),
            ("Sensor Communication Interface", 75),
            ("Instrumentation/general systems", 80),
            ("External Environment", 85),
            ("Internal Environment", 90),
            ("Deck + cargo + fishing equipment systems", 100),
            ("Display", 120),
            ("Entertainment", 125),
        ],
    );
    table.add_lookup(
        "MANUFACTURER_CODE",
        [
            ("Airmar", 135),
            ("Maretron", 137),
            ("Garmin", 229),
            ("Navico", 275),
            ("Victron Energy", 358),
            ("Yacht Devices", 717),
            ("Raymarine", 1851),
        ],
    );

    table
}

/// The 64-bit ISO NAME. Numerically smaller names win address conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceName(pub u64);

impl DeviceName {
    /// Read a name from the first eight bytes of an encoded address claim.
    pub fn from_le_bytes(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
        Some(Self(u64::from_le_bytes(bytes)))
    }
}

impl From<u64> for DeviceName {
    fn from(value: u64) -> Self {
        DeviceName(value)
    }
}

/// The fields of an ISO address claim (PGN 60928).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRecord {
    /// 21 bits.
    pub unique_number: u32,
    /// 11 bits.
    pub manufacturer_code: u16,
    /// 3 bits.
    pub device_instance_lower: u8,
    /// 5 bits.
    pub device_instance_upper: u8,
    pub device_function: u8,
    /// 7 bits.
    pub device_class: u8,
    /// 4 bits.
    pub system_instance: u8,
    /// 3 bits.
    pub industry_group: u8,
    pub reserved1: bool,
    pub reserved2: bool,
}

impl Default for ClaimRecord {
    fn default() -> Self {
        Self {
            unique_number: 0,
            manufacturer_code: 999,
            device_instance_lower: 0,
            device_instance_upper: 0,
            device_function: 130, // PC gateway
            device_class: 25,     // internetwork device
            system_instance: 0,
            industry_group: 4, // marine
            reserved1: true,
            reserved2: false,
        }
    }
}

impl ClaimRecord {
    pub fn new(unique_number: u32) -> Self {
        Self {
            unique_number,
            ..Self::default()
        }
    }

    /// Bit-pack the record the way it appears on the wire, read as a
    /// little-endian integer.
    pub fn name(&self) -> DeviceName {
        let mut name = u64::from(self.unique_number & 0x1f_ffff);
        name |= u64::from(self.manufacturer_code & 0x7ff) << 21;
        name |= u64::from(self.device_instance_lower & 0x07) << 32;
        name |= u64::from(self.device_instance_upper & 0x1f) << 35;
        name |= u64::from(self.device_function) << 40;
        name |= u64::from(self.reserved1) << 48;
        name |= u64::from(self.device_class & 0x7f) << 49;
        name |= u64::from(self.system_instance & 0x0f) << 56;
        name |= u64::from(self.industry_group & 0x07) << 60;
        name |= u64::from(self.reserved2) << 63;

        DeviceName(name)
    }

    pub fn to_message(&self) -> Message {
        Message::new(PGN_ISO_ADDRESS_CLAIM)
            .with_priority(6)
            .with_destination(DESTINATION_BROADCAST)
            .with_field("Unique Number", self.unique_number)
            .with_field("Manufacturer Code", self.manufacturer_code)
            .with_field("Device Instance Lower", self.device_instance_lower)
            .with_field("Device Instance Upper", self.device_instance_upper)
            .with_field("Device Function", self.device_function)
            .with_field("Reserved1", self.reserved1 as u8)
            .with_field("Device Class", self.device_class)
            .with_field("System Instance", self.system_instance)
            .with_field("Industry Group", self.industry_group)
            .with_field("Reserved2", self.reserved2 as u8)
    }
}

/// Payload of PGN 126996.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub nmea2000_version: u16,
    pub product_code: u16,
    pub model_id: String,
    pub software_version_code: String,
    pub model_version: String,
    pub model_serial_code: String,
    pub certification_level: u8,
    pub load_equivalency: u8,
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            nmea2000_version: 1300,
            product_code: 667,
            model_id: "nmea2000-node".into(),
            software_version_code: env!("CARGO_PKG_VERSION").into(),
            model_version: "nmea2000-node".into(),
            model_serial_code: "000001".into(),
            certification_level: 0,
            load_equivalency: 1,
        }
    }
}

impl ProductInfo {
    pub fn to_message(&self) -> Message {
        Message::new(PGN_PRODUCT_INFORMATION)
            .with_priority(6)
            .with_field("NMEA 2000 Version", self.nmea2000_version)
            .with_field("Product Code", self.product_code)
            .with_field("Model ID", self.model_id.as_str())
            .with_field("Software Version Code", self.software_version_code.as_str())
            .with_field("Model Version", self.model_version.as_str())
            .with_field("Model Serial Code", self.model_serial_code.as_str())
            .with_field("Certification Level", self.certification_level)
            .with_field("Load Equivalency", self.load_equivalency)
    }
}

/// Payload of PGN 126998.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigurationInfo {
    pub installation_description1: String,
    pub installation_description2: String,
    pub manufacturer_information: String,
}

impl ConfigurationInfo {
    /// Describe the server this node fronts.
    pub fn for_server(url: &str, description: &str, version: &str) -> Self {
        Self {
            installation_description1: url.into(),
            installation_description2: description.into(),
            manufacturer_information: version.into(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::new(PGN_CONFIGURATION_INFORMATION)
            .with_priority(6)
            .with_field("Installation Description #1", self.installation_description1.as_str())
            .with_field("Installation Description #2", self.installation_description2.as_str())
            .with_field("Manufacturer Information", self.manufacturer_information.as_str())
    }
}

/// Ordered union of PGN lists, first occurrence wins.
pub(crate) fn union(lists: &[&[u32]]) -> Vec<u32> {
    let mut out = Vec::new();
    for pgn in lists.iter().flat_map(|l| l.iter()) {
        if !out.contains(pgn) {
            out.push(*pgn);
        }
    }
    out
}
