//! tRPC service, method and setback-state enumerations.
//!
//! Each table is one enum. Wire codes are the discriminants and convert
//! through `num_enum`; names are plain `match` expressions.

use std::fmt;
use std::str::FromStr;

use num_enum::{TryFromPrimitive, TryFromPrimitiveError};

use crate::error::{DecodeError, PacketError};

/// "Not available" placeholder for a 2-byte field.
pub const NA_16: u16 = 0xFFFF;

/// tRPC service code, carried in `data[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Service {
    Update = 0x00,
    Request = 0x01,
    Report = 0x02,
    ResponseUpdate = 0x03,
    ResponseRequest = 0x04,
}

impl Service {
    /// Every service, in code order.
    pub const ALL: [Service; 5] = [
        Self::Update,
        Self::Request,
        Self::Report,
        Self::ResponseUpdate,
        Self::ResponseRequest,
    ];

    /// Wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Display name used in the text protocol.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Update => "Update",
            Self::Request => "Request",
            Self::Report => "Report",
            Self::ResponseUpdate => "Response:Update",
            Self::ResponseRequest => "Response:Request",
        }
    }

    /// Look a service up by display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Update" => Some(Self::Update),
            "Request" => Some(Self::Request),
            "Report" => Some(Self::Report),
            "Response:Update" => Some(Self::ResponseUpdate),
            "Response:Request" => Some(Self::ResponseRequest),
            _ => None,
        }
    }
}

impl From<TryFromPrimitiveError<Service>> for PacketError {
    fn from(e: TryFromPrimitiveError<Service>) -> Self {
        PacketError::UnknownService(e.number)
    }
}

impl FromStr for Service {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| DecodeError::UnknownService(s.to_string()))
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Which method-specific fields follow the 5-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// No modeled fields; payload carried verbatim.
    Opaque,
    /// `reporting_state` (u8) at offset 5.
    ReportingState,
    /// `address` (u16 LE) at offsets 5..7.
    Addressed,
    /// `address` at 5..7, `setback_state` at 7, `setpoint` at 8.
    Setpoint,
}

impl Layout {
    #[must_use]
    pub fn has_address(self) -> bool {
        matches!(self, Self::Addressed | Self::Setpoint)
    }

    #[must_use]
    pub fn has_setpoint(self) -> bool {
        self == Self::Setpoint
    }

    #[must_use]
    pub fn has_reporting_state(self) -> bool {
        self == Self::ReportingState
    }
}

/// tRPC method code, carried little-endian in `data[1..5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
pub enum Method {
    NullMethod = 0x000,
    NetworkError = 0x107,
    ReportingState = 0x10F,
    OutdoorTemp = 0x117,
    DeviceAttributes = 0x11F,
    ModeSetting = 0x127,
    ActiveDemand = 0x12F,
    CurrentTemp = 0x137,
    HeatSetpoint = 0x13F,
    CoolSetpoint = 0x147,
    SlabSetpoint = 0x14F,
    FanPercent = 0x157,
    TakingAddress = 0x15F,
    DeviceInventory = 0x167,
    SetbackEnable = 0x16F,
    SetbackState = 0x177,
    SetbackEvents = 0x17F,
    FirmwareRevision = 0x187,
    ProtocolVersion = 0x18F,
    DeviceType = 0x197,
    DeviceVersion = 0x19F,
    DateTime = 0x1A7,
}

impl Method {
    /// Every method, in code order.
    pub const ALL: [Method; 22] = [
        Self::NullMethod,
        Self::NetworkError,
        Self::ReportingState,
        Self::OutdoorTemp,
        Self::DeviceAttributes,
        Self::ModeSetting,
        Self::ActiveDemand,
        Self::CurrentTemp,
        Self::HeatSetpoint,
        Self::CoolSetpoint,
        Self::SlabSetpoint,
        Self::FanPercent,
        Self::TakingAddress,
        Self::DeviceInventory,
        Self::SetbackEnable,
        Self::SetbackState,
        Self::SetbackEvents,
        Self::FirmwareRevision,
        Self::ProtocolVersion,
        Self::DeviceType,
        Self::DeviceVersion,
        Self::DateTime,
    ];

    /// Wire code.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Field layout carried by this method.
    #[must_use]
    pub fn layout(self) -> Layout {
        match self {
            Self::ReportingState => Layout::ReportingState,
            Self::HeatSetpoint | Self::CoolSetpoint | Self::SlabSetpoint | Self::FanPercent => {
                Layout::Setpoint
            }
            Self::DeviceAttributes
            | Self::ModeSetting
            | Self::ActiveDemand
            | Self::CurrentTemp
            | Self::TakingAddress
            | Self::SetbackState
            | Self::SetbackEvents
            | Self::DeviceType
            | Self::DeviceVersion => Layout::Addressed,
            Self::NullMethod
            | Self::NetworkError
            | Self::OutdoorTemp
            | Self::DeviceInventory
            | Self::SetbackEnable
            | Self::FirmwareRevision
            | Self::ProtocolVersion
            | Self::DateTime => Layout::Opaque,
        }
    }

    /// Display name used in the text protocol.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NullMethod => "NullMethod",
            Self::NetworkError => "NetworkError",
            Self::ReportingState => "ReportingState",
            Self::OutdoorTemp => "OutdoorTemp",
            Self::DeviceAttributes => "DeviceAttributes",
            Self::ModeSetting => "ModeSetting",
            Self::ActiveDemand => "ActiveDemand",
            Self::CurrentTemp => "CurrentTemp",
            Self::HeatSetpoint => "HeatSetpoint",
            Self::CoolSetpoint => "CoolSetpoint",
            Self::SlabSetpoint => "SlabSetpoint",
            Self::FanPercent => "FanPercent",
            Self::TakingAddress => "TakingAddress",
            Self::DeviceInventory => "DeviceInventory",
            Self::SetbackEnable => "SetbackEnable",
            Self::SetbackState => "SetbackState",
            Self::SetbackEvents => "SetbackEvents",
            Self::FirmwareRevision => "FirmwareRevision",
            Self::ProtocolVersion => "ProtocolVersion",
            Self::DeviceType => "DeviceType",
            Self::DeviceVersion => "DeviceVersion",
            Self::DateTime => "DateTime",
        }
    }

    /// Look a method up by display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NullMethod" => Some(Self::NullMethod),
            "NetworkError" => Some(Self::NetworkError),
            "ReportingState" => Some(Self::ReportingState),
            "OutdoorTemp" => Some(Self::OutdoorTemp),
            "DeviceAttributes" => Some(Self::DeviceAttributes),
            "ModeSetting" => Some(Self::ModeSetting),
            "ActiveDemand" => Some(Self::ActiveDemand),
            "CurrentTemp" => Some(Self::CurrentTemp),
            "HeatSetpoint" => Some(Self::HeatSetpoint),
            "CoolSetpoint" => Some(Self::CoolSetpoint),
            "SlabSetpoint" => Some(Self::SlabSetpoint),
            "FanPercent" => Some(Self::FanPercent),
            "TakingAddress" => Some(Self::TakingAddress),
            "DeviceInventory" => Some(Self::DeviceInventory),
            "SetbackEnable" => Some(Self::SetbackEnable),
            "SetbackState" => Some(Self::SetbackState),
            "SetbackEvents" => Some(Self::SetbackEvents),
            "FirmwareRevision" => Some(Self::FirmwareRevision),
            "ProtocolVersion" => Some(Self::ProtocolVersion),
            "DeviceType" => Some(Self::DeviceType),
            "DeviceVersion" => Some(Self::DeviceVersion),
            "DateTime" => Some(Self::DateTime),
            _ => None,
        }
    }
}

impl From<TryFromPrimitiveError<Method>> for PacketError {
    fn from(e: TryFromPrimitiveError<Method>) -> Self {
        PacketError::UnknownMethod(e.number)
    }
}

impl FromStr for Method {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| DecodeError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Setback state carried by the setpoint family of methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum SetbackState {
    Wake4 = 0x00,
    Unoccupied4 = 0x01,
    Occupied4 = 0x02,
    Sleep4 = 0x03,
    Occupied2 = 0x04,
    Unoccupied2 = 0x05,
    Away = 0x06,
    /// Whatever state the device is currently in.
    Current = 0x07,
}

impl SetbackState {
    /// Largest valid code.
    pub const MAX: u8 = 0x07;

    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<TryFromPrimitiveError<SetbackState>> for PacketError {
    fn from(e: TryFromPrimitiveError<SetbackState>) -> Self {
        PacketError::ValueOutOfRange {
            field: "setback_state",
            value: u64::from(e.number),
            max: u64::from(SetbackState::MAX),
        }
    }
}
