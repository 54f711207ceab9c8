//! Method-specific payload following the tRPC header.
//!
//! Fields are positional and a payload may stop at any field boundary.
//! Decoding never rejects bytes a device sent: once a field cannot be read (a
//! lone address byte, an unknown setback state) it and everything after it
//! stay as trailing bytes, so decode and encode are exact inverses. Setters
//! are strict and discard such undecoded bytes.

use super::codes::{Layout, Method, SetbackState, NA_16};

/// Payload of a `ReportingState` packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportingStateFields {
    state: Option<u8>,
    trailing: Vec<u8>,
}

impl ReportingStateFields {
    #[must_use]
    pub fn state(&self) -> Option<u8> {
        self.state
    }

    #[must_use]
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }
}

/// Payload of a method that leads with a device address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressedFields {
    address: Option<u16>,
    trailing: Vec<u8>,
}

impl AddressedFields {
    #[must_use]
    pub fn address(&self) -> Option<u16> {
        self.address
    }

    #[must_use]
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }
}

/// Payload of the setpoint family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetpointFields {
    address: Option<u16>,
    setback_state: Option<SetbackState>,
    setpoint: Option<u8>,
    trailing: Vec<u8>,
}

impl SetpointFields {
    #[must_use]
    pub fn address(&self) -> Option<u16> {
        self.address
    }

    #[must_use]
    pub fn setback_state(&self) -> Option<SetbackState> {
        self.setback_state
    }

    #[must_use]
    pub fn setpoint(&self) -> Option<u8> {
        self.setpoint
    }

    #[must_use]
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    // Trailing bytes before the last field is set were never decoded.
    fn discard_undecoded(&mut self) {
        if self.setpoint.is_none() {
            self.trailing.clear();
        }
    }
}

/// Payload bytes after the 5-byte header, one variant per field layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Opaque(Vec<u8>),
    ReportingState(ReportingStateFields),
    Addressed(AddressedFields),
    Setpoint(SetpointFields),
}

impl Payload {
    /// An empty payload of the right shape for `method`.
    #[must_use]
    pub fn empty(method: Method) -> Self {
        match method.layout() {
            Layout::Opaque => Self::Opaque(Vec::new()),
            Layout::ReportingState => Self::ReportingState(ReportingStateFields::default()),
            Layout::Addressed => Self::Addressed(AddressedFields::default()),
            Layout::Setpoint => Self::Setpoint(SetpointFields::default()),
        }
    }

    /// Decode the payload bytes of a packet carrying `method`.
    #[must_use]
    pub fn decode(method: Method, bytes: &[u8]) -> Self {
        match method.layout() {
            Layout::Opaque => Self::Opaque(bytes.to_vec()),
            Layout::ReportingState => Self::ReportingState(match bytes.split_first() {
                None => ReportingStateFields::default(),
                Some((&state, rest)) => ReportingStateFields {
                    state: Some(state),
                    trailing: rest.to_vec(),
                },
            }),
            Layout::Addressed => {
                let (address, rest) = split_address(bytes);
                Self::Addressed(AddressedFields {
                    address,
                    trailing: rest.to_vec(),
                })
            }
            Layout::Setpoint => {
                let mut fields = SetpointFields::default();
                let (address, mut rest) = split_address(bytes);
                fields.address = address;
                if address.is_some() {
                    if let Some((&code, after)) = rest.split_first() {
                        if let Ok(state) = SetbackState::try_from(code) {
                            fields.setback_state = Some(state);
                            rest = after;
                            if let Some((&setpoint, after)) = rest.split_first() {
                                fields.setpoint = Some(setpoint);
                                rest = after;
                            }
                        }
                    }
                }
                fields.trailing = rest.to_vec();
                Self::Setpoint(fields)
            }
        }
    }

    /// Encode back to payload bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Opaque(bytes) => out.extend_from_slice(bytes),
            Self::ReportingState(f) => {
                out.extend(f.state);
                out.extend_from_slice(&f.trailing);
            }
            Self::Addressed(f) => {
                if let Some(address) = f.address {
                    out.extend_from_slice(&address.to_le_bytes());
                }
                out.extend_from_slice(&f.trailing);
            }
            Self::Setpoint(f) => {
                if let Some(address) = f.address {
                    out.extend_from_slice(&address.to_le_bytes());
                }
                out.extend(f.setback_state.map(SetbackState::code));
                out.extend(f.setpoint);
                out.extend_from_slice(&f.trailing);
            }
        }
        out
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.encode().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_reporting_state(&mut self, state: u8) -> bool {
        match self {
            Self::ReportingState(f) => {
                f.state = Some(state);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_address(&mut self, address: u16) -> bool {
        match self {
            Self::Addressed(f) => {
                if f.address.is_none() {
                    f.trailing.clear();
                }
                f.address = Some(address);
            }
            Self::Setpoint(f) => {
                f.discard_undecoded();
                f.address = Some(address);
            }
            _ => return false,
        }
        true
    }

    pub(crate) fn set_setback_state(&mut self, state: SetbackState) -> bool {
        match self {
            Self::Setpoint(f) => {
                f.discard_undecoded();
                f.address.get_or_insert(NA_16);
                f.setback_state = Some(state);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_setpoint(&mut self, setpoint: u8) -> bool {
        match self {
            Self::Setpoint(f) => {
                f.discard_undecoded();
                f.address.get_or_insert(NA_16);
                f.setback_state.get_or_insert(SetbackState::Current);
                f.setpoint = Some(setpoint);
                true
            }
            _ => false,
        }
    }
}

fn split_address(bytes: &[u8]) -> (Option<u16>, &[u8]) {
    match bytes {
        [lo, hi, rest @ ..] => (Some(u16::from_le_bytes([*lo, *hi])), rest),
        _ => (None, bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_setpoint_prefixes() {
        let full = Payload::decode(Method::HeatSetpoint, &[0x34, 0x12, 0x02, 70, 0xAA]);
        let Payload::Setpoint(f) = &full else {
            panic!("expected setpoint payload");
        };
        assert_eq!(f.address(), Some(0x1234));
        assert_eq!(f.setback_state(), Some(SetbackState::Occupied4));
        assert_eq!(f.setpoint(), Some(70));
        assert_eq!(f.trailing(), &[0xAA]);
        assert_eq!(full.encode(), vec![0x34, 0x12, 0x02, 70, 0xAA]);

        let addr_only = Payload::decode(Method::CoolSetpoint, &[0x01, 0x00]);
        assert_eq!(addr_only.encode(), vec![0x01, 0x00]);
    }

    #[test]
    fn test_lone_address_byte_kept() {
        let payload = Payload::decode(Method::ModeSetting, &[0x01]);
        let Payload::Addressed(f) = &payload else {
            panic!("expected addressed payload");
        };
        assert_eq!(f.address(), None);
        assert_eq!(f.trailing(), &[0x01]);
        assert_eq!(payload.encode(), vec![0x01]);

        let payload = Payload::decode(Method::FanPercent, &[0x01]);
        assert_eq!(payload.encode(), vec![0x01]);
    }

    #[test]
    fn test_unknown_setback_state_kept() {
        let bytes = [0x10, 0x00, 0xFF, 70];
        let payload = Payload::decode(Method::HeatSetpoint, &bytes);
        let Payload::Setpoint(f) = &payload else {
            panic!("expected setpoint payload");
        };
        assert_eq!(f.address(), Some(0x0010));
        assert_eq!(f.setback_state(), None);
        assert_eq!(f.setpoint(), None);
        assert_eq!(f.trailing(), &[0xFF, 70]);
        assert_eq!(payload.encode(), bytes.to_vec());
    }

    #[test]
    fn test_setter_discards_undecoded_bytes() {
        let mut payload = Payload::decode(Method::HeatSetpoint, &[0x10, 0x00, 0xFF, 70]);
        assert!(payload.set_setpoint(68));
        assert_eq!(payload.encode(), vec![0x10, 0x00, 0x07, 68]);

        let mut payload = Payload::decode(Method::DeviceType, &[0x05]);
        assert!(payload.set_address(0x0102));
        assert_eq!(payload.encode(), vec![0x02, 0x01]);
    }

    #[test]
    fn test_opaque_kept_verbatim() {
        let bytes = [0x14, 0x0A, 0x12, 0x00, 0x1E];
        let payload = Payload::decode(Method::DateTime, &bytes);
        assert_eq!(payload, Payload::Opaque(bytes.to_vec()));
        assert_eq!(payload.encode(), bytes.to_vec());
    }

    #[test]
    fn test_setpoint_fills_placeholders() {
        let mut payload = Payload::empty(Method::SlabSetpoint);
        assert!(payload.set_setpoint(55));
        assert_eq!(payload.encode(), vec![0xFF, 0xFF, 0x07, 55]);
    }

    #[test]
    fn test_setters_respect_layout() {
        let mut payload = Payload::empty(Method::ReportingState);
        assert!(!payload.set_address(1));
        assert!(payload.set_reporting_state(1));
        assert_eq!(payload.encode(), vec![1]);
    }
}
