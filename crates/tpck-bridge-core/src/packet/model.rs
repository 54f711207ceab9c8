//! tRPC packet: a TPCK frame of type [`TRPC_TYPE`] read as
//! service, method and method-specific payload.

use crate::error::{PacketError, PacketResult};
use crate::tpck::Frame;

use super::codes::{Method, Service, SetbackState};
use super::payload::Payload;

/// Frame type carrying tRPC packets.
pub const TRPC_TYPE: u8 = 6;

/// Service byte plus 32-bit method code.
pub const HEADER_LEN: usize = 5;

/// Largest payload after the header that still fits a frame.
pub const MAX_PAYLOAD_LEN: usize = 250;

/// A typed tRPC packet.
///
/// Which payload fields exist depends only on the method. Every accessor for
/// a field the method does not carry fails with
/// [`PacketError::InvalidFieldForMethod`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    service: Service,
    method: Method,
    payload: Payload,
}

impl Packet {
    /// A packet with no payload.
    #[must_use]
    pub fn new(service: Service, method: Method) -> Self {
        Self {
            service,
            method,
            payload: Payload::empty(method),
        }
    }

    /// Build a packet from payload bytes following the header.
    ///
    /// Bytes that do not decode as the method's fields are kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::PayloadTooLong`] above [`MAX_PAYLOAD_LEN`].
    pub fn from_parts(service: Service, method: Method, payload: &[u8]) -> PacketResult<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }
        Ok(Self {
            service,
            method,
            payload: Payload::decode(method, payload),
        })
    }

    #[must_use]
    pub fn service(&self) -> Service {
        self.service
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Change the service, clearing the payload if it differs.
    pub fn set_service(&mut self, service: Service) {
        if service != self.service {
            self.service = service;
            self.payload = Payload::empty(self.method);
        }
    }

    /// Change the method, clearing the payload if it differs.
    pub fn set_method(&mut self, method: Method) {
        if method != self.method {
            self.method = method;
            self.payload = Payload::empty(method);
        }
    }

    /// Payload bytes after the header.
    #[must_use]
    pub fn payload_bytes(&self) -> Vec<u8> {
        self.payload.encode()
    }

    fn invalid(&self, field: &'static str) -> PacketError {
        PacketError::InvalidFieldForMethod {
            field,
            method: self.method,
        }
    }

    pub fn reporting_state(&self) -> PacketResult<Option<u8>> {
        match &self.payload {
            Payload::ReportingState(f) => Ok(f.state()),
            _ => Err(self.invalid("reporting_state")),
        }
    }

    /// # Errors
    ///
    /// `InvalidFieldForMethod` unless the method is `ReportingState`;
    /// `ValueOutOfRange` above 255.
    pub fn set_reporting_state(&mut self, state: u32) -> PacketResult<()> {
        if !self.method.layout().has_reporting_state() {
            return Err(self.invalid("reporting_state"));
        }
        let state = narrow("reporting_state", state)?;
        self.payload.set_reporting_state(state);
        Ok(())
    }

    pub fn address(&self) -> PacketResult<Option<u16>> {
        match &self.payload {
            Payload::Addressed(f) => Ok(f.address()),
            Payload::Setpoint(f) => Ok(f.address()),
            _ => Err(self.invalid("address")),
        }
    }

    /// # Errors
    ///
    /// `InvalidFieldForMethod` for methods without an address;
    /// `ValueOutOfRange` above 65535.
    pub fn set_address(&mut self, address: u32) -> PacketResult<()> {
        if !self.method.layout().has_address() {
            return Err(self.invalid("address"));
        }
        let address = narrow("address", address)?;
        self.payload.set_address(address);
        Ok(())
    }

    pub fn setback_state(&self) -> PacketResult<Option<SetbackState>> {
        match &self.payload {
            Payload::Setpoint(f) => Ok(f.setback_state()),
            _ => Err(self.invalid("setback_state")),
        }
    }

    /// # Errors
    ///
    /// `InvalidFieldForMethod` outside the setpoint family;
    /// `ValueOutOfRange` above [`SetbackState::MAX`].
    pub fn set_setback_state(&mut self, state: u32) -> PacketResult<()> {
        if !self.method.layout().has_setpoint() {
            return Err(self.invalid("setback_state"));
        }
        let state = match u8::try_from(state) {
            Ok(code) => SetbackState::try_from(code)?,
            Err(_) => {
                return Err(PacketError::ValueOutOfRange {
                    field: "setback_state",
                    value: u64::from(state),
                    max: u64::from(SetbackState::MAX),
                })
            }
        };
        self.payload.set_setback_state(state);
        Ok(())
    }

    pub fn setpoint(&self) -> PacketResult<Option<u8>> {
        match &self.payload {
            Payload::Setpoint(f) => Ok(f.setpoint()),
            _ => Err(self.invalid("setpoint")),
        }
    }

    /// # Errors
    ///
    /// `InvalidFieldForMethod` outside the setpoint family;
    /// `ValueOutOfRange` above 255.
    pub fn set_setpoint(&mut self, setpoint: u32) -> PacketResult<()> {
        if !self.method.layout().has_setpoint() {
            return Err(self.invalid("setpoint"));
        }
        let setpoint = narrow("setpoint", setpoint)?;
        self.payload.set_setpoint(setpoint);
        Ok(())
    }

    /// Wrap this packet in a TPCK frame.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::PayloadTooLong`] if the payload exceeds
    /// [`MAX_PAYLOAD_LEN`].
    pub fn to_frame(&self) -> PacketResult<Frame> {
        let payload = self.payload.encode();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }

        let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
        data.push(self.service.code());
        data.extend_from_slice(&self.method.code().to_le_bytes());
        data.extend_from_slice(&payload);

        Frame::new(TRPC_TYPE, data).map_err(|_| PacketError::PayloadTooLong(payload.len()))
    }
}

impl TryFrom<&Frame> for Packet {
    type Error = PacketError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        if frame.frame_type() != TRPC_TYPE {
            return Err(PacketError::WrongFrameType(frame.frame_type()));
        }
        let data = frame.data();
        if data.len() < HEADER_LEN {
            return Err(PacketError::HeaderTooShort(data.len()));
        }
        let (header, payload) = data.split_at(HEADER_LEN);

        let service = Service::try_from(header[0])?;
        let method = Method::try_from(u32::from_le_bytes([
            header[1], header[2], header[3], header[4],
        ]))?;
        Self::from_parts(service, method, payload)
    }
}

fn narrow<T: TryFrom<u32> + Bounded>(field: &'static str, value: u32) -> PacketResult<T> {
    T::try_from(value).map_err(|_| PacketError::ValueOutOfRange {
        field,
        value: u64::from(value),
        max: T::MAX_U64,
    })
}

trait Bounded {
    const MAX_U64: u64;
}

impl Bounded for u8 {
    const MAX_U64: u64 = u8::MAX as u64;
}

impl Bounded for u16 {
    const MAX_U64: u64 = u16::MAX as u64;
}
