//! Line-oriented text form of a packet, spoken to TCP clients.
//!
//! ```text
//! Update           HeatSetpoint     <0201024A>
//! ```
//!
//! Service name, method name, then the payload after the header as hex
//! inside angle brackets.

use std::fmt::Write as _;

use crate::error::DecodeError;

use super::codes::{Method, Service};
use super::model::Packet;

/// Converts packets to and from the client-facing line format.
///
/// Implementations must round-trip: `parse(&format(p)) == Ok(p)`.
pub trait PacketFormatter: Send + Sync {
    /// One line of text, without a trailing newline.
    fn format(&self, packet: &Packet) -> String;

    /// Parse one line, without its newline.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing why the line is not a packet.
    fn parse(&self, line: &str) -> Result<Packet, DecodeError>;
}

/// Default [`PacketFormatter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

const NAME_WIDTH: usize = 16;

impl PacketFormatter for TextFormatter {
    fn format(&self, packet: &Packet) -> String {
        let mut out = String::with_capacity(2 * NAME_WIDTH + 4);
        let _ = write!(
            out,
            "{:<w$} {:<w$} <{}>",
            packet.service(),
            packet.method(),
            hex::encode_upper(packet.payload_bytes()),
            w = NAME_WIDTH
        );
        out
    }

    fn parse(&self, line: &str) -> Result<Packet, DecodeError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut tokens = line.split_whitespace();

        let service: Service = tokens.next().ok_or(DecodeError::Empty)?.parse()?;
        let method: Method = tokens
            .next()
            .ok_or(DecodeError::MissingToken("method"))?
            .parse()?;
        let payload = tokens
            .next()
            .ok_or(DecodeError::MissingToken("payload"))?;
        if let Some(extra) = tokens.next() {
            return Err(DecodeError::UnexpectedToken(extra.to_string()));
        }

        let bytes = parse_hex(payload)?;
        Ok(Packet::from_parts(service, method, &bytes)?)
    }
}

fn parse_hex(token: &str) -> Result<Vec<u8>, DecodeError> {
    token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .and_then(|digits| hex::decode(digits).ok())
        .ok_or_else(|| DecodeError::InvalidHex(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PacketError;

    #[test]
    fn test_format_pads_names() {
        let mut packet = Packet::new(Service::Update, Method::HeatSetpoint);
        packet.set_address(0x0102).unwrap();
        packet.set_setback_state(2).unwrap();
        packet.set_setpoint(0x4A).unwrap();

        assert_eq!(
            TextFormatter.format(&packet),
            "Update           HeatSetpoint     <0201024A>"
        );
    }

    #[test]
    fn test_format_empty_payload() {
        let packet = Packet::new(Service::ResponseRequest, Method::NullMethod);
        assert_eq!(
            TextFormatter.format(&packet),
            "Response:Request NullMethod       <>"
        );
    }

    #[test]
    fn test_round_trip_every_method() {
        for service in Service::ALL {
            for method in Method::ALL {
                let packet = Packet::new(service, method);
                let text = TextFormatter.format(&packet);
                assert_eq!(TextFormatter.parse(&text), Ok(packet));
            }
        }

        let packet =
            Packet::from_parts(Service::Report, Method::DateTime, &[0x2F, 0xCA, 0x35]).unwrap();
        let text = TextFormatter.format(&packet);
        assert_eq!(TextFormatter.parse(&text), Ok(packet));
    }

    #[test]
    fn test_parse_lenient_input() {
        let packet = TextFormatter.parse("Request CurrentTemp <0a00>\r").unwrap();
        assert_eq!(packet.service(), Service::Request);
        assert_eq!(packet.address(), Ok(Some(10)));
    }

    #[test]
    fn test_parse_errors() {
        let f = TextFormatter;
        assert_eq!(f.parse("   "), Err(DecodeError::Empty));
        assert!(matches!(f.parse("Bogus NullMethod <>"), Err(DecodeError::UnknownService(_))));
        assert!(matches!(f.parse("Update Bogus <>"), Err(DecodeError::UnknownMethod(_))));
        assert_eq!(f.parse("Update"), Err(DecodeError::MissingToken("method")));
        assert_eq!(f.parse("Update NullMethod"), Err(DecodeError::MissingToken("payload")));
        assert!(matches!(f.parse("Update NullMethod <0>"), Err(DecodeError::InvalidHex(_))));
        assert!(matches!(f.parse("Update NullMethod 00"), Err(DecodeError::InvalidHex(_))));
        assert!(matches!(f.parse("Update NullMethod <zz>"), Err(DecodeError::InvalidHex(_))));
        assert!(matches!(
            f.parse("Update NullMethod <> extra"),
            Err(DecodeError::UnexpectedToken(_))
        ));
        let oversized = format!("Update DateTime <{}>", "00".repeat(251));
        assert_eq!(
            f.parse(&oversized),
            Err(DecodeError::Packet(PacketError::PayloadTooLong(251)))
        );
    }

    #[test]
    fn test_undecodable_fields_round_trip() {
        let packet = TextFormatter.parse("Report HeatSetpoint <1000FF46>").unwrap();
        assert_eq!(packet.setback_state(), Ok(None));
        assert_eq!(
            TextFormatter.format(&packet),
            "Report           HeatSetpoint     <1000FF46>"
        );

        let packet = TextFormatter.parse("Update ModeSetting <01>").unwrap();
        assert_eq!(packet.address(), Ok(None));
        assert_eq!(packet.payload_bytes(), vec![0x01]);
    }
}
