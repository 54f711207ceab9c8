//! tRPC application layer carried inside TPCK frames.

mod codes;
mod model;
mod payload;
mod text;

pub use codes::{Layout, Method, Service, SetbackState, NA_16};
pub use model::{Packet, HEADER_LEN, MAX_PAYLOAD_LEN, TRPC_TYPE};
pub use payload::{AddressedFields, Payload, ReportingStateFields, SetpointFields};
pub use text::{PacketFormatter, TextFormatter};
