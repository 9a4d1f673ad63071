// ptzlink-api: wire protocol and WebSocket transport for the PTZ control channel

pub mod error;
pub mod protocol;
pub mod websocket;

pub use error::Error;
pub use protocol::{Envelope, EnvelopeKind, Message};
pub use protocol::types::{
    AxisReading, AxisValue, ConnectAck, ConnectPayload, MovePayload, PatrolPayload,
    PresetPayload, StatusReport, StatusRequest, StopPayload, ZoomPayload,
};
pub use websocket::{ReconnectConfig, Transport};
