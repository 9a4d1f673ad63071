// ptzlink-core: PTZ control sessions between ptzlink-api and consumers (CLI).

pub mod client;
pub mod config;
mod correlator;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod event;
pub mod session;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::PtzClient;
pub use config::{ClientConfig, Credential, DispatchConfig, EncoderConfig, ReconnectPolicy};
pub use dispatcher::{PatrolAction, StopScope};
pub use encoder::{CommandEncoder, GestureInput, MotionIntent};
pub use error::CoreError;
pub use event::{SessionEvent, SessionState};
pub use session::{PendingSession, Session};
pub use stream::{StatusStream, StatusWatch};

// Wire types callers see in results.
pub use ptzlink_api::{AxisReading, StatusReport};
