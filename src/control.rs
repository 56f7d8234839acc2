//! Supervisory control surface: a persistent, bidirectional JSON-frame
//! channel a dashboard or CLI connects to, with a fixed set of inbound and
//! outbound message types, heartbeat-based session eviction, and periodic
//! state/heartbeat broadcasts (design §4.8). Gated behind the `control`
//! feature since not every deployment needs the surface.

pub mod auth;
pub mod session;
pub mod surface;
pub mod transport_channel;
pub mod types;

pub use auth::{AllowAllAuthenticator, AuthError, Authenticator, OriginAllowList, StaticTokenAuthenticator};
pub use session::{ClientSession, SessionTable};
pub use surface::ControlSurface;
pub use transport_channel::{SessionChannel, TransportError};
pub use types::{InboundMessage, OutboundMessage};
