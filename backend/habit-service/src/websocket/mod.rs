/// Real-time delivery over WebSocket.
///
/// Architecture:
/// 1. ConnectionHub: owns the live-connection registry and the broadcast queue
/// 2. WsSession: one actor per connection, bridging frames to the hub
/// 3. Targeted sends: route a payload to whichever connection announced a
///    given user identity
pub mod hub;
pub mod messages;
pub mod session;

pub use hub::{ConnectionHub, ConnectionId};
pub use messages::{Envelope, ReminderData, ServerMessage};
pub use session::WsSession;
