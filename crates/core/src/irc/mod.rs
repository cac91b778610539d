//! IRC session plumbing: wire codec, transport, the per-network handler
//! and the supervisor that reconciles handlers with configuration.

mod backoff;
mod codec;
mod handler;
mod supervisor;
mod transport;
mod wire;

pub use codec::{IrcCodec, MAX_LINE_LEN};
pub use handler::{Handler, HandlerError, SessionState};
pub use supervisor::{IrcSupervisor, SupervisorError};
pub use transport::{Connector, TcpConnector, TransportError, Wire, WireRx, WireTx};
pub use wire::{Message, MessageParseError};
