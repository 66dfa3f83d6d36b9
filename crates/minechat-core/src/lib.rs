//! Dual-connection chat client core: line transport, authentication, the
//! reader/writer/watchdog units of a session generation and the supervisor
//! that restarts them.

pub mod audit;
pub mod auth;
pub mod error;
pub mod frame;
pub mod pulse;
pub mod reader;
pub mod scope;
pub mod status;
pub mod supervisor;
pub mod transport;
pub mod watchdog;
pub mod writer;

pub use audit::{AuditEntry, AuditKind, AuditSink};
pub use auth::{authenticate, AuthError, Credential, Identity};
pub use error::{SessionError, TransportError};
pub use status::{ConnectionRole, SessionState, StatusEvent, SupervisorState};
pub use supervisor::{BackoffPolicy, ClientHandles, Supervisor, SupervisorConfig};
pub use transport::{Connector, Endpoint, LineConnection, TcpConnector};
pub use writer::send_once;
