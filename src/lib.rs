//! Hearth: in-process request routing and shared single-writer storage
//!
//! Network-style requests are answered by local handlers through a facade
//! that keeps the request API's observable contract. Application state lives
//! in an embedded store that several execution contexts share one owner at a
//! time, handed over through a named lease on activation and deactivation.

pub mod app;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod facade;
pub mod lease;
pub mod logging;
pub mod router;
pub mod session;
pub mod store;

pub use app::{App, StorageRuntime};
pub use error::{ApiError, StorageError};
pub use facade::{LocalRequest, ResponseEnvelope};
pub use router::{Handler, Reply, RequestContext, RouteTable};
pub use session::{MigrationFlag, Session, StorageSessions};
