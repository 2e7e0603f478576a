//! Request facade: the network-request API, served by the local router.

pub mod request;
pub mod response;

pub use request::{LocalRequest, ReadyState};
pub use response::{ResponseEnvelope, LOCATION_HEADER, NOT_FOUND_BODY, TEMPLATE_HEADER};
