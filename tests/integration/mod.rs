//! Integration test modules

mod config_loading;
mod lease_handover;
mod request_routing;
mod snapshot_transfer;
mod test_utils;
