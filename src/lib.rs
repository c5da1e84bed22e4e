pub mod api;
pub mod config;
pub mod http;
pub mod identity;
pub mod keys;
pub mod net;
pub mod profile;
pub mod reconcile;
pub mod test_utils;
pub mod timestamp;
