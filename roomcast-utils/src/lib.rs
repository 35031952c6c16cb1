//! Small host-introspection helpers shared by the configuration layer and the
//! HTTP ambient surface (e.g. guessing a base URL to advertise when none is
//! configured).

mod ip_utils;

pub use ip_utils::{guess_local_ip, list_all_ips};
