//! Identity service implementations.

pub mod account;
pub mod api_keys;
pub mod credentials;
pub mod second_factor;
pub mod sessions;
pub mod signin;
