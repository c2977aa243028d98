//! API helpers shared by coach services and their clients

pub mod auth;
pub mod types;
