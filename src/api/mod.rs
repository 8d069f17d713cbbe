//! HTTP surface — split into a client-facing API (port 8080) and an
//! admin-facing API (port 8081), plus the middleware shared between them.

pub mod admin;
pub mod admin_auth;
pub mod chats;
pub mod client;
pub mod client_auth;
pub mod health;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod request_id;
pub mod status;
