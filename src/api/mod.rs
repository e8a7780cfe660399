pub mod middleware;
pub mod routes;

// Re-export public types and functions
pub use middleware::log_request_errors;
pub use routes::{
    gate, health, license, log, login, logout, serve_manifest, serve_segment, session_info,
};
