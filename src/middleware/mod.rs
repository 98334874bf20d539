pub mod auth;
pub mod request_logger;

pub use auth::{AdminUser, AuthKeys, AuthUser, Claims};
pub use request_logger::request_logger_middleware;
