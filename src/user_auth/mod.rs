//! User registration, login and JWT authentication

pub mod handlers;
pub mod middleware;
pub mod service;

pub use middleware::{CurrentUser, jwt_auth_middleware};
pub use service::{AuthError, AuthResponse, Claims, Credentials, UserAuthService};
