//! Authentication module for Supportly

pub mod cookie;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use cookie::{auth_cookie, clear_auth_cookie, request_token, AUTH_COOKIE};
pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{authenticate_token, require_auth, AuthState, AuthUser};
pub use password::{hash_password, validate_password_strength, verify_password};
