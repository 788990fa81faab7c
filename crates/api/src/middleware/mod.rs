// API Middleware
//
// Authentication and quota checks that run before a chat request reaches its handler.

pub mod auth;
pub mod quota;

pub use auth::{auth_middleware, AuthState, AuthenticatedUser};
pub use quota::{quota_middleware, QuotaState};
