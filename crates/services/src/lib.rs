pub mod auth;
pub mod chat;
pub mod quota;
pub mod tools;

#[cfg(any(test, feature = "test-mocks"))]
pub mod test_utils;

pub use auth::{AuthService, UserId};
pub use chat::ChatServiceImpl;
pub use quota::QuotaService;
