pub mod chat;
pub mod health;
pub mod quota;

pub use chat::chat;
pub use health::health_check;
pub use quota::quota_status;
