pub mod request_log;
pub mod session;
pub mod user;

pub use request_log::PgRequestLogRepository;
pub use session::PgSessionRepository;
pub use user::PgUserRepository;
