pub mod extractor;
pub mod password;
pub mod service;
pub mod session;

pub use extractor::{AuthUser, TOKEN_COOKIE};
pub use service::{AuthService, Session};
pub use session::SessionKeys;
