//! `/admin/*` handlers: login, profile and password change.

pub mod change_password;
pub mod login;
pub mod profile;
pub mod types;
pub(crate) mod utils;

pub use self::change_password::change_password;
pub use self::login::login;
pub use self::profile::profile;
