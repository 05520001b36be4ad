pub mod cert;
pub mod user;

pub use cert::{Certificate, Credentials, NewCertificate, DATE_FORMAT};
pub use user::{FindUserFilter, Invite, NewUser, TelegramData, User};
