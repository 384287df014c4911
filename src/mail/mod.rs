pub mod imap;
pub mod parser;
pub mod smtp;
pub mod subject;
pub mod thread;
pub mod types;

pub use imap::ImapConnector;
pub use smtp::SmtpClient;
