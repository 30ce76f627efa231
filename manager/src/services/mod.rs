pub mod file_transport;
pub mod mailer;
pub mod notifier;

pub use file_transport::{FileTransport, LocalFileTransport};
pub use mailer::{EmailPayload, EmailSender, WebhookEmailSender};
pub use notifier::Notifier;
