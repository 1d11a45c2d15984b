//! External collaborators injected into the services: email delivery and
//! image storage.

pub mod images;
pub mod mailer;

pub use images::{
    CloudinarySettings, CloudinaryStorage, ImageStorage, ImageStorageError, ImageUpload,
    InMemoryImageStorage,
};
pub use mailer::{
    ConfirmationLine, Email, InMemoryMailer, LogMailer, Mailer, MailerError, SmtpMailer,
    SmtpSettings, order_confirmation_email, welcome_email,
};
