/// Business logic services
pub mod accounts;
pub mod domain;
pub mod email;
pub mod otp;

pub use accounts::{AccountService, Session, SignupInput};
pub use domain::{AllowAllDomains, DomainError, DomainValidator, MxDomainValidator};
pub use email::{EmailError, EmailSender, NoopEmailSender, SmtpEmailSender, SmtpSettings};
pub use otp::{generate_code, OtpPurpose, OtpStore};
