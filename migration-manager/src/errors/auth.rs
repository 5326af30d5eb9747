use migration_manager_shared::ErrorClass;
use thiserror::Error;

/// A caller was refused access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("No client certificate presented")]
    MissingCertificate,

    #[error("Client certificate is outside its validity window")]
    CertificateExpired,

    #[error("Client certificate {0} is not trusted")]
    UntrustedCertificate(String),
}

impl AuthorizationError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::OperationNotPermitted
    }
}
