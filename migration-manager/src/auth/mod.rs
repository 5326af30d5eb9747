//! Authorization of API callers.
//!
//! Callers over the local unix socket are always allowed. Callers over TLS are
//! allowed when their client certificate is inside its validity window and its
//! SHA-256 fingerprint is in the trusted set. Callers authenticated through any
//! other protocol have no authorization driver and are let through with a
//! warning.
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::AuthorizationError;

pub const PROTOCOL_UNIX: &str = "unix";
pub const PROTOCOL_TLS: &str = "tls";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    CanView,
    CanEdit,
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entitlement::CanView => f.write_str("can_view"),
            Entitlement::CanEdit => f.write_str("can_edit"),
        }
    }
}

/// A client certificate as presented during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    /// DER encoding of the certificate.
    pub der: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ClientCertificate {
    /// Lower-case hex SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }
}

/// What the transport layer knows about a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    pub protocol: String,
    pub username: String,
    pub certificate: Option<ClientCertificate>,
}

pub struct Authorizer {
    trusted: HashSet<String>,
}

impl Authorizer {
    /// Creates an authorizer trusting `fingerprints`.
    ///
    /// Fingerprints are compared in lower case with any `:` separators removed.
    pub fn new<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let trusted = fingerprints
            .into_iter()
            .map(|f| normalize(f.as_ref()))
            .filter(|f| !f.is_empty())
            .collect();
        Self { trusted }
    }

    pub fn trusted_count(&self) -> usize {
        self.trusted.len()
    }

    /// Checks whether the caller described by `details` may exercise
    /// `entitlement` on `object`.
    ///
    /// # Arguments
    ///
    /// * `details` - Protocol and credentials of the caller
    /// * `object` - The object being accessed
    /// * `entitlement` - The access requested
    /// * `now` - Wall-clock time used for the certificate validity check
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Access is granted
    /// * `Err(AuthorizationError)` - Access is refused, with the reason
    pub fn check_permission(
        &self,
        details: &RequestDetails,
        object: &str,
        entitlement: Entitlement,
        now: DateTime<Utc>,
    ) -> Result<(), AuthorizationError> {
        if details.protocol == PROTOCOL_UNIX {
            return Ok(());
        }

        if details.protocol != PROTOCOL_TLS {
            warn!(
                protocol = %details.protocol,
                object,
                %entitlement,
                "Authentication protocol is not compatible with the authorization driver"
            );
            return Ok(());
        }

        let certificate = details
            .certificate
            .as_ref()
            .ok_or(AuthorizationError::MissingCertificate)?;
        if !certificate.is_valid_at(now) {
            return Err(AuthorizationError::CertificateExpired);
        }

        let fingerprint = certificate.fingerprint();
        if self.trusted.contains(&fingerprint) {
            debug!(%fingerprint, object, %entitlement, "Matched trusted certificate");
            return Ok(());
        }
        Err(AuthorizationError::UntrustedCertificate(fingerprint))
    }
}

fn normalize(fingerprint: &str) -> String {
    fingerprint
        .trim()
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_lowercase()
}
