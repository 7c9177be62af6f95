/// Email domain check for signup
///
/// A signup address is accepted only if its domain publishes at least one MX
/// record. "No such domain" and "no MX records" are both a plain `false`;
/// resolver failures (timeouts, unreachable nameservers) are errors.
use async_trait::async_trait;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("failed to configure DNS resolver: {0}")]
    Config(String),

    #[error("MX lookup failed: {0}")]
    Lookup(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainValidator: Send + Sync {
    async fn has_mail_exchanger(&self, domain: &str) -> Result<bool, DomainError>;
}

/// MX lookup through the system resolver configuration.
#[derive(Clone)]
pub struct MxDomainValidator {
    resolver: TokioAsyncResolver,
}

impl MxDomainValidator {
    pub fn from_system_conf() -> Result<Self, DomainError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| DomainError::Config(e.to_string()))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DomainValidator for MxDomainValidator {
    async fn has_mail_exchanger(&self, domain: &str) -> Result<bool, DomainError> {
        // Fully qualified, so the search list is never appended.
        let fqdn = format!("{}.", domain.trim_end_matches('.'));
        match self.resolver.mx_lookup(fqdn.as_str()).await {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    debug!(%domain, "No MX records");
                    Ok(false)
                }
                _ => Err(DomainError::Lookup(e.to_string())),
            },
        }
    }
}

/// Accepts every domain. Used when `EMAIL_DOMAIN_CHECK=false`.
#[derive(Debug, Clone, Default)]
pub struct AllowAllDomains;

#[async_trait]
impl DomainValidator for AllowAllDomains {
    async fn has_mail_exchanger(&self, _domain: &str) -> Result<bool, DomainError> {
        Ok(true)
    }
}

/// The part after the last `@`, if any.
pub fn email_domain(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("a@b.com"), Some("b.com"));
        assert_eq!(email_domain("odd@local@example.org"), Some("example.org"));
        assert_eq!(email_domain("no-at-sign"), None);
        assert_eq!(email_domain("trailing@"), None);
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAllDomains.has_mail_exchanger("b.com").await.unwrap());
    }
}
