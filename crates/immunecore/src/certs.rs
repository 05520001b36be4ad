//! Certificate issuing and lookup
//!
//! Lookups read through the cache for an hour; issuing a certificate
//! invalidates the cached list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::cache::Cache;
use crate::codes::generate_code;
use crate::error::{AppError, AppResult};
use crate::models::{Certificate, NewCertificate};
use crate::storage::CertificatesStorage;

pub const CERT_CODE_LEN: usize = 12;
/// Upper bound on code collision retries
pub const CERT_CODE_ATTEMPTS: usize = 10;

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const CACHE_PREFIX: &str = "certs";
const VALIDITY_DAYS: i64 = 365;
/// Expiry is pulled back by up to this many days so certificates don't share a date
const EXPIRY_JITTER_DAYS: i64 = 30;

#[async_trait]
pub trait CertificateService: Send + Sync {
    async fn create_vax_cert(&self, data: NewCertificate) -> AppResult<Certificate>;

    /// `CertificateNotFound` when the code is unknown
    async fn get_cert_by_code(&self, code: &str) -> AppResult<Certificate>;

    async fn list_certificates(&self) -> AppResult<Vec<Certificate>>;
}

pub struct Certificates {
    storage: Arc<dyn CertificatesStorage>,
    cache: Cache,
}

impl Certificates {
    pub fn new(storage: Arc<dyn CertificatesStorage>, cache: Cache) -> Self {
        Self { storage, cache }
    }

    fn code_key(code: &str) -> String {
        format!("{CACHE_PREFIX}:{code}")
    }

    fn list_key() -> String {
        format!("{CACHE_PREFIX}:list")
    }

    async fn unused_code(&self) -> AppResult<String> {
        for attempt in 1..=CERT_CODE_ATTEMPTS {
            let code = generate_code(CERT_CODE_LEN);
            if !self.storage.exists(&code).await? {
                return Ok(code);
            }
            log::warn!("Certificate code collision on attempt {}", attempt);
        }
        Err(AppError::CodeGenerationExhausted {
            attempts: CERT_CODE_ATTEMPTS,
        })
    }
}

fn expiring_at(now: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    let jitter = rand::thread_rng().gen_range(0..EXPIRY_JITTER_DAYS);
    now + ChronoDuration::days(VALIDITY_DAYS) - ChronoDuration::days(jitter)
}

#[async_trait]
impl CertificateService for Certificates {
    async fn create_vax_cert(&self, data: NewCertificate) -> AppResult<Certificate> {
        log::debug!("Creating new certificate");

        let code = self.unused_code().await?;
        let now = Utc::now();
        let cert = Certificate {
            id: Uuid::new_v4().to_string(),
            code,
            owner_id: data.owner_id,
            credentials: data.credentials,
            expiring_at: expiring_at(now),
            created_at: now,
        };
        self.storage.create(&cert).await?;

        if let Err(e) = self.cache.delete_prefix(&Self::list_key()).await {
            log::error!("Failed to clear certificates list cache: {}", e);
        }
        log::info!("Certificate {} created", cert.code);

        Ok(cert)
    }

    async fn get_cert_by_code(&self, code: &str) -> AppResult<Certificate> {
        self.cache
            .once(&Self::code_key(code), CACHE_TTL, || async {
                self.storage
                    .get_by_code(code)
                    .await?
                    .ok_or(AppError::CertificateNotFound)
            })
            .await
    }

    async fn list_certificates(&self) -> AppResult<Vec<Certificate>> {
        self.cache
            .once(&Self::list_key(), CACHE_TTL, || async { self.storage.list().await })
            .await
    }
}
