use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::config::R2Settings;

/// Durable storage for generated artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store `data` under `name` and return a durable reference to it.
    async fn store(&self, data: &[u8], name: &str, content_type: &str)
        -> Result<String, StorageError>;

    /// Remove an artifact. A reference that no longer exists is not an error.
    async fn delete(&self, reference: &str) -> Result<(), StorageError>;

    /// Read an artifact back; `None` if it does not exist.
    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    bucket_name: String,
    prefix: String,
    public_url: Option<String>,
}

impl R2Client {
    pub fn new(
        settings: &R2Settings,
        prefix: &str,
        public_url: Option<&str>,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: settings.endpoint.clone(),
        };

        let credentials = Credentials::new(
            Some(settings.access_key.as_str()),
            Some(settings.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        tracing::info!(bucket = %settings.bucket, prefix, "Initialized R2 artifact storage");

        Ok(Self {
            bucket,
            bucket_name: settings.bucket.clone(),
            prefix: prefix.trim_matches('/').to_string(),
            public_url: public_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    fn reference_for(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("s3://{}/{}", self.bucket_name, key),
        }
    }

    /// Map a reference produced by [`reference_for`](Self::reference_for) back to its key.
    fn key_from_reference<'a>(&self, reference: &'a str) -> Result<&'a str, StorageError> {
        let s3_prefix = format!("s3://{}/", self.bucket_name);
        if let Some(key) = reference.strip_prefix(s3_prefix.as_str()) {
            return Ok(key);
        }
        if let Some(base) = &self.public_url {
            if let Some(key) = reference
                .strip_prefix(base.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return Ok(key);
            }
        }
        Err(StorageError::ForeignReference(reference.to_string()))
    }
}

#[async_trait]
impl ArtifactSink for R2Client {
    async fn store(
        &self,
        data: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = self.key_for(name);
        let response = self
            .bucket
            .put_object_with_content_type(&key, data, content_type)
            .await?;
        check_status(response.status_code(), &key)?;

        let reference = self.reference_for(&key);
        tracing::info!(reference = %reference, bytes = data.len(), "Uploaded artifact");
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let key = self.key_from_reference(reference)?;

        let (_, status) = self.bucket.head_object(key).await?;
        if status == 404 {
            tracing::warn!(reference, "Artifact not found, nothing to delete");
            return Ok(());
        }
        check_status(status, key)?;

        let response = self.bucket.delete_object(key).await?;
        check_status(response.status_code(), key)?;
        tracing::info!(reference, "Deleted artifact");
        Ok(())
    }

    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = self.key_from_reference(reference)?;

        let response = self.bucket.get_object(key).await?;
        if response.status_code() == 404 {
            tracing::warn!(reference, "Artifact not found");
            return Ok(None);
        }
        check_status(response.status_code(), key)?;

        Ok(Some(response.bytes().to_vec()))
    }
}

fn check_status(status: u16, key: &str) -> Result<(), StorageError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(StorageError::Status {
            status,
            key: key.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage returned status {status} for {key}")]
    Status { status: u16, key: String },

    #[error("Reference {0} does not belong to this bucket")]
    ForeignReference(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
