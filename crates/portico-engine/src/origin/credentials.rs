use async_trait::async_trait;
use portico_core::models::CustomerOriginStrategy;
use portico_storage::{BucketStore, ObjectInBucket};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Username and password for a basic-auth origin.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Credentials for a strategy, `None` if they cannot be found or read.
    async fn get_basic_credentials(
        &self,
        customer_origin_strategy: &CustomerOriginStrategy,
    ) -> Option<BasicCredentials>;
}

/// Reads credentials referenced by an origin strategy.
///
/// The reference is either an `s3://` uri of a JSON document or the JSON itself,
/// in both cases `{"user": "...", "password": "..."}`.
pub struct BucketCredentialsProvider {
    store: Arc<dyn BucketStore>,
}

impl BucketCredentialsProvider {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    async fn read_object(&self, object: &ObjectInBucket) -> Option<String> {
        let mut found = match self.store.get_object(object).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::warn!(object = %object, "Credentials object not found");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, object = %object, "Unable to read credentials object");
                return None;
            }
        };

        let mut json = String::new();
        if let Err(e) = found.stream.read_to_string(&mut json).await {
            tracing::warn!(error = %e, object = %object, "Unable to read credentials object");
            return None;
        }
        Some(json)
    }
}

#[async_trait]
impl CredentialsProvider for BucketCredentialsProvider {
    async fn get_basic_credentials(
        &self,
        customer_origin_strategy: &CustomerOriginStrategy,
    ) -> Option<BasicCredentials> {
        let reference = customer_origin_strategy
            .credentials
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())?;

        let json = if reference.starts_with("s3://") {
            let object = ObjectInBucket::parse(reference)?;
            self.read_object(&object).await?
        } else {
            reference.to_string()
        };

        match serde_json::from_str::<BasicCredentials>(&json) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    strategy_id = %customer_origin_strategy.id,
                    "Unable to parse origin credentials"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_storage::LocalBucketStore;

    fn strategy_with(credentials: Option<&str>) -> CustomerOriginStrategy {
        let mut strategy = CustomerOriginStrategy::default_for(3);
        strategy.id = "basic".to_string();
        strategy.credentials = credentials.map(String::from);
        strategy
    }

    async fn provider() -> (tempfile::TempDir, BucketCredentialsProvider) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBucketStore::new(dir.path()).await.unwrap();
        std::fs::create_dir_all(dir.path().join("secrets/3")).unwrap();
        std::fs::write(
            dir.path().join("secrets/3/creds.json"),
            r#"{"user":"bucket-user","password":"pw"}"#,
        )
        .unwrap();
        (dir, BucketCredentialsProvider::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_reads_credentials_from_bucket() {
        let (_dir, provider) = provider().await;
        let credentials = provider
            .get_basic_credentials(&strategy_with(Some("s3://secrets/3/creds.json")))
            .await
            .unwrap();
        assert_eq!(credentials.user, "bucket-user");
        assert_eq!(credentials.password, "pw");
    }

    #[tokio::test]
    async fn test_reads_inline_credentials() {
        let (_dir, provider) = provider().await;
        let credentials = provider
            .get_basic_credentials(&strategy_with(Some(r#"{"user":"u","password":"p"}"#)))
            .await
            .unwrap();
        assert_eq!(credentials.user, "u");
    }

    #[tokio::test]
    async fn test_unreadable_reference_yields_none() {
        let (_dir, provider) = provider().await;
        assert!(provider.get_basic_credentials(&strategy_with(None)).await.is_none());
        assert!(provider
            .get_basic_credentials(&strategy_with(Some("s3://secrets/3/missing.json")))
            .await
            .is_none());
        assert!(provider
            .get_basic_credentials(&strategy_with(Some("not json")))
            .await
            .is_none());
    }

    #[test]
    fn test_debug_hides_password() {
        let credentials = BasicCredentials {
            user: "u".to_string(),
            password: "secret".to_string(),
        };
        assert!(!format!("{:?}", credentials).contains("secret"));
    }
}
