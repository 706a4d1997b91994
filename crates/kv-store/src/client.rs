//! etcd v2 keys API client
//!
//! Implements the hierarchical store on top of `/v2/keys`: leaves are written with
//! `PUT value=...`, directories are listed with `GET`, and recursive deletes use
//! `dir=true&recursive=true`. Advisory locks are leaves created with
//! `prevExist=false` and a TTL so that a crashed holder cannot wedge the lock. The
//! leaf value is a per-acquisition token; refresh and release are conditional on it
//! (`prevValue`), so a holder whose lock lapsed cannot touch its successor's.

use crate::error::KvError;
use crate::kv_trait::KvStoreTrait;
use crate::models::*;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Delay between attempts to take a contended lock
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// etcd v2 client
pub struct EtcdClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for EtcdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl EtcdClient {
    /// Create a new etcd client
    ///
    /// # Arguments
    /// * `base_url` - etcd client URL (e.g., "http://127.0.0.1:2379")
    pub fn new(base_url: String) -> Result<Self, KvError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(KvError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the keys API URL for a key, encoding every path segment
    fn key_url(&self, key: &str) -> Result<String, KvError> {
        let trimmed = key.trim_matches('/');
        if trimmed.is_empty() {
            return Err(KvError::InvalidRequest("empty key".to_string()));
        }
        let encoded: Vec<String> = trimmed
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!("{}/v2/keys/{}", self.base_url, encoded.join("/")))
    }

    /// Turn a non-success response into a typed error
    async fn error_from_response(key: &str, response: Response) -> KvError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<EtcdErrorBody>(&body) {
            Ok(err) if err.error_code == ETCD_KEY_NOT_FOUND => KvError::NotFound(key.to_string()),
            Ok(err) if err.error_code == ETCD_TEST_FAILED => KvError::CompareFailed(key.to_string()),
            Ok(err) => KvError::Api(format!(
                "{} on {}: {} (code {})",
                status, key, err.message, err.error_code
            )),
            Err(_) if status == StatusCode::NOT_FOUND => KvError::NotFound(key.to_string()),
            Err(_) if status.is_server_error() => {
                KvError::Unavailable(format!("{} on {}: {}", status, key, body))
            }
            Err(_) => KvError::Api(format!("{} on {}: {}", status, key, body)),
        }
    }

    async fn get_node(&self, key: &str) -> Result<EtcdNode, KvError> {
        let url = self.key_url(key)?;
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(key, response).await);
        }

        let body: EtcdResponse = response.json().await?;
        body.node
            .ok_or_else(|| KvError::Api(format!("response for {} carried no node", key)))
    }

    async fn delete(&self, key: &str, query: &[(&str, &str)]) -> Result<(), KvError> {
        let url = self.key_url(key)?;
        debug!("DELETE {} {:?}", url, query);

        let response = self.client.delete(&url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(key, response).await);
        }
        Ok(())
    }

    /// Try once to create the lock leaf; `Ok(false)` when somebody else holds it
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError> {
        let url = self.key_url(key)?;
        let ttl = ttl_secs(ttl);
        let response = self
            .client
            .put(&url)
            .query(&[("prevExist", "false")])
            .form(&[("value", token), ("ttl", ttl.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(true);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<EtcdErrorBody>(&body) {
            Ok(err) if err.error_code == ETCD_NODE_EXIST => Ok(false),
            Ok(err) => Err(KvError::Api(format!(
                "lock {}: {} (code {})",
                key, err.message, err.error_code
            ))),
            Err(_) => Err(KvError::Api(format!("lock {}: {} - {}", key, status, body))),
        }
    }
}

/// etcd TTLs are whole seconds; never round a lock down to "no expiry"
fn ttl_secs(ttl: Duration) -> String {
    ttl.as_secs().max(1).to_string()
}

#[async_trait::async_trait]
impl KvStoreTrait for EtcdClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn save_leaf(&self, key: &str, value: &str) -> Result<(), KvError> {
        let url = self.key_url(key)?;
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .form(&[("value", value)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(key, response).await);
        }
        Ok(())
    }

    async fn read_leaf(&self, key: &str) -> Result<String, KvError> {
        let node = self.get_node(key).await?;
        if node.dir {
            return Err(KvError::InvalidRequest(format!("{} is a directory", key)));
        }
        Ok(node.value.unwrap_or_default())
    }

    async fn read_dir(&self, key: &str) -> Result<Vec<KvNode>, KvError> {
        let node = self.get_node(key).await?;
        if !node.dir {
            return Err(KvError::InvalidRequest(format!("{} is not a directory", key)));
        }
        Ok(node.nodes.into_iter().map(KvNode::from).collect())
    }

    async fn delete_leaf(&self, key: &str) -> Result<(), KvError> {
        self.delete(key, &[]).await
    }

    async fn delete_dir(&self, key: &str) -> Result<(), KvError> {
        self.delete(key, &[("dir", "true"), ("recursive", "true")]).await
    }

    async fn lock(&self, key: &str, ttl: Duration) -> Result<String, KvError> {
        let token = Uuid::new_v4().to_string();
        let mut waited = false;
        loop {
            if self.try_lock(key, &token, ttl).await? {
                if waited {
                    debug!("Acquired contended lock {}", key);
                }
                return Ok(token);
            }
            if !waited {
                warn!("Lock {} is held elsewhere, waiting", key);
                waited = true;
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn refresh_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<(), KvError> {
        let url = self.key_url(key)?;
        let ttl = ttl_secs(ttl);
        let response = self
            .client
            .put(&url)
            .query(&[("prevValue", token), ("prevExist", "true"), ("refresh", "true")])
            .form(&[("ttl", ttl.as_str())])
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        match Self::error_from_response(key, response).await {
            // Lapsed before the refresh arrived
            KvError::NotFound(_) => Err(KvError::CompareFailed(key.to_string())),
            e => Err(e),
        }
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<(), KvError> {
        match self.delete(key, &[("prevValue", token)]).await {
            // Already expired through its TTL
            Err(KvError::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_url_encodes_segments() {
        let client = EtcdClient::new("http://etcd:2379/".to_string()).unwrap();
        let url = client.key_url("/paasnet/tenants/a b/self").unwrap();
        assert_eq!(url, "http://etcd:2379/v2/keys/paasnet/tenants/a%20b/self");
    }

    #[test]
    fn test_lock_ttl_is_at_least_one_second() {
        assert_eq!(ttl_secs(Duration::from_millis(300)), "1");
        assert_eq!(ttl_secs(Duration::from_secs(45)), "45");
    }

    #[test]
    fn test_key_url_rejects_empty_key() {
        let client = EtcdClient::new("http://etcd:2379".to_string()).unwrap();
        assert!(matches!(client.key_url("/"), Err(KvError::InvalidRequest(_))));
    }
}
