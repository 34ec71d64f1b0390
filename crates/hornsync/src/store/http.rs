use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;

use super::StoreError;
use super::TwinDocument;
use super::TwinStore;
use crate::horn::HornState;
use crate::horn::HornStatus;

/// Error body returned by the hornsync API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Twin store living behind another hornsync instance's `/v1/things` API.
///
/// Atomicity of each operation is provided by the remote store.
#[derive(Debug, Clone)]
pub struct HttpTwinStore {
    client: Client,
    base: Url,
}

impl HttpTwinStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid store url '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Unavailable(format!(
                "invalid store url '{}'",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// Builds `<base>/v1/things[/<id>[/<suffix>]]`, percent-encoding the id.
    fn url(&self, thing_id: Option<&str>, suffix: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "things"]);
            segments.extend(thing_id);
            segments.extend(suffix);
        }
        url
    }

    /// Maps non-success responses onto store errors.
    async fn check(response: Response, thing_id: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };

        Err(match status {
            StatusCode::NOT_FOUND => StoreError::NotFound(thing_id.to_string()),
            StatusCode::CONFLICT => StoreError::AlreadyExists(thing_id.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                StoreError::InvalidDocument(message)
            }
            _ => StoreError::Unavailable(format!("{}: {}", status, message)),
        })
    }
}

#[async_trait]
impl TwinStore for HttpTwinStore {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn list(&self) -> Result<Vec<TwinDocument>, StoreError> {
        let response = self.client.get(self.url(None, None)).send().await?;
        let response = Self::check(response, "").await?;
        Ok(response.json().await?)
    }

    async fn get(&self, thing_id: &str) -> Result<Option<TwinDocument>, StoreError> {
        let url = self.url(Some(thing_id), None);
        let response = self.client.get(url.clone()).send().await?;

        // Only a 404 carrying the API's error body means the thing is
        // absent. A bare 404 means nothing serves the things route there.
        if response.status() == StatusCode::NOT_FOUND {
            return match response.json::<ErrorBody>().await {
                Ok(_) => Ok(None),
                Err(_) => Err(StoreError::Unavailable(format!(
                    "{} is not a twin store endpoint (404)",
                    url
                ))),
            };
        }
        let response = Self::check(response, thing_id).await?;
        Ok(Some(response.json().await?))
    }

    async fn insert(&self, doc: TwinDocument) -> Result<TwinDocument, StoreError> {
        let thing_id = doc.thing_id().to_string();
        let response = self
            .client
            .post(self.url(None, None))
            .json(&doc)
            .send()
            .await?;
        let response = Self::check(response, &thing_id).await?;
        Ok(response.json().await?)
    }

    async fn replace(&self, thing_id: &str, doc: TwinDocument) -> Result<TwinDocument, StoreError> {
        let response = self
            .client
            .put(self.url(Some(thing_id), None))
            .json(&doc)
            .send()
            .await?;
        let response = Self::check(response, thing_id).await?;
        Ok(response.json().await?)
    }

    async fn merge(&self, thing_id: &str, patch: Value) -> Result<TwinDocument, StoreError> {
        let response = self
            .client
            .patch(self.url(Some(thing_id), None))
            .json(&patch)
            .send()
            .await?;
        let response = Self::check(response, thing_id).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, thing_id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(Some(thing_id), None))
            .send()
            .await?;
        Self::check(response, thing_id).await?;
        Ok(())
    }

    async fn set_horn_state(
        &self,
        thing_id: &str,
        state: HornState,
    ) -> Result<HornStatus, StoreError> {
        let response = self
            .client
            .put(self.url(Some(thing_id), Some("horn")))
            .json(&json!({ "state": state }))
            .send()
            .await?;
        let response = Self::check(response, thing_id).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let store = HttpTwinStore::new("http://twins.local:8565", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.url(None, None).as_str(),
            "http://twins.local:8565/v1/things"
        );
        assert_eq!(
            store.url(Some("car:horn-car-001"), Some("horn")).as_str(),
            "http://twins.local:8565/v1/things/car:horn-car-001/horn"
        );
        assert_eq!(
            store.url(Some("car:a/b"), None).as_str(),
            "http://twins.local:8565/v1/things/car:a%2Fb"
        );

        let prefixed = HttpTwinStore::new("http://gateway/twins/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            prefixed.url(Some("car:x"), None).as_str(),
            "http://gateway/twins/v1/things/car:x"
        );
    }

    #[test]
    fn test_rejects_bad_base() {
        assert!(HttpTwinStore::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpTwinStore::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_wrong_base_path_is_not_a_missing_thing() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().route("/health", axum::routing::get(|| async { "ok" }));
            axum::serve(listener, app).await.unwrap();
        });

        let store =
            HttpTwinStore::new(&format!("http://{}/wrong", addr), Duration::from_secs(2)).unwrap();
        match store.get("car:horn-car-001").await {
            Err(StoreError::Unavailable(message)) => assert!(message.contains("404"), "{message}"),
            other => panic!("expected an unavailable store, got {other:?}"),
        }
        assert_eq!(store.get_state("car:horn-car-001").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_store_reads_as_unknown() {
        // Bind and drop to find a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store =
            HttpTwinStore::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap();
        assert!(matches!(store.get("car:x").await, Err(StoreError::Http(_))));
        assert_eq!(store.get_state("car:x").await, None);
    }
}
