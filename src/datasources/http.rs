use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use reqwest::header::{HeaderName, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use crate::datasources::loader::Loader;

/// Failure of an [`HttpLoader`] request.
///
/// Datasource error types opt into HTTP loading by implementing `From<HttpLoadError>`.
#[derive(Debug, Error)]
pub enum HttpLoadError {
    #[error("request could not be built for the given parameters: {0}")]
    InvalidRequest(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(StatusCode),
    #[error("header '{0}' is not present in response, but is required to correctly extract data")]
    HeaderNotFound(HeaderName),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("failed to parse response body with Content-Type: {content_type}")]
    ContentParse {
        content_type: String,
        #[source]
        source: serde_json::Error,
    },
}

type UrlBuilder<P> = dyn Fn(&Url, &P) -> Result<Url, HttpLoadError> + Send + Sync;

/// Loader that GETs JSON from a URL derived from the load parameters.
pub struct HttpLoader<V, P, E> {
    client: reqwest::Client,
    base_url: Url,
    url_for: Arc<UrlBuilder<P>>,
    _marker: PhantomData<fn() -> (V, E)>,
}

impl <V, P, E> HttpLoader<V, P, E> {
    /// Loader that requests `url_for(base_url, parameters)`.
    pub fn new<F>(client: reqwest::Client, base_url: Url, url_for: F) -> Self
    where
        F: Fn(&Url, &P) -> Result<Url, HttpLoadError> + Send + Sync + 'static,
    {
        HttpLoader {
            client,
            base_url,
            url_for: Arc::new(url_for),
            _marker: PhantomData,
        }
    }

    /// Loader that always requests `url`.
    pub fn fixed(client: reqwest::Client, url: Url) -> Self {
        Self::new(client, url, |base, _| Ok(base.clone()))
    }
}

impl <V, P, E> Loader<V, P, E> for HttpLoader<V, P, E>
where
    V: DeserializeOwned + Send + 'static,
    P: Send + 'static,
    E: From<HttpLoadError> + Send + 'static,
{
    fn load(&self, parameters: P) -> impl Future<Output = Result<V, E>> + Send {
        let client = self.client.clone();
        let url = (self.url_for)(&self.base_url, &parameters);
        async move {
            let response = client.get(url?).send().await.map_err(HttpLoadError::from)?;
            return extract_json(response).await.map_err(E::from);
        }
    }
}

/// Deserializes a JSON response body.
pub async fn extract_json<V: DeserializeOwned>(response: reqwest::Response) -> Result<V, HttpLoadError> {
    let status = response.status();
    if !status.is_success() {
        return Err(HttpLoadError::Status(status));
    }
    let content_type = response.headers()
        .get(CONTENT_TYPE)
        .ok_or(HttpLoadError::HeaderNotFound(CONTENT_TYPE))?
        .to_str()
        .map_err(|_| HttpLoadError::UnsupportedContentType("<NON_ASCII_DATA>".to_string()))?
        .to_owned();
    // parameters such as charset don't matter for JSON
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime != "application/json" {
        return Err(HttpLoadError::UnsupportedContentType(content_type));
    }
    let bytes = response.bytes().await?;
    return serde_json::from_slice::<V>(&bytes).map_err(|source| HttpLoadError::ContentParse { content_type, source });
}
