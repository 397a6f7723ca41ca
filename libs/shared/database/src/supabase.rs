use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::store::StoreError;

/// Thin PostgREST client. Server-side calls authenticate with the
/// service-role key unless a caller token is supplied.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.database_key().to_string(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| StoreError::Unauthorized("API key is not a valid header value".to_string()))?;
        headers.insert("apikey", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = format!("Bearer {}", auth_token.unwrap_or(&self.api_key));
        let bearer = HeaderValue::from_str(&bearer)
            .map_err(|_| StoreError::Unauthorized("token is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None)
            .await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Unauthorized(error_text),
                404 => StoreError::NotFound(error_text),
                409 => StoreError::Conflict(error_text),
                502..=504 => StoreError::Unavailable(error_text),
                code => StoreError::Http {
                    status: code,
                    message: error_text,
                },
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Request whose response rows are returned (`Prefer: return=representation`).
    pub async fn returning<T>(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(method, path, None, Some(body), Some(headers))
            .await
    }

    /// Insert-or-update keyed on the table's conflict target.
    pub async fn upsert<T>(&self, path: &str, body: Value) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        self.request_with_headers(Method::POST, path, None, Some(body), Some(headers))
            .await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
