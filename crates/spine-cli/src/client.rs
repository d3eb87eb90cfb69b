// HTTP client wrapper for the spine-api REST facade (spec.md §6). The CLI
// never touches storage directly — every verb is a thin `reqwest` call
// against the same endpoints the REST clients use.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found")]
    NotFound,
}

impl ClientError {
    /// Maps a failed request onto the exit-code taxonomy in spec.md §6: a
    /// 4xx (bad input, unknown resource, conflict) is a user error; a 5xx
    /// or a transport failure that never reached the server is treated as
    /// infra/critical, matching the REST facade's own `ErrorCategory` split.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::NotFound => 1,
            ClientError::Api { status, .. } if *status < 500 => 1,
            ClientError::Api { .. } => 2,
            ClientError::Http(_) => 2,
        }
    }
}

pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        self.handle_response(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).send().await?;
        self.handle_response(response).await
    }

    #[allow(dead_code)]
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.put(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    pub async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.put(&url).send().await?;
        self.handle_response(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.delete(&url).send().await?;

        if response.status() == StatusCode::NO_CONTENT || response.status() == StatusCode::OK {
            return Ok(());
        }

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }

        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Api { status, message })
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json().await?;
        Ok(body)
    }
}
