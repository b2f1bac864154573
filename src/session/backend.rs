//! Backend media client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use url::Url;

use crate::config::BackendConfig;
use crate::session::command::{CommandError, PlayRequest};
use crate::stream::ORIGINAL_TIME_HEADER;

/// Where and how media requests are sent.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    base_url: Url,
    username: String,
    password: String,
    client: Client,
}

impl BackendTarget {
    pub fn new(base_url: Url, username: String, password: String, client: Client) -> Self {
        Self {
            base_url,
            username,
            password,
            client,
        }
    }

    /// Build the target and its HTTP client from configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = Url::parse(&config.url)?;
        let mut builder = Client::builder();
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        Ok(Self::new(
            base_url,
            config.username.clone(),
            config.password.clone(),
            builder.build()?,
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Prepare the GET for a play request.
    pub fn media_request(&self, request: &PlayRequest) -> Result<RequestBuilder, CommandError> {
        let url = request.backend_url(&self.base_url)?;
        Ok(self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ORIGINAL_TIME_HEADER, request.original_time()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("building HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
