// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024 NervoSys

//! Bearer tokens for the REST providers
//!
//! Tokens printed by `az` and `gcloud` expire after about an hour, while an
//! exporter keeps its providers for days. [`TokenCache`] fetches the token
//! again once it is older than its TTL, and right away when the vendor
//! answers 401.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::run_command;
use crate::error::{Error, Result};

/// Age after which a cached token is fetched again
pub const TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

/// Where bearer tokens come from
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    async fn fetch(&self) -> Result<String>;
}

/// Token from an environment variable, or from a vendor CLI when unset
#[derive(Debug, Clone)]
pub struct CliToken {
    env_var: &'static str,
    program: &'static str,
    args: Vec<String>,
}

impl CliToken {
    pub fn new(env_var: &'static str, program: &'static str, args: &[&str]) -> Self {
        Self {
            env_var,
            program,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TokenSource for CliToken {
    async fn fetch(&self) -> Result<String> {
        if let Ok(token) = std::env::var(self.env_var) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }

        let binary = which::which(self.program).map_err(|e| {
            Error::Config(format!(
                "{} is not set and {} was not found: {}",
                self.env_var, self.program, e
            ))
        })?;
        let token = run_command(binary.as_os_str(), &self.args)
            .await
            .map_err(|e| Error::Config(format!("acquiring access token: {}", e)))?;

        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(Error::Config(format!(
                "{} returned an empty access token",
                self.program
            )));
        }
        Ok(token)
    }
}

/// Token cached up to a TTL
#[derive(Debug)]
pub struct TokenCache {
    source: Box<dyn TokenSource>,
    ttl: Duration,
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenCache {
    pub fn new(source: Box<dyn TokenSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Cached token, fetched again once older than the TTL
    pub async fn get(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, fetched)) = cached.as_ref() {
            if fetched.elapsed() < self.ttl {
                return Ok(token.clone());
            }
            log::debug!("access token older than {:?}, refreshing", self.ttl);
        }

        let token = self.source.fetch().await?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    /// Drop the cached token so the next [`get`](Self::get) fetches a new one
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Send the request built by `build` with the current token
    ///
    /// A 401 answer invalidates the token and the request is sent once more
    /// with a fresh one.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.get().await?;
        let response = build(&token).send().await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        log::info!("access token rejected, acquiring a new one");
        self.invalidate().await;
        let token = self.get().await?;
        Ok(build(&token).send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenSource for Counting {
        async fn fetch(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{}", n))
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl TokenSource for Broken {
        async fn fetch(&self) -> Result<String> {
            Err(Error::Config("az was not found".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_reused_until_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = TokenCache::new(
            Box::new(Counting {
                calls: calls.clone(),
            }),
            TOKEN_TTL,
        );

        assert_eq!(cache.get().await.unwrap(), "token-1");
        tokio::time::advance(TOKEN_TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.get().await.unwrap(), "token-1");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_fetches_again() {
        let cache = TokenCache::new(Box::new(Counting::default()), TOKEN_TTL);
        assert_eq!(cache.get().await.unwrap(), "token-1");
        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_fetch_error_is_returned() {
        let cache = TokenCache::new(Box::new(Broken), TOKEN_TTL);
        assert!(cache.get().await.unwrap_err().is_config());
    }

    #[cfg(feature = "exporter")]
    #[tokio::test]
    async fn test_send_retries_once_after_unauthorized() {
        use axum::http::{header, HeaderMap, StatusCode};
        use axum::routing::get;

        // Only the second token is accepted
        async fn handler(headers: HeaderMap) -> StatusCode {
            match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                Some("Bearer token-2") => StatusCode::OK,
                _ => StatusCode::UNAUTHORIZED,
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, axum::Router::new().route("/", get(handler)))
                .await
                .unwrap();
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let cache = TokenCache::new(
            Box::new(Counting {
                calls: calls.clone(),
            }),
            TOKEN_TTL,
        );
        let http = reqwest::Client::new();
        let url = format!("http://{}/", address);

        let response = cache
            .send(|token| http.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let response = cache
            .send(|token| http.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
