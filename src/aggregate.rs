//! Concurrent fan-out of disk listings across providers
//!
//! [`list_all`] spawns one task per provider and merges their disks. The
//! result is all-or-nothing: the first failure aborts the remaining tasks and
//! the caller gets that error with no partial inventory, since an incomplete
//! "unused disk" list could lead to an unsafe deletion decision.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::disks::Disks;
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderHandle};

/// Attribute an error to `provider`
pub fn provider_error(provider: &dyn Provider, err: Error) -> Error {
    Error::Provider {
        provider: provider.name().to_string(),
        meta: provider.meta().clone(),
        source: Box::new(err),
    }
}

/// List unused disks of every provider concurrently
///
/// Merge order across providers is unspecified; each provider's own order is
/// kept. No timeout is applied here, wrap the call in
/// `tokio::time::timeout` for a deadline.
pub async fn list_all(providers: &[ProviderHandle]) -> Result<Disks> {
    let collected = Arc::new(Mutex::new(Disks::new()));
    let mut tasks = JoinSet::new();
    // Task ID to provider, so a panicked task is still attributed
    let mut owners = HashMap::with_capacity(providers.len());

    for provider in providers {
        let owner = Arc::clone(provider);
        let provider = Arc::clone(provider);
        let collected = Arc::clone(&collected);
        let handle = tasks.spawn(async move {
            let disks = provider
                .list_unused_disks()
                .await
                .map_err(|e| provider_error(provider.as_ref(), e))?;
            log::debug!(
                "{} {}: {} unused disks",
                provider.name(),
                provider.meta(),
                disks.len()
            );
            collected.lock().await.extend(disks);
            Ok::<(), Error>(())
        });
        owners.insert(handle.id(), owner);
    }

    let mut first_error: Option<Error> = None;
    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => match owners.get(&e.id()) {
                Some(provider) => provider_error(provider.as_ref(), Error::Task(e.to_string())),
                None => Error::Task(e.to_string()),
            },
        };

        if first_error.is_none() {
            log::warn!("aborting listing: {}", err);
            tasks.abort_all();
            first_error = Some(err);
        } else {
            log::debug!("ignoring further listing error: {}", err);
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    let mut collected = collected.lock().await;
    Ok(std::mem::take(&mut *collected))
}
