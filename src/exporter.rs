// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024 NervoSys

//! Prometheus exporter for unused disk inventories
//!
//! Every provider is polled concurrently on a fixed interval. Once all polls
//! have finished the gauges are replaced in one step, so a scrape never sees
//! a mix of two polls.
//!
//! | Gauge | Labels | Value |
//! |-------|--------|-------|
//! | `unused_provider_info` | `provider`, `provider_id` | always 1 |
//! | `unused_provider_success` | `provider`, `provider_id` | 1 if the last poll succeeded |
//! | `unused_provider_duration_ms` | `provider`, `provider_id` | last poll duration |
//! | `unused_disks_count` | `provider`, `provider_id` | unused disks found |
//! | `unused_disks_size_gb` | `provider`, `provider_id`, `type` | total size per disk type |

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::config::ExporterConfig;
use crate::disks::Disks;
use crate::error::{Error, Result};
use crate::provider::{DiskType, ProviderHandle};

const PROVIDER_LABELS: [&str; 2] = ["provider", "provider_id"];

/// Outcome of polling one provider
#[derive(Debug)]
pub struct PollResult {
    pub provider: String,
    pub provider_id: String,
    pub duration: Duration,
    pub disks: Result<Disks>,
}

/// Gauges and the providers feeding them
pub struct Exporter {
    providers: Vec<ProviderHandle>,
    timeout: Duration,
    registry: Registry,
    info: GaugeVec,
    success: GaugeVec,
    duration_ms: GaugeVec,
    disks_count: GaugeVec,
    disks_size_gb: GaugeVec,
    // Held while gauges are replaced or encoded
    publish: Mutex<()>,
}

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels).map_err(metrics_error)?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(metrics_error)?;
    Ok(gauge)
}

fn metrics_error(err: prometheus::Error) -> Error {
    Error::Other(format!("metrics: {}", err))
}

impl Exporter {
    /// Register the gauges; each provider poll is bounded by `timeout`
    pub fn new(providers: Vec<ProviderHandle>, timeout: Duration) -> Result<Self> {
        let registry = Registry::new();
        let size_labels = [PROVIDER_LABELS[0], PROVIDER_LABELS[1], "type"];

        Ok(Self {
            info: gauge(
                &registry,
                "unused_provider_info",
                "Configured provider",
                &PROVIDER_LABELS,
            )?,
            success: gauge(
                &registry,
                "unused_provider_success",
                "Whether the last poll of the provider succeeded",
                &PROVIDER_LABELS,
            )?,
            duration_ms: gauge(
                &registry,
                "unused_provider_duration_ms",
                "Duration of the last poll of the provider in milliseconds",
                &PROVIDER_LABELS,
            )?,
            disks_count: gauge(
                &registry,
                "unused_disks_count",
                "Number of unused disks",
                &PROVIDER_LABELS,
            )?,
            disks_size_gb: gauge(
                &registry,
                "unused_disks_size_gb",
                "Total size of unused disks in GB",
                &size_labels,
            )?,
            registry,
            providers,
            timeout,
            publish: Mutex::new(()),
        })
    }

    /// Poll every provider concurrently and wait for all of them
    ///
    /// Every provider yields exactly one result, including one whose poll
    /// task panicked.
    pub async fn poll(&self) -> Vec<PollResult> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::with_capacity(self.providers.len());
        for provider in &self.providers {
            let owner = (provider.name().to_string(), provider.id().to_string());
            let provider = Arc::clone(provider);
            let timeout = self.timeout;
            let handle = tasks.spawn(async move {
                let start = Instant::now();
                let disks = match tokio::time::timeout(timeout, provider.list_unused_disks()).await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Other(format!("timed out after {:?}", timeout))),
                };
                PollResult {
                    provider: provider.name().to_string(),
                    provider_id: provider.id().to_string(),
                    duration: start.elapsed(),
                    disks,
                }
            });
            owners.insert(handle.id(), owner);
        }

        let mut results = Vec::with_capacity(self.providers.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => match owners.remove(&e.id()) {
                    Some((provider, provider_id)) => results.push(PollResult {
                        provider,
                        provider_id,
                        duration: started.elapsed(),
                        disks: Err(Error::Task(e.to_string())),
                    }),
                    None => log::error!("provider poll task failed: {}", e),
                },
            }
        }
        results
    }

    /// Replace all gauges with `results`
    pub fn publish(&self, results: &[PollResult]) {
        let _guard = self.publish.lock().unwrap_or_else(|e| e.into_inner());

        self.info.reset();
        self.success.reset();
        self.duration_ms.reset();
        self.disks_count.reset();
        self.disks_size_gb.reset();

        for result in results {
            let labels = [result.provider.as_str(), result.provider_id.as_str()];
            self.info.with_label_values(&labels).set(1.0);
            self.duration_ms
                .with_label_values(&labels)
                .set(result.duration.as_secs_f64() * 1000.0);

            match &result.disks {
                Ok(disks) => {
                    self.success.with_label_values(&labels).set(1.0);
                    self.disks_count
                        .with_label_values(&labels)
                        .set(disks.len() as f64);

                    let mut sizes: BTreeMap<DiskType, u64> = BTreeMap::new();
                    for disk in disks {
                        *sizes.entry(disk.disk_type()).or_default() += disk.size_gb();
                    }
                    for (disk_type, size) in sizes {
                        let disk_type = disk_type.to_string();
                        self.disks_size_gb
                            .with_label_values(&[labels[0], labels[1], disk_type.as_str()])
                            .set(size as f64);
                    }
                }
                Err(e) => {
                    log::error!(
                        "polling {} {}: {}",
                        result.provider,
                        result.provider_id,
                        e
                    );
                    self.success.with_label_values(&labels).set(0.0);
                }
            }
        }
    }

    /// Poll and publish once
    pub async fn collect(&self) {
        let results = self.poll().await;
        let failed = results.iter().filter(|r| r.disks.is_err()).count();
        self.publish(&results);
        log::debug!(
            "collected {} providers, {} failed",
            results.len(),
            failed
        );
    }

    /// Collect every `interval`, starting immediately
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.collect().await;
        }
    }

    /// Current gauges in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let _guard = self.publish.lock().unwrap_or_else(|e| e.into_inner());
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Other(format!("metrics: {}", e)))
    }
}

async fn metrics_handler(State(exporter): State<Arc<Exporter>>) -> Response {
    match exporter.gather() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Router serving the gauges at `metrics_path`
pub fn router(exporter: Arc<Exporter>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .with_state(exporter)
}

/// Collect in the background and serve metrics until the server stops
pub async fn serve(providers: Vec<ProviderHandle>, config: &ExporterConfig) -> Result<()> {
    config.validate()?;
    let exporter = Arc::new(Exporter::new(providers, config.timeout())?);

    let collector = Arc::clone(&exporter);
    let interval = config.interval();
    tokio::spawn(async move { collector.run(interval).await });

    let app = router(exporter, &config.metrics_path);
    let listener = tokio::net::TcpListener::bind(&config.address).await?;
    log::info!(
        "serving metrics on http://{}{}",
        config.address,
        config.metrics_path
    );
    axum::serve(listener, app).await?;

    Ok(())
}
