//! Elasticsearch HTTP client.
//!
//! # Endpoints
//!
//! | Operation        | Method | Path           |
//! |------------------|--------|----------------|
//! | Connection check | GET    | `/`            |
//! | Node discovery   | GET    | `/_nodes/http` |
//! | Index exists     | HEAD   | `/<index>`     |
//! | Create index     | PUT    | `/<index>`     |
//! | Bulk write       | POST   | `/_bulk`       |
//!
//! Requests rotate round-robin over the live nodes found by
//! [`EsClient::connect`].

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gmi_core::config::ElasticConfig;
use gmi_core::{FlushResult, IndexOperation};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::bulk::BulkSink;
use crate::error::IndexError;
use crate::wire;

/// Connected client for one Elasticsearch cluster.
pub struct EsClient {
    /// `None` once released; requests then fail with [`IndexError::Released`].
    http: RwLock<Option<reqwest::Client>>,
    nodes: Vec<String>,
    next_node: AtomicUsize,
    credentials: Option<(String, String)>,
    mapping_types: bool,
}

impl EsClient {
    /// Build the client and check that at least one endpoint answers.
    ///
    /// With `sniff` enabled, the node list is replaced by the cluster's own
    /// HTTP publish addresses.
    pub async fn connect(cfg: &ElasticConfig) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder().timeout(cfg.request_timeout()).build()?;

        let mut client = Self {
            http: RwLock::new(Some(http)),
            nodes: Vec::new(),
            next_node: AtomicUsize::new(0),
            credentials: cfg.credentials(),
            mapping_types: cfg.mapping_types,
        };

        let mut live = Vec::new();
        for host in &cfg.hosts {
            let base = normalize_host(host)?;
            match client.get_json(&format!("{base}/")).await {
                Ok(info) => {
                    let version = info["version"]["number"].as_str().unwrap_or("unknown");
                    info!("[elastic] {base} is up (version {version})");
                    live.push(base);
                }
                Err(e) => warn!("[elastic] {base} did not answer: {e}"),
            }
        }
        if live.is_empty() {
            return Err(IndexError::NoLiveNodes(cfg.hosts.clone()));
        }
        client.nodes = live;

        if cfg.sniff {
            client.sniff().await?;
        }

        info!("[elastic] client initialized with {} node(s)", client.nodes.len());
        Ok(client)
    }

    /// Live node base URLs (e.g. `http://127.0.0.1:9200`).
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// `HEAD /<index>`: `true` on 200, `false` on 404.
    pub async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        let url = format!("{}/{index}", self.node());
        let resp = self.authorize(self.http()?.head(&url)).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(IndexError::Status { status: status.as_u16(), url, body: String::new() }),
        }
    }

    /// `PUT /<index>` with a JSON settings/mappings body.
    pub async fn create_index(&self, index: &str, body: String) -> Result<(), IndexError> {
        let url = format!("{}/{index}", self.node());
        let req = self.http()?.put(&url).header("Content-Type", "application/json").body(body);
        let resp = self.authorize(req).send().await?;
        check_status(resp, &url).await?;
        Ok(())
    }

    /// `POST /_bulk` for one batch.
    pub async fn bulk(&self, ops: &[IndexOperation]) -> Result<FlushResult, IndexError> {
        let body = wire::encode_bulk_body(ops, self.mapping_types)?;
        let url = format!("{}/_bulk", self.node());
        let req = self.http()?.post(&url).header("Content-Type", "application/x-ndjson").body(body);
        let resp = self.authorize(req).send().await?;
        let resp = check_status(resp, &url).await?;
        let json: serde_json::Value = resp.json().await?;
        Ok(wire::parse_bulk_response(&json, ops.len()))
    }

    async fn sniff(&mut self) -> Result<(), IndexError> {
        let seed = self.node().to_string();
        let scheme = if seed.starts_with("https://") { "https" } else { "http" };
        let resp = self.get_json(&format!("{seed}/_nodes/http")).await?;
        let found = parse_sniffed_nodes(&resp, scheme);
        if found.is_empty() {
            warn!("[elastic] sniffing found no HTTP nodes, keeping configured hosts");
        } else {
            info!("[elastic] sniffed {} node(s): {found:?}", found.len());
            self.nodes = found;
        }
        Ok(())
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, IndexError> {
        let resp = self.authorize(self.http()?.get(url)).send().await?;
        let resp = check_status(resp, url).await?;
        Ok(resp.json().await?)
    }

    /// Drop the connection pool. Later requests fail with [`IndexError::Released`].
    pub fn release(&self) -> bool {
        let mut http = self.http.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        http.take().is_some()
    }

    fn http(&self) -> Result<reqwest::Client, IndexError> {
        let http = self.http.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        http.clone().ok_or(IndexError::Released)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    fn node(&self) -> &str {
        let i = self.next_node.fetch_add(1, Ordering::Relaxed);
        &self.nodes[i % self.nodes.len()]
    }
}

#[async_trait]
impl BulkSink for EsClient {
    async fn send(&self, ops: &[IndexOperation]) -> anyhow::Result<FlushResult> {
        Ok(self.bulk(ops).await?)
    }

    async fn close(&self) {
        if self.release() {
            debug!("[elastic] dropped connection pool for {:?}", self.nodes);
        }
    }
}

async fn check_status(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, IndexError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(IndexError::Status { status: status.as_u16(), url: url.to_string(), body })
}

/// Validate a configured host and strip any trailing slash.
fn normalize_host(host: &str) -> Result<String, IndexError> {
    let parsed = url::Url::parse(host).map_err(|_| IndexError::InvalidEndpoint(host.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(IndexError::InvalidEndpoint(host.to_string()));
    }
    Ok(host.trim_end_matches('/').to_string())
}

/// Extract `http.publish_address` of every node in a `/_nodes/http` response.
///
/// Addresses may be `ip:port` or `hostname/ip:port`; the IP form is used.
pub fn parse_sniffed_nodes(resp: &serde_json::Value, scheme: &str) -> Vec<String> {
    let Some(nodes) = resp.get("nodes").and_then(|n| n.as_object()) else {
        return Vec::new();
    };
    let mut out: Vec<String> = nodes
        .values()
        .filter_map(|node| node.get("http")?.get("publish_address")?.as_str())
        .map(|addr| addr.rsplit('/').next().unwrap_or(addr))
        .map(|addr| format!("{scheme}://{addr}"))
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffed_addresses() {
        let resp = serde_json::json!({
            "nodes": {
                "a": {"http": {"publish_address": "10.0.0.1:9200"}},
                "b": {"http": {"publish_address": "es-2/10.0.0.2:9200"}},
                "c": {"name": "no-http"}
            }
        });
        assert_eq!(parse_sniffed_nodes(&resp, "http"), vec!["http://10.0.0.1:9200", "http://10.0.0.2:9200"]);
        assert!(parse_sniffed_nodes(&serde_json::json!({}), "http").is_empty());
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("http://127.0.0.1:9200/").unwrap(), "http://127.0.0.1:9200");
        assert!(matches!(normalize_host("127.0.0.1:9200"), Err(IndexError::InvalidEndpoint(_))));
        assert!(normalize_host("ftp://es:21").is_err());
    }

    fn offline_client() -> EsClient {
        EsClient {
            http: RwLock::new(Some(reqwest::Client::new())),
            nodes: vec!["http://127.0.0.1:1".to_string()],
            next_node: AtomicUsize::new(0),
            credentials: None,
            mapping_types: true,
        }
    }

    #[tokio::test]
    async fn close_drops_the_connection_pool() {
        let client = offline_client();
        BulkSink::close(&client).await;

        assert!(!client.release(), "pool already dropped");
        assert!(matches!(client.index_exists("gdax").await, Err(IndexError::Released)));
        assert!(matches!(client.bulk(&[]).await, Err(IndexError::Released)));
    }

    #[tokio::test]
    async fn connect_fails_without_live_nodes() {
        let cfg: ElasticConfig = serde_json::from_value(serde_json::json!({
            "hosts": ["http://127.0.0.1:1"],
            "index": "gdax",
            "request_timeout_sec": 1
        }))
        .unwrap();
        let err = EsClient::connect(&cfg).await.err().unwrap();
        assert!(matches!(err, IndexError::NoLiveNodes(_)));
    }
}
