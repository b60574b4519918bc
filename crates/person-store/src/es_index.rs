//! Elasticsearch search index
//!
//! Mirrors person records into a single Elasticsearch index and answers
//! free-text queries with a `query_string` query.

use async_trait::async_trait;
use person_sync_core::prelude::*;
use person_sync_core::ElasticsearchConfig;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, trace};

/// Elasticsearch-backed search index
pub struct EsSearchIndex {
    client: Client,
    config: ElasticsearchConfig,
    host_index: AtomicUsize,
    running: AtomicBool,
}

impl EsSearchIndex {
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        if config.hosts.is_empty() {
            return Err(SyncError::config("no elasticsearch hosts configured"));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::index_query_with_source("Failed to create client", e))?;

        Ok(Self {
            client,
            config,
            host_index: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        })
    }

    /// Get the current host (round-robin for load balancing)
    fn get_host(&self) -> &str {
        let idx = self.host_index.fetch_add(1, Ordering::Relaxed) % self.config.hosts.len();
        self.config.hosts[idx].trim_end_matches('/')
    }

    /// Build request with authentication
    fn build_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.get_host(), path);
        let mut req = self.client.request(method, &url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("ApiKey {}", api_key));
        } else if let (Some(ref user), Some(ref pass)) =
            (&self.config.username, &self.config.password)
        {
            req = req.basic_auth(user, Some(pass));
        }

        req.header("Content-Type", "application/json")
    }

    fn doc_path(&self, id: &str) -> String {
        format!("/{}/_doc/{}", self.config.index, encode_path_segment(id))
    }

    /// Create the index with an explicit mapping if it does not exist
    async fn ensure_index(&self) -> Result<()> {
        let path = format!("/{}", self.config.index);
        let resp = self
            .build_request(Method::HEAD, &path)
            .send()
            .await
            .map_err(|e| SyncError::index_query_with_source("Index lookup failed", e))?;

        match resp.status() {
            StatusCode::OK => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(SyncError::index_query(format!(
                    "Index lookup returned {}",
                    status
                )))
            }
        }

        let resp = self
            .build_request(Method::PUT, &path)
            .json(&index_mapping())
            .send()
            .await
            .map_err(|e| SyncError::index_write_with_source("Index creation failed", e))?;

        let status = resp.status();
        if status.is_success() {
            info!(index = %self.config.index, "Search index created");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        // A concurrent creator winning the race is fine
        if status == StatusCode::BAD_REQUEST && is_already_exists(&body) {
            info!(index = %self.config.index, "Search index ready");
            return Ok(());
        }
        Err(SyncError::index_write(format!(
            "Index creation returned {} - {}",
            status, body
        )))
    }
}

/// Mapping for the person index
fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "first_name": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "last_name": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "telephone": { "type": "integer" }
            }
        }
    })
}

/// Sort clause for a page request; text fields sort on their keyword subfield
fn sort_clause(sort: Sort) -> Value {
    let field = match sort.field {
        SortField::Id => "_id".to_string(),
        SortField::Telephone => sort.field.document_field().to_string(),
        SortField::FirstName | SortField::LastName => {
            format!("{}.keyword", sort.field.document_field())
        }
    };
    json!([{ field: { "order": sort.direction.as_str() } }])
}

/// Build the `_search` body for a query page
pub fn search_body(text: &str, page: &PageRequest) -> Value {
    let query = if text.trim().is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "query_string": { "query": text } })
    };

    let mut body = json!({
        "query": query,
        "from": page.offset(),
        "size": page.size(),
    });
    if let Some(sort) = page.sort() {
        body["sort"] = sort_clause(sort);
    }
    body
}

/// Whether an error body reports that the index already exists
fn is_already_exists(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .map(|v| v["error"]["type"] == "resource_already_exists_exception")
        .unwrap_or(false)
}

fn encode_path_segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Person,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[async_trait]
impl Lifecycle for EsSearchIndex {
    async fn start(&self) -> Result<()> {
        self.health_check().await?;
        self.ensure_index().await?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for EsSearchIndex {
    async fn health_check(&self) -> Result<()> {
        let resp = self
            .build_request(Method::GET, "/_cluster/health")
            .send()
            .await
            .map_err(|e| SyncError::index_query_with_source("Health check failed", e))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::index_query(format!(
                "Cluster unhealthy: {}",
                resp.status()
            )))
        }
    }

    fn component_name(&self) -> &'static str {
        "elasticsearch_index"
    }
}

#[async_trait]
impl SearchIndex for EsSearchIndex {
    async fn save(&self, person: &Person) -> Result<Person> {
        let id = person.require_id()?;
        let mut req = self.build_request(Method::PUT, &self.doc_path(id)).json(person);
        if self.config.refresh_on_write {
            req = req.query(&[("refresh", "wait_for")]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SyncError::index_write_with_source("Index request failed", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::index_write(format!(
                "Index failed: {} - {}",
                status, body
            )));
        }

        trace!(id, "Mirrored record");
        Ok(person.clone())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let mut req = self.build_request(Method::DELETE, &self.doc_path(id));
        if self.config.refresh_on_write {
            req = req.query(&[("refresh", "wait_for")]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SyncError::index_write_with_source("Delete request failed", e))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(id, "No mirror to delete");
                Ok(())
            }
            status => Err(SyncError::index_write(format!("Delete failed: {}", status))),
        }
    }

    async fn query(&self, text: &str, page: &PageRequest) -> Result<Vec<Person>> {
        let path = format!("/{}/_search", self.config.index);
        let resp = self
            .build_request(Method::POST, &path)
            .json(&search_body(text, page))
            .send()
            .await
            .map_err(|e| SyncError::index_query_with_source("Search failed", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::index_query(format!(
                "Search failed: {} - {}",
                status, body
            )));
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::index_query_with_source("Failed to parse response", e))?;

        let people: Vec<Person> = body
            .hits
            .hits
            .into_iter()
            .map(|hit| Person {
                id: Some(hit.id),
                ..hit.source
            })
            .collect();

        trace!(count = people.len(), query = text, "Search completed");
        Ok(people)
    }

    async fn count(&self) -> Result<u64> {
        let path = format!("/{}/_count", self.config.index);
        let resp = self
            .build_request(Method::GET, &path)
            .send()
            .await
            .map_err(|e| SyncError::index_query_with_source("Count failed", e))?;

        // Nothing mirrored yet
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !resp.status().is_success() {
            return Err(SyncError::index_query(format!(
                "Count failed: {}",
                resp.status()
            )));
        }

        let body: CountResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::index_query_with_source("Failed to parse response", e))?;
        Ok(body.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_paging() {
        let page = PageRequest::new(2, 10).unwrap();
        let body = search_body("alice", &page);

        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["query"]["query_string"]["query"], "alice");
        assert!(body.get("sort").is_none());
    }

    #[test]
    fn test_search_body_blank_query_matches_all() {
        let body = search_body("  ", &PageRequest::first());
        assert!(body["query"]["match_all"].is_object());
    }

    #[test]
    fn test_search_body_sort_uses_keyword() {
        let page = PageRequest::first().with_sort(Sort::desc(SortField::LastName));
        let body = search_body("*", &page);
        assert_eq!(body["sort"][0]["last_name.keyword"]["order"], "desc");
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("abc-123"), "abc-123");
        assert_eq!(encode_path_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn test_only_existing_index_rejection_is_tolerated() {
        let exists = json!({
            "error": { "type": "resource_already_exists_exception", "reason": "index [person] already exists" },
            "status": 400
        });
        assert!(is_already_exists(&exists.to_string()));

        let bad_mapping = json!({
            "error": { "type": "mapper_parsing_exception", "reason": "unknown field type" },
            "status": 400
        });
        assert!(!is_already_exists(&bad_mapping.to_string()));
        assert!(!is_already_exists("not json"));
    }

    #[test]
    fn test_hit_source_parses_into_person() {
        let raw = json!({
            "hits": { "hits": [
                { "_id": "p1", "_source": { "first_name": "abcd", "last_name": "wxyz", "telephone": 5 } }
            ]}
        });
        let resp: SearchResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.hits.hits[0].id, "p1");
        assert_eq!(resp.hits.hits[0].source.telephone, 5);
    }

    #[test]
    fn test_requires_hosts() {
        let config = ElasticsearchConfig {
            hosts: Vec::new(),
            ..Default::default()
        };
        assert!(EsSearchIndex::new(config).is_err());
    }
}
