//! Nearby-place queries.
//!
//! [`PlaceSearch`] is the seam to the external search service;
//! [`GooglePlaces`] talks to a nearby-search JSON endpoint over HTTP.
//! [`QueryResolver`] turns a stored location plus a WHATSAT request into
//! the reply text.

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use locus_protocols::{Coordinates, LocationRecord};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

/// External nearby-places lookup.
pub trait PlaceSearch: Send + Sync + 'static {
    /// Places within `radius` of `location`.
    ///
    /// The returned document must be a JSON object with a `results` array.
    fn nearby(
        &self,
        location: &Coordinates,
        radius: u32,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// Nearby search over HTTP.
#[derive(Debug, Clone)]
pub struct GooglePlaces {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GooglePlaces {
    /// Create a client for `endpoint`.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from node configuration.
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.places_timeout)
            .build()?;
        Ok(Self::new(client, &config.places_url, &config.places_api_key))
    }
}

impl PlaceSearch for GooglePlaces {
    async fn nearby(&self, location: &Coordinates, radius: u32) -> Result<Value> {
        let location = location.query_param();
        debug!("Searching at {}, radius {}", location, radius);

        let radius = radius.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("location", location.as_str()),
                ("radius", radius.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let document: Value = response.json().await?;
        match document.get("results") {
            Some(Value::Array(results)) => {
                debug!("Places service returned {} result(s)", results.len());
                Ok(document)
            }
            _ => Err(Error::Places("response has no results array".into())),
        }
    }
}

/// Answers WHATSAT queries from stored locations.
#[derive(Debug, Clone)]
pub struct QueryResolver<S> {
    search: S,
}

impl<S: PlaceSearch> QueryResolver<S> {
    pub fn new(search: S) -> Self {
        Self { search }
    }

    /// Build the reply for a query about `record`.
    ///
    /// `<stored AT line>\n<json>\n\n`. When the search fails the JSON part is
    /// an object carrying the error and an empty result list.
    pub async fn resolve(&self, record: &LocationRecord, radius: u32, bound: u32) -> String {
        let body = match self.places(record, radius, bound).await {
            Ok(json) => json,
            Err(e) => {
                warn!("Places query for {} failed: {}", record.client_id, e);
                failure_body(&e)
            }
        };
        format!("{}\n{}\n\n", record.raw_message, body.trim_end_matches('\n'))
    }

    async fn places(&self, record: &LocationRecord, radius: u32, bound: u32) -> Result<String> {
        let mut document = self.search.nearby(&record.coordinates, radius).await?;
        let results = document
            .get_mut("results")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| Error::Places("response has no results array".into()))?;
        // Bound is at most 20, so the cast cannot truncate.
        results.truncate(bound as usize);
        to_pretty_json(&document)
    }
}

fn failure_body(error: &Error) -> String {
    let document = serde_json::json!({
        "error": error.to_string(),
        "results": [],
    });
    to_pretty_json(&document).unwrap_or_else(|_| document.to_string())
}

/// Sorted keys, four-space indent.
fn to_pretty_json(document: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    document.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| Error::Places(e.to_string()))
}
