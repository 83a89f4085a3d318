use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{schema_for, Tool};
use crate::core::config::SearchSettings;
use crate::core::errors::ApiError;

pub const SEARCH_TOOL_NAME: &str = "search_tool";

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// What to search the web for.
    pub query: String,
}

/// Web search through the configured provider.
pub struct SearchTool {
    settings: SearchSettings,
    client: Client,
}

impl SearchTool {
    pub fn new(settings: SearchSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self { settings, client })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let mut results = perform_search(&self.client, &self.settings, query).await?;
        results.truncate(self.settings.max_results);
        Ok(results)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns the top results with title, URL and snippet."
    }

    fn input_schema(&self) -> Value {
        schema_for::<SearchArgs>()
    }

    async fn invoke(&self, args: &Value) -> Result<String, ApiError> {
        let args: SearchArgs =
            serde_json::from_value(args.clone()).map_err(|e| ApiError::tool(SEARCH_TOOL_NAME, e))?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ApiError::tool(SEARCH_TOOL_NAME, "search query is empty"));
        }

        let results = self
            .search(query)
            .await
            .map_err(|e| ApiError::tool(SEARCH_TOOL_NAME, e))?;
        Ok(format_results(query, &results))
    }
}

pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No web results found for \"{}\".", query);
    }

    results
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let mut entry = format!("{}. {}\n   {}", idx + 1, r.title, r.url);
            if !r.snippet.is_empty() && r.snippet != r.title {
                entry.push_str("\n   ");
                entry.push_str(&r.snippet);
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn perform_search(
    client: &Client,
    settings: &SearchSettings,
    query: &str,
) -> Result<Vec<SearchResult>, ApiError> {
    match settings.provider.as_str() {
        "brave" => {
            if let Some(api_key) = non_empty(&settings.brave_api_key) {
                return brave_search(client, query, api_key).await;
            }
        }
        "bing" => {
            if let Some(api_key) = non_empty(&settings.bing_api_key) {
                return bing_search(client, query, api_key).await;
            }
        }
        "google" => {
            if let (Some(api_key), Some(engine_id)) = (
                non_empty(&settings.google_api_key),
                non_empty(&settings.google_engine_id),
            ) {
                if let Ok(results) = google_search(client, query, api_key, engine_id).await {
                    if !results.is_empty() {
                        return Ok(results);
                    }
                }
            }
        }
        _ => {}
    }

    // Keyless fallback
    duckduckgo_search(client, query).await
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn fetch_json(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<Value, ApiError> {
    let response = request.send().await.map_err(ApiError::internal)?;
    if !response.status().is_success() {
        return Err(ApiError::Internal(format!(
            "{} search failed: {}",
            provider,
            response.status()
        )));
    }
    response.json().await.map_err(ApiError::internal)
}

fn str_field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn collect_results(items: &[Value], title_key: &str, url_key: &str, snippet_key: &str) -> Vec<SearchResult> {
    items
        .iter()
        .filter_map(|item| {
            let title = str_field(item, title_key);
            let url = str_field(item, url_key);
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(SearchResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: str_field(item, snippet_key).to_string(),
            })
        })
        .collect()
}

async fn google_search(
    client: &Client,
    query: &str,
    api_key: &str,
    engine_id: &str,
) -> Result<Vec<SearchResult>, ApiError> {
    let url = format!(
        "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
        api_key,
        engine_id,
        urlencoding::encode(query)
    );

    let payload = fetch_json(client.get(url), "Google").await?;
    let items = payload
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    Ok(collect_results(&items, "title", "link", "snippet"))
}

async fn duckduckgo_search(client: &Client, query: &str) -> Result<Vec<SearchResult>, ApiError> {
    let url = format!(
        "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
        urlencoding::encode(query)
    );

    let payload = fetch_json(client.get(url), "DuckDuckGo").await?;
    Ok(parse_duckduckgo(&payload))
}

fn parse_duckduckgo(payload: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = str_field(payload, "AbstractText");
    let abstract_url = str_field(payload, "AbstractURL");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        results.push(SearchResult {
            title: str_field(payload, "Heading").to_string(),
            url: abstract_url.to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    results
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = str_field(item, "Text");
        let url = str_field(item, "FirstURL");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

async fn brave_search(client: &Client, query: &str, api_key: &str) -> Result<Vec<SearchResult>, ApiError> {
    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}",
        urlencoding::encode(query)
    );

    let request = client
        .get(url)
        .header("X-Subscription-Token", api_key)
        .header("Accept", "application/json");
    let payload = fetch_json(request, "Brave").await?;

    let items = payload
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    Ok(collect_results(&items, "title", "url", "description"))
}

async fn bing_search(client: &Client, query: &str, api_key: &str) -> Result<Vec<SearchResult>, ApiError> {
    let url = format!(
        "https://api.bing.microsoft.com/v7.0/search?q={}",
        urlencoding::encode(query)
    );

    let request = client.get(url).header("Ocp-Apim-Subscription-Key", api_key);
    let payload = fetch_json(request, "Bing").await?;

    let items = payload
        .get("webPages")
        .and_then(|wp| wp.get("value"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    Ok(collect_results(&items, "name", "url", "snippet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duckduckgo_topics_are_flattened() {
        let payload = json!({
            "Heading": "Rust",
            "AbstractText": "Rust is a programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                { "Text": "Cargo - Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo" },
                { "Name": "Tools", "Topics": [
                    { "Text": "Clippy - linter", "FirstURL": "https://duckduckgo.com/Clippy" }
                ]},
                { "Text": "", "FirstURL": "https://duckduckgo.com/empty" }
            ]
        });

        let results = parse_duckduckgo(&payload);

        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust", "Cargo", "Clippy"]);
    }

    #[test]
    fn formatting_numbers_results() {
        let results = vec![SearchResult {
            title: "Tokio".to_string(),
            url: "https://tokio.rs".to_string(),
            snippet: "An asynchronous runtime.".to_string(),
        }];
        assert_eq!(
            format_results("tokio", &results),
            "1. Tokio\n   https://tokio.rs\n   An asynchronous runtime."
        );
        assert_eq!(
            format_results("nothing", &[]),
            "No web results found for \"nothing\"."
        );
    }
}
