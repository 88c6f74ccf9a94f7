//! `search_biorxiv`: preprint lookup through the DuckDuckGo JSON API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{string_arg, BioTool, ToolOutput};
use crate::llm::Tool;

pub const NAME: &str = "search_biorxiv";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    results: Vec<Topic>,
    #[serde(default)]
    related_topics: Vec<Topic>,
}

/// Either a single result or a named group of results
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Topic {
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    topics: Vec<Topic>,
}

impl InstantAnswer {
    /// Abstract first, then direct results, then related topics (groups
    /// flattened)
    fn into_hits(self) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        if !self.abstract_url.is_empty() {
            hits.push(SearchHit {
                title: non_empty(self.heading, "No title"),
                url: self.abstract_url,
                snippet: non_empty(self.abstract_text, "No description"),
            });
        }

        let mut stack: Vec<Topic> = self.results;
        stack.extend(self.related_topics);
        for topic in stack {
            collect_topic(topic, &mut hits);
        }
        hits
    }
}

fn collect_topic(topic: Topic, hits: &mut Vec<SearchHit>) {
    if !topic.first_url.is_empty() {
        let title = topic
            .text
            .split(" - ")
            .next()
            .unwrap_or_default()
            .to_string();
        hits.push(SearchHit {
            title: non_empty(title, "No title"),
            url: topic.first_url,
            snippet: non_empty(topic.text, "No description"),
        });
    }
    for child in topic.topics {
        collect_topic(child, hits);
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Numbered list: title, URL and snippet per hit, separated by blank lines
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}. {}\n   URL: {}\n   {}",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct BiorxivSearchTool {
    search_url: String,
    max_results: usize,
    client: reqwest::Client,
}

impl BiorxivSearchTool {
    pub fn new(search_url: impl Into<String>, max_results: usize) -> Self {
        Self {
            search_url: search_url.into(),
            max_results,
            client: reqwest::Client::new(),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, reqwest::Error> {
        let scoped = format!("site:biorxiv.org {}", query);
        let answer: InstantAnswer = self
            .client
            .get(&self.search_url)
            .query(&[
                ("q", scoped.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut hits = answer.into_hits();
        hits.truncate(self.max_results);
        Ok(hits)
    }
}

#[async_trait]
impl BioTool for BiorxivSearchTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn definition(&self) -> Tool {
        Tool::function(
            NAME,
            "Search bioRxiv for biology preprints. Returns the top results with title, URL and snippet.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query for bioRxiv preprints"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> ToolOutput {
        let query = string_arg(args, "query");
        if query.is_empty() {
            return ToolOutput::error("'query' must not be empty");
        }

        match self.search(query).await {
            Ok(hits) if hits.is_empty() => {
                debug!(query, "no bioRxiv results");
                ToolOutput::ok(format!("No bioRxiv preprints found for query: {}", query))
            }
            Ok(hits) => ToolOutput::ok(format_hits(&hits)),
            Err(e) => {
                warn!(query, error = %e, "bioRxiv search failed");
                ToolOutput::error_text(format!("Error searching bioRxiv: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_from_instant_answer() {
        let answer: InstantAnswer = serde_json::from_value(json!({
            "Heading": "",
            "AbstractURL": "",
            "Results": [],
            "RelatedTopics": [
                {"FirstURL": "https://www.biorxiv.org/content/1", "Text": "KRAS signaling - a review"},
                {"Name": "Group", "Topics": [
                    {"FirstURL": "https://www.biorxiv.org/content/2", "Text": "TP53 in cancer"}
                ]}
            ]
        }))
        .unwrap();

        let hits = answer.into_hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "KRAS signaling");
        assert_eq!(hits[1].url, "https://www.biorxiv.org/content/2");
    }

    #[test]
    fn test_format_hits() {
        let hits = vec![
            SearchHit {
                title: "A".into(),
                url: "https://a".into(),
                snippet: "about a".into(),
            },
            SearchHit {
                title: "B".into(),
                url: "https://b".into(),
                snippet: "about b".into(),
            },
        ];
        assert_eq!(
            format_hits(&hits),
            "1. A\n   URL: https://a\n   about a\n\n2. B\n   URL: https://b\n   about b"
        );
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let tool = BiorxivSearchTool::new("http://localhost:1/", 5);
        let output = tool.call(&json!({"query": "  "})).await;
        assert!(output.is_error);
    }
}
