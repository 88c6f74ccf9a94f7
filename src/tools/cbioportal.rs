//! `search_cbioportal`: aggregated genomics data for genes in a cancer type

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parse_symbol_list, string_arg, BioTool, ToolOutput};
use crate::cbioportal::{CbioportalClient, CbioportalError, CbioportalReport};
use crate::llm::Tool;

pub const NAME: &str = "search_cbioportal";

const DESCRIPTION: &str = "PRIMARY TOOL: Search cBioPortal for real-world cancer genomics data. \
ALWAYS use this tool for gene/cancer questions instead of general knowledge. Returns, per gene, \
mutation frequency and hotspots, mRNA expression (tumor, normal and fold change), protein \
expression (RPPA), copy number alterations and a clinical summary aggregated across the largest \
matching studies. To compare cancer types, call it once per cancer_name with the same genes.";

pub struct CbioportalSearchTool {
    client: Arc<CbioportalClient>,
}

impl CbioportalSearchTool {
    pub fn new(client: Arc<CbioportalClient>) -> Self {
        Self { client }
    }
}

/// Validated `(genes, cancer_name)` from tool arguments
pub(crate) fn gene_query(
    args: &Value,
    genes_key: &str,
) -> Result<(Vec<String>, String), String> {
    let genes = args.get(genes_key).map(parse_symbol_list).unwrap_or_default();
    if genes.is_empty() {
        return Err(format!(
            "'{}' must contain at least one comma-separated gene symbol",
            genes_key
        ));
    }
    let cancer_name = string_arg(args, "cancer_name");
    if cancer_name.is_empty() {
        return Err("'cancer_name' must not be empty".to_string());
    }
    Ok((genes, cancer_name.to_string()))
}

/// Run the search and log the outcome
pub(crate) async fn run_search(
    client: &CbioportalClient,
    genes: &[String],
    cancer_name: &str,
) -> Result<CbioportalReport, CbioportalError> {
    info!(genes = ?genes, cancer_name, "cBioPortal query");
    let result = client.search(genes, cancer_name).await;
    if let Err(e) = &result {
        warn!(cancer_name, error = %e, "cBioPortal query failed");
    }
    result
}

#[async_trait]
impl BioTool for CbioportalSearchTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn definition(&self) -> Tool {
        Tool::function(
            NAME,
            DESCRIPTION,
            json!({
                "type": "object",
                "properties": {
                    "genes": {
                        "type": "string",
                        "description": "Comma-separated gene symbols, 3-10 recommended, e.g. 'TP53,PIK3CA,EGFR,KRAS'"
                    },
                    "cancer_name": {
                        "type": "string",
                        "description": "Cancer type keyword, general ('Breast', 'Lung') or specific ('Lung Adenocarcinoma')"
                    }
                },
                "required": ["genes", "cancer_name"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> ToolOutput {
        let (genes, cancer_name) = match gene_query(args, "genes") {
            Ok(query) => query,
            Err(message) => return ToolOutput::error(message),
        };

        match run_search(&self.client, &genes, &cancer_name).await {
            Ok(report) => match report.to_json_pretty() {
                Ok(text) => ToolOutput::ok(text),
                Err(e) => ToolOutput::error(e.to_string()),
            },
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}
