//! REST client for the public cBioPortal API
//!
//! One client is built per process and shared behind an `Arc`; reqwest pools
//! connections internally. Transient failures (connect errors, timeouts, 5xx)
//! are retried with a linear backoff.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{
    ClinicalDatum, Gene, GeneFilter, MolecularDatum, MolecularProfile, Mutation, SampleList, Study,
};
use crate::config::CbioportalConfig;
use crate::metrics::CBIOPORTAL_REQUESTS;

/// Error type for cBioPortal lookups
///
/// The lookup variants carry the exact message handed back to the model.
#[derive(Debug, Error)]
pub enum CbioportalError {
    #[error("API error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("API error: could not decode response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Could not find any studies matching '{0}'")]
    NoStudies(String),

    #[error("Could not resolve gene symbols to IDs")]
    UnresolvedGenes,

    #[error("No usable data found for '{0}'")]
    NoUsableData(String),

    #[error("Failed to fetch any data from studies")]
    NoData,

    #[error("{0}")]
    InvalidQuery(String),
}

/// Molecular profiles chosen for one study
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSelection {
    pub mutation: Option<String>,
    pub mrna: Option<String>,
    pub protein: Option<String>,
    pub cna: Option<String>,
}

#[derive(Clone)]
pub struct CbioportalClient {
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
    pub(crate) max_studies: usize,
    pub(crate) study_page_size: usize,
}

impl CbioportalClient {
    /// Client with default pool and retry settings
    pub fn new(base_url: impl Into<String>) -> Result<Self, CbioportalError> {
        let config = CbioportalConfig {
            base_url: base_url.into(),
            ..Default::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &CbioportalConfig) -> Result<Self, CbioportalError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            max_studies: config.max_studies,
            study_page_size: config.study_page_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Studies matching a keyword (first page only)
    pub async fn studies(&self, keyword: &str, page_size: usize) -> Result<Vec<Study>, CbioportalError> {
        let url = format!("{}/studies", self.base_url);
        let page_size = page_size.to_string();
        self.send("studies", || {
            self.client.get(&url).query(&[
                ("keyword", keyword),
                ("projection", "SUMMARY"),
                ("pageSize", page_size.as_str()),
                ("pageNumber", "0"),
            ])
        })
        .await
    }

    /// Ids of the largest matching studies, at most `max`
    pub async fn study_ids_for(&self, keyword: &str, max: usize) -> Result<Vec<String>, CbioportalError> {
        let mut studies = self.studies(keyword, self.study_page_size).await?;
        // Stable sort keeps the API order among equally sized studies
        studies.sort_by(|a, b| b.all_sample_count.cmp(&a.all_sample_count));
        Ok(studies.into_iter().take(max).map(|s| s.study_id).collect())
    }

    /// Resolve HUGO symbols to genes. Unknown symbols are simply absent.
    pub async fn genes(&self, symbols: &[String]) -> Result<Vec<Gene>, CbioportalError> {
        let url = format!("{}/genes/fetch", self.base_url);
        self.send("genes", || {
            self.client
                .post(&url)
                .query(&[("geneIdType", "HUGO_GENE_SYMBOL"), ("projection", "SUMMARY")])
                .json(symbols)
        })
        .await
    }

    pub async fn molecular_profiles(&self, study_id: &str) -> Result<Vec<MolecularProfile>, CbioportalError> {
        let url = format!("{}/studies/{}/molecular-profiles", self.base_url, study_id);
        self.send("molecular_profiles", || {
            self.client.get(&url).query(&[("projection", "SUMMARY")])
        })
        .await
    }

    pub async fn sample_lists(&self, study_id: &str) -> Result<Vec<SampleList>, CbioportalError> {
        let url = format!("{}/studies/{}/sample-lists", self.base_url, study_id);
        self.send("sample_lists", || {
            self.client.get(&url).query(&[("projection", "SUMMARY")])
        })
        .await
    }

    pub async fn sample_list(&self, sample_list_id: &str) -> Result<SampleList, CbioportalError> {
        let url = format!("{}/sample-lists/{}", self.base_url, sample_list_id);
        self.send("sample_list", || self.client.get(&url)).await
    }

    pub async fn mutations(
        &self,
        profile_id: &str,
        sample_list_id: &str,
        gene_ids: &[i64],
    ) -> Result<Vec<Mutation>, CbioportalError> {
        let url = format!("{}/molecular-profiles/{}/mutations/fetch", self.base_url, profile_id);
        let filter = GeneFilter {
            sample_list_id,
            entrez_gene_ids: gene_ids,
        };
        self.send("mutations", || {
            self.client
                .post(&url)
                .query(&[("projection", "DETAILED")])
                .json(&filter)
        })
        .await
    }

    /// Expression, RPPA or discrete CNA values for a profile
    pub async fn molecular_data(
        &self,
        profile_id: &str,
        sample_list_id: &str,
        gene_ids: &[i64],
    ) -> Result<Vec<MolecularDatum>, CbioportalError> {
        let url = format!(
            "{}/molecular-profiles/{}/molecular-data/fetch",
            self.base_url, profile_id
        );
        let filter = GeneFilter {
            sample_list_id,
            entrez_gene_ids: gene_ids,
        };
        self.send("molecular_data", || {
            self.client
                .post(&url)
                .query(&[("projection", "SUMMARY")])
                .json(&filter)
        })
        .await
    }

    /// Patient-level clinical attributes for a study
    pub async fn clinical_data(&self, study_id: &str) -> Result<Vec<ClinicalDatum>, CbioportalError> {
        let url = format!("{}/studies/{}/clinical-data", self.base_url, study_id);
        self.send("clinical_data", || {
            self.client
                .get(&url)
                .query(&[("clinicalDataType", "PATIENT"), ("projection", "SUMMARY")])
        })
        .await
    }

    /// Send a request built by `build`, retrying transient failures
    async fn send<T, F>(&self, endpoint: &'static str, build: F) -> Result<T, CbioportalError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let retryable = attempt < self.max_retries;

            match build().header("Accept", "application/json").send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && retryable {
                        warn!(endpoint, %status, attempt, "cBioPortal server error, retrying");
                    } else {
                        let body = response.text().await?;
                        if !status.is_success() {
                            CBIOPORTAL_REQUESTS.with_label_values(&[endpoint, "error"]).inc();
                            return Err(CbioportalError::Status {
                                endpoint,
                                status,
                                body,
                            });
                        }
                        CBIOPORTAL_REQUESTS.with_label_values(&[endpoint, "ok"]).inc();
                        return decode(&body);
                    }
                }
                Err(e) if retryable && (e.is_connect() || e.is_timeout()) => {
                    warn!(endpoint, error = %e, attempt, "cBioPortal request failed, retrying");
                }
                Err(e) => {
                    CBIOPORTAL_REQUESTS.with_label_values(&[endpoint, "error"]).inc();
                    return Err(e.into());
                }
            }

            CBIOPORTAL_REQUESTS.with_label_values(&[endpoint, "retry"]).inc();
            attempt += 1;
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }
}

/// Decode a JSON body. The fetch endpoints answer some empty queries with
/// no body at all, which decodes as an empty list.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, CbioportalError> {
    let body = if body.trim().is_empty() { "[]" } else { body };
    let value = serde_json::from_str(body)?;
    debug!(bytes = body.len(), "decoded cBioPortal response");
    Ok(value)
}

/// Pick the mutation, mRNA, protein and CNA profiles of a study
pub fn select_profiles(profiles: &[MolecularProfile]) -> ProfileSelection {
    ProfileSelection {
        mutation: first_of_type(profiles, &["MUTATION_EXTENDED"], &[]),
        mrna: first_of_type(profiles, &["MRNA_EXPRESSION"], &["rna_seq", "mrna"]),
        protein: first_of_type(profiles, &["PROTEIN_LEVEL", "PROTEIN_ARRAY_PROTEIN_LEVEL"], &[]),
        cna: first_of_type(profiles, &["COPY_NUMBER_ALTERATION"], &["gistic", "cna"]),
    }
}

/// First profile of one of `kinds` whose id contains a hint, else the first
/// of those kinds
fn first_of_type(profiles: &[MolecularProfile], kinds: &[&str], hints: &[&str]) -> Option<String> {
    let candidates: Vec<&MolecularProfile> = profiles
        .iter()
        .filter(|p| kinds.contains(&p.molecular_alteration_type.as_str()))
        .collect();

    candidates
        .iter()
        .find(|p| {
            let id = p.molecular_profile_id.to_lowercase();
            hints.iter().any(|h| id.contains(h))
        })
        .or_else(|| candidates.first())
        .map(|p| p.molecular_profile_id.clone())
}

/// Tumor sample list: RNA-seq samples, then all samples, then whatever comes first
pub fn select_sample_list(lists: &[SampleList]) -> Option<&str> {
    lists
        .iter()
        .find(|l| l.sample_list_id.to_lowercase().contains("rna_seq"))
        .or_else(|| lists.iter().find(|l| l.sample_list_id.contains("_all")))
        .or_else(|| lists.first())
        .map(|l| l.sample_list_id.as_str())
}

/// Sample list of normal or adjacent tissue, if the study has one
pub fn select_normal_sample_list(lists: &[SampleList]) -> Option<&str> {
    const KEYWORDS: [&str; 4] = ["normal", "control", "adj", "solid_tissue_normal"];
    lists
        .iter()
        .find(|l| {
            let id = l.sample_list_id.to_lowercase();
            KEYWORDS.iter().any(|k| id.contains(k))
        })
        .map(|l| l.sample_list_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const STUDIES: &str = r#"[{"studyId":"brca_tcga","name":"Breast","allSampleCount":1084}]"#;

    #[derive(Clone, Copy)]
    enum Reply {
        Status(u16, &'static str),
        /// Read the request and never answer
        Stall,
    }

    /// Local HTTP server answering its Nth connection with `replies[N]`,
    /// repeating the last reply. Returns the base url and a connection count.
    async fn scripted_server(replies: Vec<Reply>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = replies[n.min(replies.len() - 1)];
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(read) => request.extend_from_slice(&chunk[..read]),
                        }
                    }
                    match reply {
                        Reply::Stall => tokio::time::sleep(Duration::from_secs(30)).await,
                        Reply::Status(code, body) => {
                            let response = format!(
                                "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                code,
                                body.len(),
                                body
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                    }
                });
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn fast_retry_client(base_url: String, request_timeout_secs: u64) -> CbioportalClient {
        CbioportalClient::from_config(&CbioportalConfig {
            base_url,
            retry_backoff_ms: 1,
            request_timeout_secs,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_succeeds() {
        let (url, hits) =
            scripted_server(vec![Reply::Status(503, "busy"), Reply::Status(200, STUDIES)]).await;
        let client = fast_retry_client(url, 5);

        let studies = client.studies("breast", 20).await.unwrap();
        assert_eq!(studies.len(), 1);
        assert_eq!(studies[0].study_id, "brca_tcga");
        assert_eq!(studies[0].all_sample_count, 1084);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_error_after_last_retry_is_returned() {
        let (url, hits) = scripted_server(vec![Reply::Status(502, "down")]).await;
        let client = fast_retry_client(url, 5);

        let err = client.studies("breast", 20).await.unwrap_err();
        match err {
            CbioportalError::Status {
                endpoint,
                status,
                body,
            } => {
                assert_eq!(endpoint, "studies");
                assert_eq!(status.as_u16(), 502);
                assert_eq!(body, "down");
            }
            other => panic!("unexpected error: {}", other),
        }
        // First attempt plus max_retries
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, hits) = scripted_server(vec![Reply::Status(404, "missing")]).await;
        let client = fast_retry_client(url, 5);

        let err = client.studies("breast", 20).await.unwrap_err();
        assert!(err.to_string().starts_with("API error: studies returned 404"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timed_out_request_is_retried() {
        let (url, hits) = scripted_server(vec![Reply::Stall, Reply::Status(200, STUDIES)]).await;
        let client = fast_retry_client(url, 1);

        let ids = client.study_ids_for("breast", 5).await.unwrap();
        assert_eq!(ids, vec!["brca_tcga".to_string()]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_body_decodes_as_empty_list() {
        let (url, _) = scripted_server(vec![Reply::Status(200, "")]).await;
        let client = fast_retry_client(url, 5);
        assert!(client.studies("nothing", 20).await.unwrap().is_empty());
    }

    fn profile(id: &str, kind: &str) -> MolecularProfile {
        MolecularProfile {
            molecular_profile_id: id.to_string(),
            molecular_alteration_type: kind.to_string(),
        }
    }

    fn list(id: &str) -> SampleList {
        SampleList {
            sample_list_id: id.to_string(),
            sample_ids: Vec::new(),
            sample_count: None,
        }
    }

    #[test]
    fn test_profile_selection_prefers_rna_seq_and_gistic() {
        let profiles = vec![
            profile("brca_tcga_mrna_median", "MRNA_EXPRESSION_X"),
            profile("brca_tcga_mutations", "MUTATION_EXTENDED"),
            profile("brca_tcga_microarray", "MRNA_EXPRESSION"),
            profile("brca_tcga_rna_seq_v2_mrna_median_Zscores", "MRNA_EXPRESSION"),
            profile("brca_tcga_log2CNA", "COPY_NUMBER_ALTERATION"),
            profile("brca_tcga_gistic", "COPY_NUMBER_ALTERATION"),
            profile("brca_tcga_rppa_Zscores", "PROTEIN_LEVEL"),
        ];

        let selection = select_profiles(&profiles);
        assert_eq!(selection.mutation.as_deref(), Some("brca_tcga_mutations"));
        assert_eq!(
            selection.mrna.as_deref(),
            Some("brca_tcga_rna_seq_v2_mrna_median_Zscores")
        );
        // "log2CNA" also contains "cna" and comes first
        assert_eq!(selection.cna.as_deref(), Some("brca_tcga_log2CNA"));
        assert_eq!(selection.protein.as_deref(), Some("brca_tcga_rppa_Zscores"));
    }

    #[test]
    fn test_profile_selection_falls_back_to_first_of_type() {
        let profiles = vec![profile("luad_microarray", "MRNA_EXPRESSION")];
        let selection = select_profiles(&profiles);
        assert_eq!(selection.mrna.as_deref(), Some("luad_microarray"));
        assert!(selection.mutation.is_none());
        assert!(selection.cna.is_none());
    }

    #[test]
    fn test_sample_list_preference() {
        let lists = vec![list("brca_cnaseq"), list("brca_all"), list("brca_rna_seq_v2_mrna")];
        assert_eq!(select_sample_list(&lists), Some("brca_rna_seq_v2_mrna"));

        let lists = vec![list("brca_cnaseq"), list("brca_all")];
        assert_eq!(select_sample_list(&lists), Some("brca_all"));

        let lists = vec![list("brca_cnaseq")];
        assert_eq!(select_sample_list(&lists), Some("brca_cnaseq"));
        assert_eq!(select_sample_list(&[]), None);
    }

    #[test]
    fn test_normal_sample_list() {
        let lists = vec![list("brca_all"), list("brca_solid_tissue_normal")];
        assert_eq!(
            select_normal_sample_list(&lists),
            Some("brca_solid_tissue_normal")
        );
        assert_eq!(select_normal_sample_list(&lists[..1]), None);
    }

    #[test]
    fn test_lookup_errors_render_model_facing_messages() {
        assert_eq!(
            CbioportalError::NoStudies("Pancreatic".into()).to_string(),
            "Could not find any studies matching 'Pancreatic'"
        );
        assert_eq!(
            CbioportalError::UnresolvedGenes.to_string(),
            "Could not resolve gene symbols to IDs"
        );
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = CbioportalClient::new("https://www.cbioportal.org/api/").unwrap();
        assert_eq!(client.base_url(), "https://www.cbioportal.org/api");
    }
}
