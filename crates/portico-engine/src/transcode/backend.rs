use anyhow::Result;
use async_trait::async_trait;
use portico_core::models::TranscoderPreset;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One page of a backend listing.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutputRequest {
    pub preset_id: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobRequest {
    /// Key of the input object in the pipeline's input bucket.
    pub input_key: String,
    pub pipeline_id: String,
    pub outputs: Vec<JobOutputRequest>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobResponse {
    pub status_code: u16,
    pub job_id: Option<String>,
}

impl CreateJobResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// A managed transcoding service.
#[async_trait]
pub trait TranscoderBackend: Send + Sync {
    async fn list_pipelines(&self, page_token: Option<String>) -> Result<Page<Pipeline>>;

    async fn list_presets(&self, page_token: Option<String>) -> Result<Page<TranscoderPreset>>;

    /// Submit a job. A rejection by the service is a response with a non-2xx
    /// status, not an error.
    async fn create_job(&self, request: &CreateJobRequest) -> Result<CreateJobResponse>;
}

/// Cached pipeline and preset lookups over a [`TranscoderBackend`].
///
/// A name missing from the cache triggers a full reload, so pipelines and presets
/// created after startup are picked up.
pub struct TranscoderLookup {
    backend: std::sync::Arc<dyn TranscoderBackend>,
    pipelines: RwLock<HashMap<String, String>>,
    presets: RwLock<HashMap<String, TranscoderPreset>>,
}

impl TranscoderLookup {
    pub fn new(backend: std::sync::Arc<dyn TranscoderBackend>) -> Self {
        Self {
            backend,
            pipelines: RwLock::new(HashMap::new()),
            presets: RwLock::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &dyn TranscoderBackend {
        self.backend.as_ref()
    }

    pub async fn get_pipeline_id(&self, name: &str) -> Result<Option<String>> {
        if let Some(id) = self.pipelines.read().await.get(name) {
            return Ok(Some(id.clone()));
        }

        let mut all = HashMap::new();
        let mut token = None;
        loop {
            let page = self.backend.list_pipelines(token).await?;
            all.extend(page.items.into_iter().map(|p| (p.name, p.id)));
            token = page.next_page_token;
            if token.is_none() {
                break;
            }
        }
        tracing::debug!(pipelines = all.len(), "Loaded transcoder pipelines");

        let found = all.get(name).cloned();
        *self.pipelines.write().await = all;
        Ok(found)
    }

    /// Presets by name. Reloads when any of `required` is not cached.
    pub async fn get_presets_by_name(&self, required: &[&str]) -> Result<HashMap<String, TranscoderPreset>> {
        {
            let cached = self.presets.read().await;
            if !cached.is_empty() && required.iter().all(|name| cached.contains_key(*name)) {
                return Ok(cached.clone());
            }
        }

        self.load_presets().await
    }

    /// Presets by id, as referenced by job outputs. Loads the presets if none are cached.
    pub async fn get_presets_by_id(&self) -> Result<HashMap<String, TranscoderPreset>> {
        let cached = self.presets.read().await.clone();
        let by_name = if cached.is_empty() {
            self.load_presets().await?
        } else {
            cached
        };
        Ok(by_name
            .into_values()
            .map(|preset| (preset.id.clone(), preset))
            .collect())
    }

    async fn load_presets(&self) -> Result<HashMap<String, TranscoderPreset>> {
        let mut all = HashMap::new();
        let mut token = None;
        loop {
            let page = self.backend.list_presets(token).await?;
            all.extend(page.items.into_iter().map(|p| (p.name.clone(), p)));
            token = page.next_page_token;
            if token.is_none() {
                break;
            }
        }
        if all.is_empty() {
            tracing::info!("No transcoder presets found");
        }

        *self.presets.write().await = all.clone();
        Ok(all)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory backend listing two pages of pipelines and presets.
    pub(crate) struct MockTranscoderBackend {
        pub pipeline_pages: Vec<Vec<Pipeline>>,
        pub presets: Vec<TranscoderPreset>,
        pub create_status: u16,
        pub list_calls: AtomicUsize,
        pub jobs: Mutex<Vec<CreateJobRequest>>,
    }

    impl MockTranscoderBackend {
        pub(crate) fn new() -> Self {
            Self {
                pipeline_pages: vec![
                    vec![Pipeline { id: "p-1".into(), name: "other".into() }],
                    vec![Pipeline { id: "p-2".into(), name: "portico-av".into() }],
                ],
                presets: vec![
                    preset("1351620000001-100070", "System preset: Web", "mp4"),
                    preset("1351620000001-300040", "System preset: Audio MP3 - 128k", "mp3"),
                    preset("1351620000001-100240", "System preset: Webm 720p", "webm"),
                ],
                create_status: 201,
                list_calls: AtomicUsize::new(0),
                jobs: Mutex::new(Vec::new()),
            }
        }
    }

    pub(crate) fn preset(id: &str, name: &str, extension: &str) -> TranscoderPreset {
        TranscoderPreset {
            id: id.to_string(),
            name: name.to_string(),
            extension: extension.to_string(),
        }
    }

    #[async_trait]
    impl TranscoderBackend for MockTranscoderBackend {
        async fn list_pipelines(&self, page_token: Option<String>) -> Result<Page<Pipeline>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            Ok(Page {
                items: self.pipeline_pages.get(index).cloned().unwrap_or_default(),
                next_page_token: (index + 1 < self.pipeline_pages.len()).then(|| (index + 1).to_string()),
            })
        }

        async fn list_presets(&self, _page_token: Option<String>) -> Result<Page<TranscoderPreset>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Page {
                items: self.presets.clone(),
                next_page_token: None,
            })
        }

        async fn create_job(&self, request: &CreateJobRequest) -> Result<CreateJobResponse> {
            self.jobs.lock().unwrap().push(request.clone());
            Ok(CreateJobResponse {
                status_code: self.create_status,
                job_id: Some("1234567890123-abcdef".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_pipeline_found_on_second_page() {
        let lookup = TranscoderLookup::new(Arc::new(MockTranscoderBackend::new()));
        assert_eq!(lookup.get_pipeline_id("portico-av").await.unwrap().as_deref(), Some("p-2"));
    }

    #[tokio::test]
    async fn test_cached_pipeline_skips_listing() {
        let backend = Arc::new(MockTranscoderBackend::new());
        let lookup = TranscoderLookup::new(backend.clone());

        lookup.get_pipeline_id("portico-av").await.unwrap();
        let after_first = backend.list_calls.load(Ordering::SeqCst);
        lookup.get_pipeline_id("portico-av").await.unwrap();
        lookup.get_pipeline_id("other").await.unwrap();

        assert_eq!(backend.list_calls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_reloads_and_returns_none() {
        let backend = Arc::new(MockTranscoderBackend::new());
        let lookup = TranscoderLookup::new(backend.clone());

        assert!(lookup.get_pipeline_id("missing").await.unwrap().is_none());
        assert!(lookup.get_pipeline_id("missing").await.unwrap().is_none());
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_presets_reload_on_miss() {
        let backend = Arc::new(MockTranscoderBackend::new());
        let lookup = TranscoderLookup::new(backend.clone());

        let presets = lookup.get_presets_by_name(&["System preset: Web"]).await.unwrap();
        assert_eq!(presets["System preset: Web"].extension, "mp4");
        lookup.get_presets_by_name(&["System preset: Web"]).await.unwrap();
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);

        lookup.get_presets_by_name(&["Not a preset"]).await.unwrap();
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_presets_by_id_share_the_name_cache() {
        let backend = Arc::new(MockTranscoderBackend::new());
        let lookup = TranscoderLookup::new(backend.clone());

        let by_id = lookup.get_presets_by_id().await.unwrap();
        assert_eq!(by_id["1351620000001-300040"].name, "System preset: Audio MP3 - 128k");
        assert_eq!(by_id.len(), 3);

        lookup.get_presets_by_name(&["System preset: Web"]).await.unwrap();
        lookup.get_presets_by_id().await.unwrap();
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_job_status_ranges() {
        let response = |status_code| CreateJobResponse { status_code, job_id: None };
        assert!(response(201).is_success());
        assert!(response(202).is_success());
        assert!(!response(400).is_success());
        assert!(!response(503).is_success());
    }
}
