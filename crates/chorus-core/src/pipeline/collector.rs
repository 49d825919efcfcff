//! Run collector: the same captioning request, N times per image.
//!
//! Attempts run strictly one after another: images in the order given, runs
//! in increasing `run_index`. A failing attempt is recorded as a failed
//! [`Record`] and never retried, so every image ends up with exactly
//! `repeat_count` records. Anything a provider staged for an attempt is
//! released before the next one starts, whether or not the attempt worked.

use crate::config::Config;
use crate::error::{RunError, RunResult};
use crate::llm::{ImageInput, LlmProvider, LlmRequest};
use crate::pipeline::extract::Extractor;
use crate::types::{ImageRef, ImageResultGroup, Record, ResultSet};
use std::future::Future;
use std::time::Duration;

/// Settings for a collection pass.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Attempts per image
    pub repeat_count: u32,
    /// Pause between attempts on one image
    pub attempt_delay_ms: u64,
    /// Pause between images
    pub image_delay_ms: u64,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            repeat_count: 3,
            attempt_delay_ms: 2000,
            image_delay_ms: 3000,
            timeout_ms: 60_000,
            max_tokens: 1024,
            temperature: 0.4,
        }
    }
}

impl CollectOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repeat_count: config.consistency.repeat_count,
            attempt_delay_ms: config.consistency.attempt_delay_ms,
            image_delay_ms: config.consistency.image_delay_ms,
            timeout_ms: config.limits.llm_timeout_ms,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        }
    }

    /// Same options with the courtesy pauses removed.
    pub fn without_delays(self) -> Self {
        Self {
            attempt_delay_ms: 0,
            image_delay_ms: 0,
            ..self
        }
    }
}

/// What one attempt produced, as reported to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Mentioned,
    NotMentioned,
    Failed(String),
}

impl AttemptOutcome {
    fn of(record: &Record) -> Self {
        if record.failed {
            AttemptOutcome::Failed(record.error.clone().unwrap_or_default())
        } else if record.mentions_subject() {
            AttemptOutcome::Mentioned
        } else {
            AttemptOutcome::NotMentioned
        }
    }
}

/// Progress notification emitted after every attempt.
#[derive(Debug)]
pub struct AttemptEvent<'a> {
    pub image: &'a ImageRef,
    pub run_index: u32,
    pub repeat_count: u32,
    pub outcome: AttemptOutcome,
}

/// Sequential repeat-run collector.
pub struct Collector {
    provider: Box<dyn LlmProvider>,
    extractor: Extractor,
    prompt: String,
    options: CollectOptions,
}

impl Collector {
    pub fn new(
        provider: Box<dyn LlmProvider>,
        extractor: Extractor,
        prompt: String,
        options: CollectOptions,
    ) -> Self {
        Self {
            provider,
            extractor,
            prompt,
            options,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn options(&self) -> &CollectOptions {
        &self.options
    }

    /// Whether the provider is configured and reachable.
    pub async fn provider_available(&self) -> bool {
        self.provider.is_available().await
    }

    /// Run every image `repeat_count` times and group the records.
    ///
    /// Calls `on_attempt` once per attempt, in execution order.
    pub async fn collect<F>(&self, images: &[ImageRef], mut on_attempt: F) -> ResultSet
    where
        F: FnMut(AttemptEvent<'_>),
    {
        let mut results = ResultSet::new();
        for (position, image) in images.iter().enumerate() {
            if position > 0 {
                pause(self.options.image_delay_ms).await;
            }
            let group = self.collect_image(image, &mut on_attempt).await;
            results.push(group);
        }
        results
    }

    async fn collect_image<F>(&self, image: &ImageRef, on_attempt: &mut F) -> ImageResultGroup
    where
        F: FnMut(AttemptEvent<'_>),
    {
        tracing::info!("Processing {}", image.image_id);
        let repeat_count = self.options.repeat_count;

        let input = read_image(image).await;
        if let Err(e) = &input {
            tracing::error!("{e}");
        }

        let mut records = Vec::with_capacity(repeat_count as usize);
        for run_index in 1..=repeat_count {
            let record = match &input {
                Ok(input) => {
                    if run_index > 1 {
                        pause(self.options.attempt_delay_ms).await;
                    }
                    self.attempt(image, input, run_index).await
                }
                Err(e) => Record::failed(image.image_id.clone(), run_index, e.to_string()),
            };

            on_attempt(AttemptEvent {
                image,
                run_index,
                repeat_count,
                outcome: AttemptOutcome::of(&record),
            });
            records.push(record);
        }

        ImageResultGroup::new(image.image_id.clone(), records)
    }

    async fn attempt(&self, image: &ImageRef, input: &ImageInput, run_index: u32) -> Record {
        match self.try_attempt(image, input, run_index).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    "{} run {}/{} failed: {e}",
                    image.image_id,
                    run_index,
                    self.options.repeat_count
                );
                Record::failed(image.image_id.clone(), run_index, e.to_string())
            }
        }
    }

    async fn try_attempt(
        &self,
        image: &ImageRef,
        input: &ImageInput,
        run_index: u32,
    ) -> RunResult<Record> {
        let staged = match self.limited(self.provider.stage(input)).await {
            Err(e @ RunError::Timeout { .. }) => {
                // The upload may still complete remotely; there is no handle to release.
                tracing::warn!(
                    "{} run {}: staging timed out, {} may keep an orphaned upload until it expires",
                    image.image_id,
                    run_index,
                    self.provider.name()
                );
                return Err(e);
            }
            staged => staged?,
        };

        let request = LlmRequest {
            image: staged,
            prompt: self.prompt.clone(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };
        let generated = self.limited(self.provider.generate(&request)).await;

        if let Err(e) = self.provider.release(&request.image).await {
            tracing::warn!("{e}");
        }

        let response = generated?;
        tracing::debug!(
            model = %response.model,
            latency_ms = response.latency_ms,
            tokens = ?response.tokens_used,
            "{} run {} answered",
            image.image_id,
            run_index
        );
        self.extractor
            .extract(&response.text, &image.image_id, run_index)
    }

    async fn limited<T>(&self, call: impl Future<Output = RunResult<T>>) -> RunResult<T> {
        let timeout_ms = self.options.timeout_ms;
        tokio::time::timeout(Duration::from_millis(timeout_ms), call)
            .await
            .unwrap_or(Err(RunError::Timeout { timeout_ms }))
    }
}

async fn read_image(image: &ImageRef) -> RunResult<ImageInput> {
    let bytes = tokio::fs::read(&image.path)
        .await
        .map_err(|e| RunError::ImageRead {
            path: image.path.clone(),
            message: e.to_string(),
        })?;
    let extension = image
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    Ok(ImageInput::from_bytes(&bytes, extension))
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::llm::{LlmResponse, RemoteFile, StagedImage};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    type ResponseFn = Box<dyn Fn(&str, u32) -> RunResult<String> + Send + Sync>;

    /// Scripted provider. `response_fn` gets the image payload and the
    /// 0-based call index and returns the raw text to answer with.
    struct MockProvider {
        response_fn: ResponseFn,
        calls: Arc<AtomicU32>,
        staged: Arc<AtomicU32>,
        released: Arc<AtomicU32>,
        remote: bool,
        fail_release: bool,
        delay: Option<Duration>,
        stage_delay: Option<Duration>,
    }

    impl MockProvider {
        fn new(response_fn: impl Fn(&str, u32) -> RunResult<String> + Send + Sync + 'static) -> Self {
            Self {
                response_fn: Box::new(response_fn),
                calls: Arc::new(AtomicU32::new(0)),
                staged: Arc::new(AtomicU32::new(0)),
                released: Arc::new(AtomicU32::new(0)),
                remote: false,
                fail_release: false,
                delay: None,
                stage_delay: None,
            }
        }

        /// Mentions the subject on the listed 0-based calls only.
        fn mentioning_on(calls: &'static [u32]) -> Self {
            Self::new(move |_, idx| {
                Ok(if calls.contains(&idx) {
                    r#"{"caption": "Juliana sorrindo"}"#.to_string()
                } else {
                    r#"{"caption": "Mulher sorrindo"}"#.to_string()
                })
            })
        }

        fn remote(mut self) -> Self {
            self.remote = true;
            self
        }

        fn failing_release(mut self) -> Self {
            self.fail_release = true;
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn with_stage_delay(mut self, delay: Duration) -> Self {
            self.stage_delay = Some(delay);
            self
        }

        fn counters(&self) -> (Arc<AtomicU32>, Arc<AtomicU32>, Arc<AtomicU32>) {
            (self.calls.clone(), self.staged.clone(), self.released.clone())
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn stage(&self, image: &ImageInput) -> RunResult<StagedImage> {
            self.staged.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.stage_delay {
                tokio::time::sleep(delay).await;
            }
            if self.remote {
                Ok(StagedImage::Remote(RemoteFile {
                    name: "files/mock".into(),
                    uri: image.data.clone(),
                    media_type: image.media_type.clone(),
                }))
            } else {
                Ok(StagedImage::Inline(image.clone()))
            }
        }

        async fn generate(&self, request: &LlmRequest) -> RunResult<LlmResponse> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let payload = match &request.image {
                StagedImage::Inline(image) => image.data.clone(),
                StagedImage::Remote(file) => file.uri.clone(),
            };
            let text = (self.response_fn)(&payload, idx)?;
            Ok(LlmResponse {
                text,
                model: "mock-v1".to_string(),
                tokens_used: Some(42),
                latency_ms: 10,
            })
        }

        async fn release(&self, _staged: &StagedImage) -> RunResult<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                Err(RunError::Release {
                    resource: "files/mock".into(),
                    message: "HTTP 500".into(),
                })
            } else {
                Ok(())
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(60)
        }
    }

    fn options(repeat_count: u32) -> CollectOptions {
        CollectOptions {
            repeat_count,
            ..CollectOptions::default()
        }
        .without_delays()
    }

    fn collector(provider: MockProvider, repeat_count: u32) -> Collector {
        Collector::new(
            Box::new(provider),
            Extractor::for_subject("juliana"),
            "prompt".to_string(),
            options(repeat_count),
        )
    }

    /// Write a small fake image and return a reference to it.
    fn image(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> ImageRef {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        ImageRef {
            image_id: name.to_string(),
            path,
            size: bytes.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_partial_mentions_are_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"aaa")];
        let results = collector(MockProvider::mentioning_on(&[0, 1]), 3)
            .collect(&images, |_| {})
            .await;

        let report = analyze(&results);
        let verdict = &report.verdicts[0];
        assert_eq!(verdict.run_count, 3);
        assert_eq!(verdict.mention_count, 2);
        assert!((verdict.consistency_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(!verdict.is_consistent);
        assert_eq!(report.overall_consistency_percent, 0.0);
    }

    #[tokio::test]
    async fn test_unanimous_images_are_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"A"), image(&dir, "b.jpg", b"B")];
        let a_payload = ImageInput::from_bytes(b"A", "jpg").data;

        let provider = MockProvider::new(move |payload, _| {
            Ok(if payload == a_payload {
                r#"{"caption": "Juliana na praia"}"#.to_string()
            } else {
                r#"{"caption": "Paisagem vazia"}"#.to_string()
            })
        });
        let results = collector(provider, 3).collect(&images, |_| {}).await;

        let report = analyze(&results);
        assert_eq!(report.verdicts[0].mention_count, 3);
        assert_eq!(report.verdicts[1].mention_count, 0);
        assert!(report.verdicts.iter().all(|v| v.is_consistent));
        assert_eq!(report.overall_consistency_percent, 100.0);
    }

    #[tokio::test]
    async fn test_malformed_payload_becomes_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"x"), image(&dir, "b.jpg", b"y")];
        let provider = MockProvider::new(|_, idx| {
            Ok(if idx == 1 {
                "sorry, I cannot help with that".to_string()
            } else {
                r#"{"caption": "Juliana"}"#.to_string()
            })
        });
        let (calls, _, _) = provider.counters();
        let results = collector(provider, 2).collect(&images, |_| {}).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let a = results.get("a.jpg").unwrap();
        assert!(!a.records()[0].failed);
        assert!(a.records()[1].failed);
        assert!(!a.records()[1].mentions_subject());
        assert!(a.records()[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Unparsable response"));
        assert_eq!(results.get("b.jpg").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invocation_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"x")];
        let provider = MockProvider::new(|_, _| {
            Err(RunError::Invocation {
                message: "HTTP 429: quota".into(),
                status_code: Some(429),
            })
        });
        let (calls, _, _) = provider.counters();
        let results = collector(provider, 3).collect(&images, |_| {}).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let group = results.get("a.jpg").unwrap();
        assert_eq!(group.len(), 3);
        assert!(group.records().iter().all(|r| r.failed));

        // Failed runs stay in the denominator.
        let report = analyze(&results);
        assert_eq!(report.verdicts[0].run_count, 3);
        assert_eq!(report.verdicts[0].mention_count, 0);
        assert!(report.verdicts[0].is_consistent);
    }

    #[tokio::test]
    async fn test_release_runs_even_when_generation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"x")];
        let provider = MockProvider::new(|_, idx| {
            if idx == 0 {
                Err(RunError::invocation("connection reset"))
            } else {
                Ok("{}".to_string())
            }
        })
        .remote();
        let (_, staged, released) = provider.counters();
        collector(provider, 3).collect(&images, |_| {}).await;

        assert_eq!(staged.load(Ordering::SeqCst), 3);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_release_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"x")];
        let provider = MockProvider::mentioning_on(&[0, 1]).remote().failing_release();
        let results = collector(provider, 2).collect(&images, |_| {}).await;

        let group = results.get("a.jpg").unwrap();
        assert!(group.records().iter().all(|r| !r.failed));
        assert!(group.records().iter().all(|r| r.mentions_subject()));
    }

    #[tokio::test]
    async fn test_unreadable_image_yields_explicit_failures() {
        let missing = ImageRef {
            image_id: "gone.jpg".into(),
            path: PathBuf::from("/definitely/not/here/gone.jpg"),
            size: 0,
        };
        let provider = MockProvider::mentioning_on(&[0]);
        let (calls, _, _) = provider.counters();
        let results = collector(provider, 3).collect(&[missing], |_| {}).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let group = results.get("gone.jpg").unwrap();
        let indices: Vec<u32> = group.records().iter().map(|r| r.run_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(group.records().iter().all(|r| r.failed));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"x")];
        let provider =
            MockProvider::mentioning_on(&[0]).with_delay(Duration::from_millis(200));
        let collector = Collector::new(
            Box::new(provider),
            Extractor::for_subject("juliana"),
            "prompt".into(),
            CollectOptions {
                repeat_count: 1,
                timeout_ms: 10,
                ..CollectOptions::default()
            }
            .without_delays(),
        );
        let results = collector.collect(&images, |_| {}).await;

        let record = &results.get("a.jpg").unwrap().records()[0];
        assert!(record.failed);
        assert_eq!(record.error.as_deref(), Some("Timeout after 10ms"));
    }

    #[tokio::test]
    async fn test_staging_timeout_skips_generate_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "a.jpg", b"x")];
        let provider = MockProvider::mentioning_on(&[0])
            .remote()
            .with_stage_delay(Duration::from_millis(200));
        let (calls, staged, released) = provider.counters();
        let collector = Collector::new(
            Box::new(provider),
            Extractor::for_subject("juliana"),
            "prompt".into(),
            CollectOptions {
                repeat_count: 2,
                timeout_ms: 10,
                ..CollectOptions::default()
            }
            .without_delays(),
        );
        let results = collector.collect(&images, |_| {}).await;

        let group = results.get("a.jpg").unwrap();
        assert_eq!(group.len(), 2);
        assert!(group
            .records()
            .iter()
            .all(|r| r.error.as_deref() == Some("Timeout after 10ms")));
        assert_eq!(staged.load(Ordering::SeqCst), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_events_follow_execution_order() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![image(&dir, "b.jpg", b"b"), image(&dir, "a.jpg", b"a")];
        let mut events = Vec::new();
        let results = collector(MockProvider::mentioning_on(&[1]), 2)
            .collect(&images, |event| {
                events.push((event.image.image_id.clone(), event.run_index, event.outcome))
            })
            .await;

        assert_eq!(
            events,
            vec![
                ("b.jpg".to_string(), 1, AttemptOutcome::NotMentioned),
                ("b.jpg".to_string(), 2, AttemptOutcome::Mentioned),
                ("a.jpg".to_string(), 1, AttemptOutcome::NotMentioned),
                ("a.jpg".to_string(), 2, AttemptOutcome::NotMentioned),
            ]
        );
        let ids: Vec<&str> = results.groups().iter().map(|g| g.image_id()).collect();
        assert_eq!(ids, vec!["b.jpg", "a.jpg"]);
    }

    #[tokio::test]
    async fn test_provider_available_delegates() {
        let collector = collector(MockProvider::new(|_, _| Ok("{}".into())), 1);
        assert!(collector.provider_available().await);
        assert_eq!(collector.provider_name(), "mock");
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.consistency.repeat_count = 5;
        config.limits.llm_timeout_ms = 1234;
        let opts = CollectOptions::from_config(&config);
        assert_eq!(opts.repeat_count, 5);
        assert_eq!(opts.timeout_ms, 1234);
        assert_eq!(opts.attempt_delay_ms, 2000);

        let opts = opts.without_delays();
        assert_eq!(opts.attempt_delay_ms, 0);
        assert_eq!(opts.image_delay_ms, 0);
        assert_eq!(opts.repeat_count, 5);
    }
}
