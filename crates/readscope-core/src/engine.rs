//! Assessment engine orchestrator.
//!
//! Owns the injected collaborators (repository, access-code store, narrative
//! generator, result sink) and runs the flow around the pure pipeline:
//! start a session, then grade, score, and narrate a submission.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::composer::{ComposerConfig, TestComposer};
use crate::error::{AssessmentError, ProviderError};
use crate::evaluator::{self, GradedItem};
use crate::metacognition::{self, MetacognitionMatrix};
use crate::model::{AgeBand, Response, SessionQuestion, TestSession, TestStructure, TestTakerInfo};
use crate::report::ExportRow;
use crate::scoring::{self, ScoreProfile};
use crate::synthesis::{
    self, mentions_priority, CoachingReport, NarrativeSummary, Recommendation, ReportPolicy,
};
use crate::taxonomy::SkillTaxonomy;
use crate::timing::{self, TimingAnalysis, TimingPolicy};
use crate::traits::{
    clean_narrative, AccessCodeStore, NarrativeGenerator, NarrativeRequest, QuestionRepository,
    Redemption, ResultSink, DEFAULT_SYSTEM_PROMPT,
};

/// Settings for the generative narrative call.
#[derive(Debug, Clone)]
pub struct NarrativeSettings {
    /// Model identifier passed to the narrator.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Retries after the first attempt. Permanent provider errors are never retried.
    pub max_retries: u32,
    /// Delay before a retry, unless the provider asked for a specific one.
    pub retry_delay: Duration,
    pub system_prompt_override: Option<String>,
}

impl Default for NarrativeSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
            system_prompt_override: None,
        }
    }
}

/// Configuration for the assessment engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub taxonomy: SkillTaxonomy,
    pub timing: TimingPolicy,
    pub report: ReportPolicy,
    pub composer: ComposerConfig,
    pub narrative: NarrativeSettings,
}

/// Where the overall comment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeSource {
    Generated { provider: String, model: String },
    /// Templated fallback; `reason` says why the narrator was not used.
    Templated { reason: String },
}

impl NarrativeSource {
    pub fn is_generated(&self) -> bool {
        matches!(self, NarrativeSource::Generated { .. })
    }
}

/// Output of the synchronous grading and scoring pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub items: Vec<GradedItem>,
    pub profile: ScoreProfile,
    pub metacognition: MetacognitionMatrix,
    pub timing: TimingAnalysis,
    pub coaching: CoachingReport,
}

impl Analysis {
    /// Attach the final narrative.
    pub fn into_outcome(
        self,
        overall_comment: String,
        narrative_source: NarrativeSource,
    ) -> SubmissionOutcome {
        SubmissionOutcome {
            analysis: self.profile,
            metacognition: self.metacognition,
            timing: self.timing,
            overall_comment,
            recommendations: self.coaching.recommendations.clone(),
            coaching: self.coaching,
            items: self.items,
            narrative_source,
        }
    }
}

/// Externally observable result of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Skill, genre, and category scores, including the speed score.
    pub analysis: ScoreProfile,
    pub metacognition: MetacognitionMatrix,
    pub timing: TimingAnalysis,
    /// Final narrative text, generated or templated.
    pub overall_comment: String,
    pub recommendations: Vec<Recommendation>,
    pub coaching: CoachingReport,
    pub items: Vec<GradedItem>,
    pub narrative_source: NarrativeSource,
}

/// Grade, score, and synthesize in one pass. No I/O.
pub fn analyze(
    questions: &[SessionQuestion],
    responses: &[Response],
    config: &EngineConfig,
) -> Analysis {
    let items = evaluator::grade(questions, responses);
    let mut profile = scoring::aggregate(&items, &config.taxonomy);
    let metacognition = metacognition::analyze(&items);
    let timing = timing::classify(&items, &config.timing);
    if !items.is_empty() {
        profile.speed = Some(timing.speed_score());
    }
    let coaching = synthesis::synthesize(&profile, &metacognition, &timing, &items, &config.report);

    Analysis {
        items,
        profile,
        metacognition,
        timing,
        coaching,
    }
}

/// The assessment engine.
pub struct AssessmentEngine {
    composer: TestComposer,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
    sink: Option<Arc<dyn ResultSink>>,
    codes: Option<Arc<dyn AccessCodeStore>>,
    config: EngineConfig,
}

impl AssessmentEngine {
    pub fn new(repository: Arc<dyn QuestionRepository>, config: EngineConfig) -> Self {
        Self {
            composer: TestComposer::new(repository, config.composer.clone()),
            narrator: None,
            sink: None,
            codes: None,
            config,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Require and redeem a one-time access code when starting a session.
    pub fn with_code_store(mut self, codes: Arc<dyn AccessCodeStore>) -> Self {
        self.codes = Some(codes);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate the taker's access code (if a store is configured), compose
    /// a test, and redeem the code.
    ///
    /// The code is only redeemed once a non-empty session exists. An empty
    /// session is returned as-is for the caller to report.
    pub async fn start_session(
        &self,
        taker: TestTakerInfo,
        structure: &TestStructure,
    ) -> Result<TestSession, AssessmentError> {
        let code = match &self.codes {
            Some(store) => {
                let code = taker
                    .access_code
                    .clone()
                    .ok_or(AssessmentError::AccessCodeRequired)?;
                let status = store
                    .status(&code)
                    .await
                    .map_err(|e| AssessmentError::CodeStore(format!("{e:#}")))?;
                if !status.exists {
                    return Err(AssessmentError::UnknownAccessCode(code));
                }
                if status.used {
                    return Err(AssessmentError::AccessCodeUsed(code));
                }
                Some((Arc::clone(store), code))
            }
            None => None,
        };

        let questions = self.composer.compose(taker.age, structure).await?;

        if let Some((store, code)) = code {
            if !questions.is_empty() {
                // Check-and-set; a concurrent redemption of the same code loses here.
                let redemption = store
                    .redeem(&code, &taker.name)
                    .await
                    .map_err(|e| AssessmentError::CodeStore(format!("{e:#}")))?;
                match redemption {
                    Redemption::Redeemed => {
                        tracing::info!("access code {code} redeemed by '{}'", taker.name)
                    }
                    Redemption::AlreadyUsed => return Err(AssessmentError::AccessCodeUsed(code)),
                    Redemption::Unknown => return Err(AssessmentError::UnknownAccessCode(code)),
                }
            }
        }

        Ok(TestSession {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            age_band: AgeBand::from_age(taker.age),
            taker,
            questions,
        })
    }

    /// The synchronous pipeline with this engine's policies.
    pub fn analyze(&self, questions: &[SessionQuestion], responses: &[Response]) -> Analysis {
        analyze(questions, responses, &self.config)
    }

    /// Analyze a submission, narrate it, and record the export row.
    ///
    /// Never fails: narrator problems fall back to the templated narrative
    /// and sink failures are logged.
    pub async fn submit(
        &self,
        questions: &[SessionQuestion],
        responses: &[Response],
        taker: &TestTakerInfo,
    ) -> SubmissionOutcome {
        let analysis = self.analyze(questions, responses);
        tracing::info!(
            "submission from '{}': {}/{} correct",
            taker.name,
            analysis.profile.total_correct,
            analysis.profile.total_questions
        );

        let (comment, source) = match self.narrate(&analysis.coaching.summary).await {
            Ok((text, source)) => match &analysis.coaching.priority_note {
                Some(note) if !mentions_priority(&text) => {
                    tracing::debug!("generated narrative omitted the confident-error callout");
                    (format!("{text}\n\n{note}"), source)
                }
                _ => (text, source),
            },
            Err(reason) => {
                if self.narrator.is_some() {
                    tracing::warn!("using templated narrative: {reason}");
                }
                (
                    analysis.coaching.narrative.clone(),
                    NarrativeSource::Templated { reason },
                )
            }
        };
        let outcome = analysis.into_outcome(comment, source);

        if let Some(sink) = &self.sink {
            let row = ExportRow::new(taker, &outcome, Utc::now());
            if let Err(e) = sink.record(&row).await {
                tracing::error!("failed to record result for '{}': {e:#}", taker.name);
            }
        }

        outcome
    }

    /// Ask the narrator for prose. `Err` carries the fallback reason.
    async fn narrate(
        &self,
        summary: &NarrativeSummary,
    ) -> Result<(String, NarrativeSource), String> {
        let Some(narrator) = &self.narrator else {
            return Err("no narrator configured".into());
        };
        let settings = &self.config.narrative;
        let request = NarrativeRequest {
            model: settings.model.clone(),
            prompt: summary.to_prompt(),
            system_prompt: Some(
                settings
                    .system_prompt_override
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        };

        let start = Instant::now();
        let mut last_reason = String::new();
        for attempt in 0..=settings.max_retries {
            if attempt > 0 {
                tokio::time::sleep(settings.retry_delay).await;
            }
            match tokio::time::timeout(settings.timeout, narrator.generate(&request)).await {
                Ok(Ok(response)) => {
                    let text = clean_narrative(&response.content);
                    if text.is_empty() {
                        return Err(format!("{} returned an empty narrative", narrator.name()));
                    }
                    tracing::debug!(
                        "narrative from {} in {}ms",
                        narrator.name(),
                        start.elapsed().as_millis()
                    );
                    return Ok((
                        text,
                        NarrativeSource::Generated {
                            provider: narrator.name().to_string(),
                            model: response.model,
                        },
                    ));
                }
                Ok(Err(e)) => {
                    last_reason = format!("{} failed: {e:#}", narrator.name());
                    if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                        if provider_err.is_permanent() {
                            return Err(last_reason);
                        }
                        if let Some(ms) = provider_err.retry_after_ms() {
                            if attempt < settings.max_retries {
                                tokio::time::sleep(Duration::from_millis(ms)).await;
                            }
                        }
                    }
                }
                Err(_) => {
                    last_reason = format!(
                        "{} timed out after {}s",
                        narrator.name(),
                        settings.timeout.as_secs()
                    );
                }
            }
            tracing::warn!("narrative attempt {} failed: {last_reason}", attempt + 1);
        }
        Err(last_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::InMemoryCodeStore;
    use crate::model::{Confidence, Question, QuestionKind};
    use crate::repository::InMemoryRepository;
    use crate::traits::{ModelInfo, NarrativeResponse, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn question(id: &str, skill: &str) -> Question {
        Question {
            id: id.into(),
            age_band: AgeBand::Intermediate,
            category: None,
            skill: skill.into(),
            genre: None,
            difficulty: Default::default(),
            expected_time_secs: 60,
            title: String::new(),
            passage: None,
            prompt: "Put the sentences in order.".into(),
            kind: QuestionKind::Ordering {
                answer: "B-A-C".into(),
            },
        }
    }

    fn repository() -> Arc<InMemoryRepository> {
        Arc::new(InMemoryRepository::new(vec![
            question("l1", "logic"),
            question("l2", "logic"),
            question("i1", "inference"),
        ]))
    }

    fn taker(code: Option<&str>) -> TestTakerInfo {
        TestTakerInfo {
            name: "Minji".into(),
            age: 15,
            access_code: code.map(String::from),
        }
    }

    fn structure() -> TestStructure {
        [("logic".to_string(), 2), ("inference".to_string(), 1)]
            .into_iter()
            .collect()
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            narrative: NarrativeSettings {
                retry_delay: Duration::ZERO,
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn responses(session: &[SessionQuestion]) -> Vec<Response> {
        session
            .iter()
            .map(|sq| {
                let answer = if sq.question.skill == "logic" { "B-A-C" } else { "A-B-C" };
                Response {
                    question_id: sq.question.id.clone(),
                    answer: Some(answer.to_string()),
                    confidence: Confidence::Confident,
                    elapsed_secs: Some(40.0),
                }
            })
            .collect()
    }

    enum Behaviour {
        Reply(&'static str),
        Fail(fn() -> ProviderError),
        Hang,
    }

    struct ScriptedNarrator {
        behaviour: Behaviour,
        calls: AtomicU32,
    }

    impl ScriptedNarrator {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl NarrativeGenerator for ScriptedNarrator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &NarrativeRequest) -> anyhow::Result<NarrativeResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Reply(text) => Ok(NarrativeResponse {
                    content: text.to_string(),
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: 1,
                }),
                Behaviour::Fail(make) => Err(make().into()),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        rows: Mutex<Vec<ExportRow>>,
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn record(&self, row: &ExportRow) -> anyhow::Result<()> {
            self.rows.lock().unwrap().push(row.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl ResultSink for BrokenSink {
        async fn record(&self, _: &ExportRow) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn session_without_code_store() {
        let engine = AssessmentEngine::new(repository(), fast_config());
        let session = engine.start_session(taker(None), &structure()).await.unwrap();
        assert_eq!(session.questions.len(), 3);
        assert_eq!(session.age_band, AgeBand::Intermediate);
    }

    #[tokio::test]
    async fn access_code_is_required_and_single_use() {
        let store = Arc::new(InMemoryCodeStore::new());
        assert!(store.reserve("ABCD2345").await.unwrap());
        let engine =
            AssessmentEngine::new(repository(), fast_config()).with_code_store(store.clone());

        let missing = engine.start_session(taker(None), &structure()).await;
        assert!(matches!(missing, Err(AssessmentError::AccessCodeRequired)));

        let unknown = engine
            .start_session(taker(Some("ZZZZ9999")), &structure())
            .await;
        assert!(matches!(unknown, Err(AssessmentError::UnknownAccessCode(_))));

        engine
            .start_session(taker(Some("ABCD2345")), &structure())
            .await
            .unwrap();
        let again = engine
            .start_session(taker(Some("ABCD2345")), &structure())
            .await;
        assert!(matches!(again, Err(AssessmentError::AccessCodeUsed(_))));
    }

    #[tokio::test]
    async fn empty_session_does_not_burn_the_code() {
        let store = Arc::new(InMemoryCodeStore::new());
        store.reserve("ABCD2345").await.unwrap();
        let engine = AssessmentEngine::new(Arc::new(InMemoryRepository::default()), fast_config())
            .with_code_store(store.clone());

        let session = engine
            .start_session(taker(Some("ABCD2345")), &structure())
            .await
            .unwrap();
        assert!(session.is_empty());
        assert!(!store.status("ABCD2345").await.unwrap().used);
    }

    #[tokio::test]
    async fn submit_without_narrator_uses_template() {
        let sink = Arc::new(RecordingSink::default());
        let engine = AssessmentEngine::new(repository(), fast_config()).with_sink(sink.clone());
        let session = engine.start_session(taker(None), &structure()).await.unwrap();

        let outcome = engine
            .submit(&session.questions, &responses(&session.questions), &session.taker)
            .await;

        assert_eq!(outcome.analysis.skill("logic").unwrap().percent, 100);
        assert_eq!(outcome.analysis.skill("inference").unwrap().percent, 0);
        assert!(outcome.analysis.speed.is_some());
        assert_eq!(outcome.overall_comment, outcome.coaching.narrative);
        assert_eq!(outcome.recommendations[0].skill, "inference");
        assert!(matches!(
            outcome.narrative_source,
            NarrativeSource::Templated { .. }
        ));

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Minji");
        assert!(!rows[0].narrative.contains('\n'));
    }

    #[tokio::test]
    async fn generated_narrative_is_cleaned() {
        let narrator = ScriptedNarrator::new(Behaviour::Reply(
            "```\n# Report\nGreat work on logic.\n\nNext, practise inference.\n```",
        ));
        let engine = AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator);
        let session = engine.start_session(taker(None), &structure()).await.unwrap();

        let outcome = engine
            .submit(&session.questions, &responses(&session.questions), &session.taker)
            .await;
        assert!(outcome
            .overall_comment
            .starts_with("Report Great work on logic.\n\nNext, practise inference."));
        assert!(outcome.narrative_source.is_generated());
    }

    #[tokio::test]
    async fn generated_narrative_keeps_confident_error_callout() {
        let narrator = ScriptedNarrator::new(Behaviour::Reply("Great work on logic."));
        let engine = AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator);
        let session = engine.start_session(taker(None), &structure()).await.unwrap();

        // The inference answer is wrong and marked confident.
        let outcome = engine
            .submit(&session.questions, &responses(&session.questions), &session.taker)
            .await;
        assert_eq!(outcome.metacognition.confident_error.count, 1);
        assert_eq!(
            outcome.overall_comment,
            format!(
                "Great work on logic.\n\n{}",
                outcome.coaching.priority_note.as_deref().unwrap()
            )
        );
    }

    #[tokio::test]
    async fn generated_callout_is_not_duplicated() {
        let reply = "Your top priority is the inference answer you were confident about but got wrong.";
        let narrator = ScriptedNarrator::new(Behaviour::Reply(reply));
        let engine = AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator);
        let session = engine.start_session(taker(None), &structure()).await.unwrap();

        let outcome = engine
            .submit(&session.questions, &responses(&session.questions), &session.taker)
            .await;
        assert_eq!(outcome.overall_comment, reply);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let narrator = ScriptedNarrator::new(Behaviour::Fail(|| ProviderError::NetworkError("reset".into())));
        let engine =
            AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator.clone());

        let outcome = engine.submit(&[], &[], &taker(None)).await;
        assert_eq!(narrator.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            outcome.narrative_source,
            NarrativeSource::Templated { ref reason } if reason.contains("reset")
        ));
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let narrator = ScriptedNarrator::new(Behaviour::Fail(|| {
            ProviderError::AuthenticationFailed("bad key".into())
        }));
        let engine =
            AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator.clone());

        engine.submit(&[], &[], &taker(None)).await;
        assert_eq!(narrator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hung_narrator_times_out_to_template() {
        let narrator = ScriptedNarrator::new(Behaviour::Hang);
        let engine = AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator);
        let session = engine.start_session(taker(None), &structure()).await.unwrap();

        let outcome = engine
            .submit(&session.questions, &responses(&session.questions), &session.taker)
            .await;
        assert_eq!(outcome.overall_comment, outcome.coaching.narrative);
        assert!(matches!(
            outcome.narrative_source,
            NarrativeSource::Templated { ref reason } if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let narrator = ScriptedNarrator::new(Behaviour::Reply("```\n```"));
        let engine = AssessmentEngine::new(repository(), fast_config()).with_narrator(narrator);
        let outcome = engine.submit(&[], &[], &taker(None)).await;
        assert!(!outcome.narrative_source.is_generated());
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_submission() {
        let engine = AssessmentEngine::new(repository(), fast_config()).with_sink(Arc::new(BrokenSink));
        let outcome = engine.submit(&[], &[], &taker(None)).await;
        assert_eq!(outcome.analysis.total_questions, 0);
        assert_eq!(outcome.analysis.speed, None);
    }

    #[test]
    fn analyze_ignores_unknown_responses() {
        let session = vec![SessionQuestion {
            number: 1,
            question: question("l1", "logic"),
        }];
        let stray = Response {
            question_id: "nope".into(),
            answer: Some("B-A-C".into()),
            confidence: Confidence::Unrecognized,
            elapsed_secs: None,
        };
        let analysis = analyze(&session, &[stray], &EngineConfig::default());
        assert_eq!(analysis.items.len(), 1);
        assert!(!analysis.items[0].correct);
        assert_eq!(analysis.metacognition.total(), 0);
    }
}
