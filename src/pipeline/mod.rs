//! Assessment pipeline: normalise, interpret, reconcile, corroborate, assemble.
//!
//! ```text
//! Submission ──normalize──► images ──par_iter──► interpret ─► reconcile ─┐
//!                   │                                                    ├─► corroborate ─► Report
//!                   └──────────── weather lookup (rayon::join) ──────────┘
//! ```
//!
//! Validation failures stop everything before any external call. Every later
//! failure is confined to its unit (one image, or the weather section) and
//! becomes inline report text.

use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::IntakeConfig;
use crate::error::{IntakeResult, PipelineError};
use crate::evidence::{EvidenceImage, Incident, Submission, normalize};
use crate::llm::{OllamaClient, RetryPolicy};
use crate::reconcile::{IndeterminatePolicy, NarrativeReconciler, TextReconciler};
use crate::report::{
    CorroborationOutcome, ImageOutcome, ImageSection, ReconciliationOutcome, Report,
    WeatherSection,
};
use crate::vision::{INTERPRETATION_PROMPT, PhotoInterpreter, VisionInterpreter};
use crate::weather::{
    CorroborationScope, WeatherApiClient, WeatherLookup, WeatherObservation, WeatherResult,
    corroborate,
};

/// Pipeline tuning, the `[pipeline]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for per-image processing. Zero is treated as one.
    pub workers: usize,
    /// Attempts per vision call. One means no retry.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub retry_backoff_ms: u64,
    pub indeterminate_verdict: IndeterminatePolicy,
    pub corroboration_scope: CorroborationScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 1,
            retry_backoff_ms: 500,
            indeterminate_verdict: IndeterminatePolicy::default(),
            corroboration_scope: CorroborationScope::default(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Runs submissions through the collaborator services.
pub struct AssessmentPipeline {
    vision: Box<dyn VisionInterpreter>,
    text: Box<dyn TextReconciler>,
    weather: Box<dyn WeatherLookup>,
    config: PipelineConfig,
    prompt: String,
}

impl AssessmentPipeline {
    pub fn new(
        vision: Box<dyn VisionInterpreter>,
        text: Box<dyn TextReconciler>,
        weather: Box<dyn WeatherLookup>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            vision,
            text,
            weather,
            config,
            prompt: INTERPRETATION_PROMPT.to_string(),
        }
    }

    /// Wire up the Ollama and WeatherAPI clients from configuration.
    pub fn from_config(config: &IntakeConfig) -> Self {
        let ollama = OllamaClient::new(config.ollama.clone());
        Self::new(
            Box::new(ollama.clone()),
            Box::new(ollama),
            Box::new(WeatherApiClient::new(config.weather.clone())),
            config.pipeline.clone(),
        )
    }

    /// Replace the vision instruction.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one submission into a report.
    ///
    /// Only validation and worker-pool startup fail the call; everything else
    /// is reported inside the returned [`Report`].
    pub fn run(&self, submission: Submission) -> IntakeResult<Report> {
        let normalized = normalize(submission)?;
        let incident = normalized.incident;
        let images = normalized.images;

        tracing::info!(
            images = images.len(),
            location = %incident.location_code,
            date = %incident.occurred_on,
            "starting assessment"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .thread_name(|i| format!("intake-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPool {
                message: e.to_string(),
            })?;

        let (sections, lookup) = pool.install(|| {
            rayon::join(
                || {
                    images
                        .par_iter()
                        .map(|image| self.process_image(&incident, image))
                        .collect::<Vec<_>>()
                },
                || self.lookup_weather(&incident),
            )
        });

        let weather = self.weather_section(&incident, lookup, &sections);
        let report = Report::assemble(incident, sections, weather);

        tracing::info!(
            interpreted = report.interpretations().len(),
            follow_ups = report.follow_up_count(),
            weather = report.observation().is_some(),
            "assessment complete"
        );
        Ok(report)
    }

    fn process_image(&self, incident: &Incident, image: &EvidenceImage) -> ImageSection {
        let interpreter = PhotoInterpreter::new(self.vision.as_ref())
            .with_prompt(&self.prompt)
            .with_retry(self.config.retry_policy());

        let outcome = match interpreter.interpret(image) {
            Ok(interpretation) => {
                let reconciler =
                    NarrativeReconciler::new(self.text.as_ref(), self.config.indeterminate_verdict);
                let reconciliation = match reconciler.reconcile(&incident.narrative, &interpretation)
                {
                    Ok(verdict) => ReconciliationOutcome::Verdict(verdict),
                    Err(e) => {
                        tracing::warn!(error = %e, image = image.index + 1, "comparison failed");
                        ReconciliationOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                ImageOutcome::Interpreted {
                    interpretation,
                    reconciliation,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, image = image.index + 1, "interpretation failed");
                ImageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        ImageSection {
            index: image.index,
            name: image.name.clone(),
            outcome,
        }
    }

    fn lookup_weather(&self, incident: &Incident) -> WeatherResult<Option<WeatherObservation>> {
        self.weather
            .fetch_observation(&incident.location_code, incident.occurred_on)
    }

    fn weather_section(
        &self,
        incident: &Incident,
        lookup: WeatherResult<Option<WeatherObservation>>,
        sections: &[ImageSection],
    ) -> WeatherSection {
        let observation = match lookup {
            Ok(Some(observation)) => observation,
            Ok(None) => {
                tracing::info!(location = %incident.location_code, "no weather data for date");
                return WeatherSection::Unavailable;
            }
            Err(e) => {
                tracing::warn!(error = %e, "weather lookup failed");
                return WeatherSection::Failed {
                    error: e.to_string(),
                };
            }
        };

        let available: Vec<_> = sections.iter().filter_map(|s| s.interpretation()).collect();
        let chosen = self.config.corroboration_scope.select(&available);

        let corroboration = if chosen.is_empty() {
            CorroborationOutcome::Skipped {
                reason: "no photo interpretation was available to compare against the weather"
                    .into(),
            }
        } else {
            match corroborate(
                self.text.as_ref(),
                &observation,
                incident.occurred_on,
                &chosen,
            ) {
                Ok(judgment) => CorroborationOutcome::Judgment(judgment),
                Err(e) => {
                    tracing::warn!(error = %e, "weather corroboration failed");
                    CorroborationOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };

        WeatherSection::Observed {
            observation,
            corroboration,
        }
    }
}

impl std::fmt::Debug for AssessmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessmentPipeline")
            .field("config", &self.config)
            .finish()
    }
}
