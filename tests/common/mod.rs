//! Substitutable service implementations for pipeline tests.
//!
//! Image bytes double as instructions to the vision mock: `fail:...` makes the
//! call fail, `slow:<ms>:...` sleeps first, `empty` is handled by the caller
//! passing a zero-length blob.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use damage_intake::evidence::{RawImage, Submission, decode_payload};
use damage_intake::llm::{LlmError, LlmResult};
use damage_intake::pipeline::{AssessmentPipeline, PipelineConfig};
use damage_intake::reconcile::{DIVERGENCE_RESPONSE, MATCH_RESPONSE, TextReconciler};
use damage_intake::vision::VisionInterpreter;
use damage_intake::weather::{WeatherError, WeatherLookup, WeatherObservation, WeatherResult};

/// Call counters shared with the boxed mocks.
#[derive(Clone, Default)]
pub struct Calls {
    pub vision: Arc<AtomicUsize>,
    pub comparison: Arc<AtomicUsize>,
    pub corroboration: Arc<AtomicUsize>,
    pub weather: Arc<AtomicUsize>,
    pub corroboration_prompts: Arc<Mutex<Vec<String>>>,
}

impl Calls {
    pub fn vision(&self) -> usize {
        self.vision.load(Ordering::SeqCst)
    }
    pub fn comparison(&self) -> usize {
        self.comparison.load(Ordering::SeqCst)
    }
    pub fn corroboration(&self) -> usize {
        self.corroboration.load(Ordering::SeqCst)
    }
    pub fn weather(&self) -> usize {
        self.weather.load(Ordering::SeqCst)
    }
    pub fn total(&self) -> usize {
        self.vision() + self.comparison() + self.corroboration() + self.weather()
    }
}

pub struct MockVision {
    calls: Calls,
}

impl VisionInterpreter for MockVision {
    fn describe(&self, _prompt: &str, image_payload: &str) -> LlmResult<String> {
        self.calls.vision.fetch_add(1, Ordering::SeqCst);
        let bytes = decode_payload(image_payload).map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        if let Some(rest) = text.strip_prefix("slow:") {
            let (ms, _) = rest.split_once(':').unwrap_or((rest, ""));
            std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
        }
        if text.starts_with("fail") {
            return Err(LlmError::Timeout { timeout_secs: 120 });
        }
        Ok(format!("Interpretation of {text}"))
    }
}

/// How the text mock answers comparison prompts.
#[derive(Clone)]
pub enum ComparisonReply {
    /// Match literal, unless the description mentions "kitchen", then divergence.
    Literal,
    /// Always this text.
    Fixed(String),
    Fail,
}

pub struct MockText {
    calls: Calls,
    reply: ComparisonReply,
    fail_corroboration: bool,
}

impl TextReconciler for MockText {
    fn complete(&self, prompt: &str) -> LlmResult<String> {
        if prompt.contains("Weather Report for") {
            self.calls.corroboration.fetch_add(1, Ordering::SeqCst);
            self.calls
                .corroboration_prompts
                .lock()
                .unwrap()
                .push(prompt.to_string());
            if self.fail_corroboration {
                return Err(LlmError::Unavailable {
                    url: "http://localhost:11434".into(),
                });
            }
            return Ok("Strong winds on the day plausibly caused the damage.".into());
        }

        self.calls.comparison.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            ComparisonReply::Literal => {
                let description = prompt
                    .split("AI generated description of Image:")
                    .nth(1)
                    .unwrap_or("");
                if description.contains("kitchen") {
                    Ok(DIVERGENCE_RESPONSE.into())
                } else {
                    Ok(format!("{MATCH_RESPONSE}\n"))
                }
            }
            ComparisonReply::Fixed(text) => Ok(text.clone()),
            ComparisonReply::Fail => Err(LlmError::RequestFailed {
                message: "connection reset".into(),
            }),
        }
    }
}

#[derive(Clone)]
pub enum WeatherReply {
    Observed,
    Absent,
    Fail,
}

pub struct MockWeather {
    calls: Calls,
    reply: WeatherReply,
}

impl WeatherLookup for MockWeather {
    fn fetch_observation(
        &self,
        location_code: &str,
        date: NaiveDate,
    ) -> WeatherResult<Option<WeatherObservation>> {
        self.calls.weather.fetch_add(1, Ordering::SeqCst);
        assert_eq!(location_code, "10001");
        assert_eq!(date, incident_date());
        match self.reply {
            WeatherReply::Observed => Ok(Some(storm())),
            WeatherReply::Absent => Ok(None),
            WeatherReply::Fail => Err(WeatherError::HttpStatus {
                status: 401,
                message: "API key is invalid.".into(),
            }),
        }
    }
}

pub struct Harness {
    pub comparison: ComparisonReply,
    pub weather: WeatherReply,
    pub fail_corroboration: bool,
    pub config: PipelineConfig,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            comparison: ComparisonReply::Literal,
            weather: WeatherReply::Observed,
            fail_corroboration: false,
            config: PipelineConfig::default(),
        }
    }
}

impl Harness {
    pub fn build(self) -> (AssessmentPipeline, Calls) {
        let calls = Calls::default();
        let pipeline = AssessmentPipeline::new(
            Box::new(MockVision {
                calls: calls.clone(),
            }),
            Box::new(MockText {
                calls: calls.clone(),
                reply: self.comparison,
                fail_corroboration: self.fail_corroboration,
            }),
            Box::new(MockWeather {
                calls: calls.clone(),
                reply: self.weather,
            }),
            self.config,
        );
        (pipeline, calls)
    }
}

pub fn incident_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

pub fn storm() -> WeatherObservation {
    WeatherObservation {
        location_name: "New York".into(),
        region_name: "New York".into(),
        condition_text: "Moderate rain".into(),
        max_wind_mph: Some(42.1),
        total_precip_in: Some(0.9),
        max_temp_f: Some(44.0),
        min_temp_f: Some(33.1),
        avg_humidity_pct: Some(88.0),
    }
}

/// A submission whose image bytes are the given instruction strings.
pub fn submission(images: &[&str]) -> Submission {
    Submission {
        images: images
            .iter()
            .enumerate()
            .map(|(i, body)| RawImage::new(format!("photo{}.jpg", i + 1), body.as_bytes().to_vec()))
            .collect(),
        occurred_on: incident_date(),
        location_code: "10001".into(),
        narrative: "Tree fell on roof during storm".into(),
    }
}
