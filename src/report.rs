//! Report assembly: per-image sections plus the weather section, in upload order.
//!
//! Failures upstream arrive here as inline messages, so a report can always be
//! rendered. [`Report::render_text`] produces the human-readable form and
//! [`Report::to_json`] the machine-readable one.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::evidence::Incident;
use crate::reconcile::{ReconciliationVerdict, Verdict};
use crate::vision::PhotoInterpretation;
use crate::weather::{WeatherCorroborationJudgment, WeatherObservation};

/// Outcome of comparing one interpretation with the narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Verdict(ReconciliationVerdict),
    Failed { error: String },
}

/// Outcome of processing one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
    Interpreted {
        interpretation: PhotoInterpretation,
        reconciliation: ReconciliationOutcome,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSection {
    /// Zero-based upload position.
    pub index: usize,
    pub name: String,
    pub outcome: ImageOutcome,
}

impl ImageSection {
    pub fn interpretation(&self) -> Option<&PhotoInterpretation> {
        match &self.outcome {
            ImageOutcome::Interpreted { interpretation, .. } => Some(interpretation),
            ImageOutcome::Failed { .. } => None,
        }
    }

    pub fn verdict(&self) -> Option<&ReconciliationVerdict> {
        match &self.outcome {
            ImageOutcome::Interpreted {
                reconciliation: ReconciliationOutcome::Verdict(v),
                ..
            } => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorroborationOutcome {
    Judgment(WeatherCorroborationJudgment),
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WeatherSection {
    Observed {
        observation: WeatherObservation,
        corroboration: CorroborationOutcome,
    },
    /// The provider answered but had no data for the day.
    Unavailable,
    Failed {
        error: String,
    },
}

/// The assembled claim report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub incident: Incident,
    pub images: Vec<ImageSection>,
    pub weather: WeatherSection,
}

impl Report {
    /// Combine sections into a report ordered by upload position.
    pub fn assemble(
        incident: Incident,
        mut images: Vec<ImageSection>,
        weather: WeatherSection,
    ) -> Self {
        images.sort_by_key(|s| s.index);
        Self {
            incident,
            images,
            weather,
        }
    }

    /// Interpretations that succeeded, in upload order.
    pub fn interpretations(&self) -> Vec<&PhotoInterpretation> {
        self.images.iter().filter_map(|s| s.interpretation()).collect()
    }

    /// Verdicts that were reached, in upload order.
    pub fn verdicts(&self) -> Vec<&ReconciliationVerdict> {
        self.images.iter().filter_map(|s| s.verdict()).collect()
    }

    /// Number of images for which follow-up was suggested.
    pub fn follow_up_count(&self) -> usize {
        self.verdicts()
            .iter()
            .filter(|v| v.verdict == Verdict::FollowUpSuggested)
            .count()
    }

    pub fn observation(&self) -> Option<&WeatherObservation> {
        match &self.weather {
            WeatherSection::Observed { observation, .. } => Some(observation),
            _ => None,
        }
    }

    pub fn judgment(&self) -> Option<&WeatherCorroborationJudgment> {
        match &self.weather {
            WeatherSection::Observed {
                corroboration: CorroborationOutcome::Judgment(j),
                ..
            } => Some(j),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "Home Damage Assessment")?;
        writeln!(out, "======================")?;
        writeln!(out, "Date of occurrence: {}", self.incident.occurred_on)?;
        writeln!(out, "Location: {}", self.incident.location_code)?;
        writeln!(out, "Policyholder description: {}", self.incident.narrative)?;
        writeln!(out)?;

        writeln!(out, "Photo Summaries")?;
        writeln!(out, "---------------")?;
        for section in &self.images {
            writeln!(out, "Image {} ({})", section.index + 1, section.name)?;
            match &section.outcome {
                ImageOutcome::Interpreted { interpretation, .. } => {
                    writeln!(out, "Summary: {}", interpretation.description.trim())?;
                    writeln!(out, "Repair assessment: {}", interpretation.repair_likely)?;
                }
                ImageOutcome::Failed { error } => {
                    writeln!(out, "Summary unavailable: {error}")?;
                }
            }
            writeln!(out)?;
        }

        writeln!(
            out,
            "Comparison of User Description of Image and AI Image Interpretation"
        )?;
        writeln!(
            out,
            "--------------------------------------------------------------------"
        )?;
        for section in &self.images {
            write!(out, "Image {} Comparison: ", section.index + 1)?;
            match &section.outcome {
                ImageOutcome::Interpreted {
                    reconciliation: ReconciliationOutcome::Verdict(v),
                    ..
                } => {
                    if v.resolved_by_fallback {
                        writeln!(
                            out,
                            "{} (model reply was inconclusive: \"{}\")",
                            v.verdict,
                            v.response.trim()
                        )?;
                    } else {
                        writeln!(out, "{}", v.verdict)?;
                    }
                }
                ImageOutcome::Interpreted {
                    reconciliation: ReconciliationOutcome::Failed { error },
                    ..
                } => writeln!(out, "Comparison unavailable: {error}")?,
                ImageOutcome::Failed { .. } => {
                    writeln!(out, "Not compared, the image could not be interpreted.")?
                }
            }
        }
        writeln!(out)?;

        match &self.weather {
            WeatherSection::Observed {
                observation,
                corroboration,
            } => {
                let heading = format!(
                    "Weather on the Date of Incident in {}",
                    observation.place()
                );
                writeln!(out, "{heading}")?;
                writeln!(out, "{}", "-".repeat(heading.chars().count()))?;
                for line in observation.summary_lines() {
                    writeln!(out, "{line}")?;
                }
                writeln!(out)?;
                match corroboration {
                    CorroborationOutcome::Judgment(j) => {
                        writeln!(out, "{}", j.narrative_text.trim())?
                    }
                    CorroborationOutcome::Skipped { reason } => {
                        writeln!(out, "Weather impact not assessed: {reason}")?
                    }
                    CorroborationOutcome::Failed { error } => {
                        writeln!(out, "Weather impact assessment failed: {error}")?
                    }
                }
            }
            WeatherSection::Unavailable => {
                writeln!(out, "Weather on the Date of Incident")?;
                writeln!(out, "-------------------------------")?;
                writeln!(out, "Weather data not available.")?;
            }
            WeatherSection::Failed { error } => {
                writeln!(out, "Weather on the Date of Incident")?;
                writeln!(out, "-------------------------------")?;
                writeln!(out, "Error fetching weather data: {error}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_text())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::reconcile::MATCH_RESPONSE;
    use crate::vision::RepairLikelihood;

    fn incident() -> Incident {
        Incident {
            occurred_on: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            location_code: "10001".into(),
            narrative: "Tree fell on roof during storm".into(),
        }
    }

    fn interpreted(index: usize, verdict: Verdict) -> ImageSection {
        ImageSection {
            index,
            name: format!("img{index}.jpg"),
            outcome: ImageOutcome::Interpreted {
                interpretation: PhotoInterpretation {
                    image_index: index,
                    image_name: format!("img{index}.jpg"),
                    description: format!("Description of image {index}."),
                    repair_likely: RepairLikelihood::Likely,
                },
                reconciliation: ReconciliationOutcome::Verdict(ReconciliationVerdict {
                    image_index: index,
                    verdict,
                    response: verdict.to_string(),
                    resolved_by_fallback: false,
                }),
            },
        }
    }

    fn failed(index: usize) -> ImageSection {
        ImageSection {
            index,
            name: format!("img{index}.jpg"),
            outcome: ImageOutcome::Failed {
                error: "Ollama request timed out after 120s".into(),
            },
        }
    }

    #[test]
    fn assemble_orders_by_index() {
        let report = Report::assemble(
            incident(),
            vec![interpreted(2, Verdict::Consistent), interpreted(0, Verdict::Consistent), failed(1)],
            WeatherSection::Unavailable,
        );
        let order: Vec<usize> = report.images.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(report.interpretations().len(), 2);
    }

    #[test]
    fn renders_failure_placeholder_and_missing_weather() {
        let report = Report::assemble(
            incident(),
            vec![interpreted(0, Verdict::Consistent), failed(1)],
            WeatherSection::Unavailable,
        );
        let text = report.render_text();
        assert!(text.contains("Image 1 (img0.jpg)"));
        assert!(text.contains("Summary: Description of image 0."));
        assert!(text.contains("Image 2 (img1.jpg)"));
        assert!(text.contains("Summary unavailable: Ollama request timed out"));
        assert!(text.contains(&format!("Image 1 Comparison: {MATCH_RESPONSE}")));
        assert!(text.contains("Image 2 Comparison: Not compared"));
        assert!(text.contains("Weather data not available."));
        assert_eq!(report.follow_up_count(), 0);
    }

    #[test]
    fn renders_weather_failure_inline() {
        let report = Report::assemble(
            incident(),
            vec![interpreted(0, Verdict::FollowUpSuggested)],
            WeatherSection::Failed {
                error: "weather service returned HTTP 401".into(),
            },
        );
        let text = report.to_string();
        assert!(text.contains("Error fetching weather data: weather service returned HTTP 401"));
        assert_eq!(report.follow_up_count(), 1);
        assert!(report.observation().is_none());
    }

    #[test]
    fn renders_observed_weather_with_judgment() {
        let report = Report::assemble(
            incident(),
            vec![interpreted(0, Verdict::Consistent)],
            WeatherSection::Observed {
                observation: WeatherObservation {
                    location_name: "New York".into(),
                    region_name: "New York".into(),
                    condition_text: "Heavy rain".into(),
                    max_wind_mph: Some(40.0),
                    total_precip_in: None,
                    max_temp_f: Some(41.0),
                    min_temp_f: Some(30.0),
                    avg_humidity_pct: Some(90.0),
                },
                corroboration: CorroborationOutcome::Judgment(WeatherCorroborationJudgment {
                    narrative_text: "Strong winds plausibly felled the tree.".into(),
                    based_on: vec![0],
                }),
            },
        );
        let text = report.render_text();
        assert!(text.contains("Weather on the Date of Incident in New York, New York"));
        assert!(text.contains("Max Wind: 40 mph"));
        assert!(text.contains("Total Precipitation: N/A inches"));
        assert!(text.contains("Strong winds plausibly felled the tree."));
        assert!(report.judgment().is_some());
    }

    #[test]
    fn json_export_tags_outcomes() {
        let report = Report::assemble(
            incident(),
            vec![interpreted(0, Verdict::Consistent), failed(1)],
            WeatherSection::Unavailable,
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["incident"]["occurred_on"], "2024-01-15");
        assert_eq!(json["images"][0]["outcome"]["status"], "interpreted");
        assert_eq!(
            json["images"][0]["outcome"]["reconciliation"]["verdict"],
            "consistent"
        );
        assert_eq!(json["images"][1]["outcome"]["status"], "failed");
        assert_eq!(json["weather"]["status"], "unavailable");
    }
}
