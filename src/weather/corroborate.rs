//! Ask the text model whether the day's weather plausibly caused the damage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Reading, WeatherError, WeatherObservation, WeatherResult};
use crate::reconcile::TextReconciler;
use crate::vision::PhotoInterpretation;

/// Which photo interpretations feed the corroboration prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorroborationScope {
    /// Only the last successful interpretation in submission order.
    #[default]
    LastInterpretation,
    /// Every successful interpretation, in submission order.
    AllInterpretations,
}

impl CorroborationScope {
    pub fn select<'a>(
        &self,
        interpretations: &[&'a PhotoInterpretation],
    ) -> Vec<&'a PhotoInterpretation> {
        match self {
            Self::LastInterpretation => interpretations.last().copied().into_iter().collect(),
            Self::AllInterpretations => interpretations.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherCorroborationJudgment {
    pub narrative_text: String,
    /// Zero-based indices of the images whose descriptions were considered.
    pub based_on: Vec<usize>,
}

pub fn corroboration_prompt(
    observation: &WeatherObservation,
    date: NaiveDate,
    descriptions: &[&str],
) -> String {
    let image_block = match descriptions {
        [single] => format!("Policyholder Image Description for Insurance claim: {single}\n"),
        many => many
            .iter()
            .enumerate()
            .map(|(i, d)| {
                format!(
                    "Policyholder Image Description {} for Insurance claim: {d}\n",
                    i + 1
                )
            })
            .collect(),
    };

    format!(
        "The following weather report is being used for a homeowners insurance claim. Based on \
the AI generated description of an image shared by the policyholder for the claim and the \
weather report for the day, determine whether the conditions for the day may have impacted the \
incident.\n\
{image_block}\n\
Weather Report for {place} on {date}.\n\
Condition: {condition}\n\
Max Wind: {wind} mph\n\
Total Precipitation: {precip} inches\n\
Max Temp: {max_t}°F\n\
Min Temp: {min_t}°F\n\
Average Humidity: {humidity}%\n",
        place = observation.place(),
        date = date.format("%Y-%m-%d"),
        condition = observation.condition_text,
        wind = Reading(observation.max_wind_mph),
        precip = Reading(observation.total_precip_in),
        max_t = Reading(observation.max_temp_f),
        min_t = Reading(observation.min_temp_f),
        humidity = Reading(observation.avg_humidity_pct),
    )
}

/// Produce a judgment from the given interpretations. The caller chooses them.
pub fn corroborate(
    service: &dyn TextReconciler,
    observation: &WeatherObservation,
    date: NaiveDate,
    interpretations: &[&PhotoInterpretation],
) -> WeatherResult<WeatherCorroborationJudgment> {
    let descriptions: Vec<&str> = interpretations
        .iter()
        .map(|i| i.description.as_str())
        .collect();
    let prompt = corroboration_prompt(observation, date, &descriptions);
    let narrative_text = service
        .complete(&prompt)
        .map_err(|source| WeatherError::Corroboration { source })?;

    Ok(WeatherCorroborationJudgment {
        narrative_text,
        based_on: interpretations.iter().map(|i| i.image_index).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::{LlmError, LlmResult};
    use crate::vision::RepairLikelihood;

    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    impl TextReconciler for Echo {
        fn complete(&self, prompt: &str) -> LlmResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("High winds likely brought the tree down.".into())
        }
    }

    struct Down;

    impl TextReconciler for Down {
        fn complete(&self, _prompt: &str) -> LlmResult<String> {
            Err(LlmError::Timeout { timeout_secs: 1 })
        }
    }

    fn observation() -> WeatherObservation {
        WeatherObservation {
            location_name: "New York".into(),
            region_name: "New York".into(),
            condition_text: "Heavy rain".into(),
            max_wind_mph: Some(38.5),
            total_precip_in: Some(1.25),
            max_temp_f: Some(41.0),
            min_temp_f: None,
            avg_humidity_pct: Some(87.0),
        }
    }

    fn interpretation(index: usize, description: &str) -> PhotoInterpretation {
        PhotoInterpretation {
            image_index: index,
            image_name: format!("img{index}.jpg"),
            description: description.into(),
            repair_likely: RepairLikelihood::Unknown,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn prompt_lists_readings_and_description() {
        let prompt = corroboration_prompt(&observation(), date(), &["Roof torn open."]);
        assert!(prompt.contains("Policyholder Image Description for Insurance claim: Roof torn open."));
        assert!(prompt.contains("Weather Report for New York, New York on 2024-01-15."));
        assert!(prompt.contains("Max Wind: 38.5 mph"));
        assert!(prompt.contains("Min Temp: N/A°F"));
        assert!(prompt.contains("Average Humidity: 87%"));
    }

    #[test]
    fn prompt_numbers_multiple_descriptions() {
        let prompt = corroboration_prompt(&observation(), date(), &["first", "second"]);
        assert!(prompt.contains("Description 1 for Insurance claim: first"));
        assert!(prompt.contains("Description 2 for Insurance claim: second"));
    }

    #[test]
    fn scope_selects_last_or_all() {
        let a = interpretation(0, "a");
        let b = interpretation(2, "b");
        let all = [&a, &b];

        let last = CorroborationScope::LastInterpretation.select(&all);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].image_index, 2);

        let every = CorroborationScope::AllInterpretations.select(&all);
        assert_eq!(every.len(), 2);

        assert!(CorroborationScope::LastInterpretation.select(&[]).is_empty());
    }

    #[test]
    fn corroborate_records_basis() {
        let service = Echo {
            prompts: Mutex::new(Vec::new()),
        };
        let photo = interpretation(1, "Tree on roof.");
        let judgment = corroborate(&service, &observation(), date(), &[&photo]).unwrap();
        assert_eq!(judgment.narrative_text, "High winds likely brought the tree down.");
        assert_eq!(judgment.based_on, vec![1]);
        assert_eq!(service.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn corroborate_failure_is_weather_error() {
        let photo = interpretation(0, "Tree on roof.");
        let err = corroborate(&Down, &observation(), date(), &[&photo]).unwrap_err();
        assert!(matches!(err, WeatherError::Corroboration { .. }));
    }
}
