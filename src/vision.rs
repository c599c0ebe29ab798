//! Photo interpretation via a vision-capable completion service.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evidence::EvidenceImage;
use crate::llm::{ChatMessage, LlmError, LlmResult, OllamaClient, RetryPolicy};

/// Instruction sent with every claim photo.
pub const INTERPRETATION_PROMPT: &str = "The photo shared with you is an image shared by a \
homeowner's insurance policyholder trying to make a claim for damage to their home. Please \
write a description for what is in the image and make a best guess at what likely happened to \
cause the damage. Determine whether or not a contractor would likely be required to fix the \
damage.";

/// Capability: describe an image given an instruction.
pub trait VisionInterpreter: Send + Sync {
    fn describe(&self, prompt: &str, image_payload: &str) -> LlmResult<String>;
}

impl VisionInterpreter for OllamaClient {
    fn describe(&self, prompt: &str, image_payload: &str) -> LlmResult<String> {
        let message = ChatMessage::user(prompt).with_images(vec![image_payload.to_string()]);
        self.chat(&self.config().vision_model, &[message])
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum InterpretationError {
    #[error("image {} (\"{name}\") has no content to interpret", .index + 1)]
    #[diagnostic(
        code(intake::vision::empty_payload),
        help("The uploaded file is empty. Re-upload the photo.")
    )]
    EmptyPayload { index: usize, name: String },

    #[error("could not interpret image {} (\"{name}\"): {source}", .index + 1)]
    #[diagnostic(
        code(intake::vision::service),
        help("The vision model could not be reached or returned an unusable response.")
    )]
    Service {
        index: usize,
        name: String,
        #[source]
        source: LlmError,
    },
}

/// Whether the model judged that professional repair is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairLikelihood {
    Likely,
    Unlikely,
    Unknown,
}

/// Explicit "needs a contractor" judgments; these win over any negation
/// elsewhere in the text ("not a DIY job; a contractor would likely be required").
const LIKELY_PHRASES: &[&str] = &[
    "contractor would likely be required",
    "contractor would likely be needed",
    "contractor is likely required",
    "contractor is likely needed",
    "contractor will likely be",
    "recommend hiring",
];

const UNLIKELY_PHRASES: &[&str] = &[
    "contractor would not",
    "contractor will not",
    "contractor is not",
    "contractor may not",
    "not require a contractor",
    "not need a contractor",
    "not be needed",
    "not be required",
    "no contractor",
    "without a contractor",
    "without professional",
    "unlikely to require",
    "unlikely that a contractor",
];

/// Loose fragments that only count when nothing negated them.
const WEAK_LIKELY_PHRASES: &[&str] = &[
    "require a contractor",
    "requires a contractor",
    "need a contractor",
    "needs a contractor",
    "professional repair",
    "professional contractor",
];

/// Lowercase and spell out negated contractions so "doesn't" and
/// "won't" read as "does not" and "will not".
fn expand_contractions(description: &str) -> String {
    description
        .to_lowercase()
        .replace('\u{2019}', "'")
        .replace("won't", "will not")
        .replace("can't", "can not")
        .replace("cannot", "can not")
        .replace("n't", " not")
}

impl RepairLikelihood {
    /// Read the judgment out of the description text.
    ///
    /// Explicit positive judgments are checked first, then negations, then
    /// the loose positive fragments that a negation would otherwise contain.
    pub fn from_description(description: &str) -> Self {
        let text = expand_contractions(description);
        let mentions = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));
        if mentions(LIKELY_PHRASES) {
            Self::Likely
        } else if mentions(UNLIKELY_PHRASES) {
            Self::Unlikely
        } else if mentions(WEAK_LIKELY_PHRASES) {
            Self::Likely
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for RepairLikelihood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Likely => write!(f, "contractor likely required"),
            Self::Unlikely => write!(f, "contractor likely not required"),
            Self::Unknown => write!(f, "undetermined"),
        }
    }
}

/// The vision model's reading of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoInterpretation {
    pub image_index: usize,
    pub image_name: String,
    /// Raw response text, unmodified.
    pub description: String,
    pub repair_likely: RepairLikelihood,
}

/// Interprets evidence images one at a time.
pub struct PhotoInterpreter<'a> {
    service: &'a dyn VisionInterpreter,
    prompt: &'a str,
    retry: RetryPolicy,
}

impl<'a> PhotoInterpreter<'a> {
    pub fn new(service: &'a dyn VisionInterpreter) -> Self {
        Self {
            service,
            prompt: INTERPRETATION_PROMPT,
            retry: RetryPolicy::single(),
        }
    }

    pub fn with_prompt(mut self, prompt: &'a str) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn interpret(
        &self,
        image: &EvidenceImage,
    ) -> Result<PhotoInterpretation, InterpretationError> {
        if image.encoded_payload.is_empty() {
            return Err(InterpretationError::EmptyPayload {
                index: image.index,
                name: image.name.clone(),
            });
        }

        let label = format!("interpret image {}", image.index + 1);
        let description = self
            .retry
            .run(&label, || {
                self.service.describe(self.prompt, &image.encoded_payload)
            })
            .map_err(|source| InterpretationError::Service {
                index: image.index,
                name: image.name.clone(),
                source,
            })?;

        Ok(PhotoInterpretation {
            image_index: image.index,
            image_name: image.name.clone(),
            repair_likely: RepairLikelihood::from_description(&description),
            description,
        })
    }
}
