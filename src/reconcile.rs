//! Narrative reconciliation: does the photo show what the policyholder described?
//!
//! The text model is told to answer with exactly one of two fixed sentences.
//! The verdict comes from matching the reply against those literals; any other
//! reply is indeterminate and resolved by [`IndeterminatePolicy`].

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{ChatMessage, LlmError, LlmResult, OllamaClient};
use crate::vision::PhotoInterpretation;

/// Reply signalling that the narrative and photo disagree.
pub const DIVERGENCE_RESPONSE: &str = "Follow up investigation suggested to verify validity";

/// Reply signalling that the narrative and photo agree.
pub const MATCH_RESPONSE: &str = "User description matches. No discrepancies noted.";

/// Capability: plain text completion. Also used for weather corroboration.
pub trait TextReconciler: Send + Sync {
    fn complete(&self, prompt: &str) -> LlmResult<String>;
}

impl TextReconciler for OllamaClient {
    fn complete(&self, prompt: &str) -> LlmResult<String> {
        self.chat(&self.config().text_model, &[ChatMessage::user(prompt)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Consistent,
    FollowUpSuggested,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consistent => f.write_str(MATCH_RESPONSE),
            Self::FollowUpSuggested => f.write_str(DIVERGENCE_RESPONSE),
        }
    }
}

/// What the raw reply said, before any policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSignal {
    Match,
    Divergence,
    Unrecognized,
}

/// Match a reply against the two literals. Only surrounding whitespace is ignored.
pub fn classify_response(response: &str) -> ResponseSignal {
    match response.trim() {
        MATCH_RESPONSE => ResponseSignal::Match,
        DIVERGENCE_RESPONSE => ResponseSignal::Divergence,
        _ => ResponseSignal::Unrecognized,
    }
}

/// How to resolve a reply that is neither literal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndeterminatePolicy {
    /// Treat as [`Verdict::FollowUpSuggested`] and flag the fallback.
    #[default]
    FollowUp,
    /// Report [`ReconciliationError::Indeterminate`] for the image.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationVerdict {
    pub image_index: usize,
    pub verdict: Verdict,
    /// The model's reply as received.
    pub response: String,
    /// Set when the reply matched neither literal and the policy chose the verdict.
    pub resolved_by_fallback: bool,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReconciliationError {
    #[error("comparison failed for image {}: {source}", .index + 1)]
    #[diagnostic(
        code(intake::reconcile::service),
        help("The text model could not be reached or returned an unusable response.")
    )]
    Service {
        index: usize,
        #[source]
        source: LlmError,
    },

    #[error("comparison for image {} was inconclusive: \"{response}\"", .index + 1)]
    #[diagnostic(
        code(intake::reconcile::indeterminate),
        help("The model did not answer with either expected sentence. Review this image manually.")
    )]
    Indeterminate { index: usize, response: String },
}

/// Build the comparison instruction for one image.
pub fn comparison_prompt(narrative: &str, description: &str) -> String {
    format!(
        "Two descriptions of an image have been provided regarding a home damage insurance claim. \
Compare the policyholder's description of the images and accident with the AI generated \
description of the picture and decide whether they are talking about the same incident.\n\
Respond only with \"{DIVERGENCE_RESPONSE}\" if the two summaries are not talking about the same \
incident. Otherwise, respond with \"{MATCH_RESPONSE}\"\n\
Policyholder description of incident: {narrative}\n\
AI generated description of Image: {description}\n"
    )
}

pub struct NarrativeReconciler<'a> {
    service: &'a dyn TextReconciler,
    policy: IndeterminatePolicy,
}

impl<'a> NarrativeReconciler<'a> {
    pub fn new(service: &'a dyn TextReconciler, policy: IndeterminatePolicy) -> Self {
        Self { service, policy }
    }

    pub fn reconcile(
        &self,
        narrative: &str,
        interpretation: &PhotoInterpretation,
    ) -> Result<ReconciliationVerdict, ReconciliationError> {
        let index = interpretation.image_index;
        let response = self
            .service
            .complete(&comparison_prompt(narrative, &interpretation.description))
            .map_err(|source| ReconciliationError::Service { index, source })?;

        let (verdict, resolved_by_fallback) = match classify_response(&response) {
            ResponseSignal::Match => (Verdict::Consistent, false),
            ResponseSignal::Divergence => (Verdict::FollowUpSuggested, false),
            ResponseSignal::Unrecognized => match self.policy {
                IndeterminatePolicy::FollowUp => {
                    tracing::warn!(
                        image = index + 1,
                        response = %response,
                        "comparison reply matched neither sentence, suggesting follow-up"
                    );
                    (Verdict::FollowUpSuggested, true)
                }
                IndeterminatePolicy::Error => {
                    tracing::warn!(
                        image = index + 1,
                        response = %response,
                        "comparison reply matched neither sentence"
                    );
                    return Err(ReconciliationError::Indeterminate { index, response });
                }
            },
        };

        Ok(ReconciliationVerdict {
            image_index: index,
            verdict,
            response,
            resolved_by_fallback,
        })
    }
}
