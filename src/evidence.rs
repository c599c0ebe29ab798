//! Evidence normalisation: validate a submission and encode its images.
//!
//! A [`Submission`] is what the intake form hands over: raw image blobs, the
//! incident date, a location code and the policyholder's narrative.
//! [`normalize`] checks that every required field is present, collecting all
//! problems into one [`ValidationError`], and turns each blob into an
//! [`EvidenceImage`] carrying a base64 transport payload.

use std::fmt;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File extensions accepted by the intake form.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One reason a submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    NoImages,
    EmptyLocation,
    EmptyNarrative,
    UnsupportedImageType { name: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoImages => write!(f, "at least one image is required"),
            Self::EmptyLocation => write!(f, "location code is empty"),
            Self::EmptyNarrative => write!(f, "incident description is empty"),
            Self::UnsupportedImageType { name } => {
                write!(f, "\"{name}\" is not a PNG, JPG, or JPEG image")
            }
        }
    }
}

/// A submission failed validation. Nothing downstream runs.
#[derive(Debug, Error, Diagnostic)]
#[error("submission rejected: {}", join_issues(.issues))]
#[diagnostic(
    code(intake::validation::rejected),
    help("Please fill in all inputs and upload at least one PNG, JPG, or JPEG image.")
)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Whether the given issue is among the reasons for rejection.
    pub fn has(&self, issue: &ValidationIssue) -> bool {
        self.issues.contains(issue)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Diagnostic)]
pub enum EvidenceError {
    #[error("failed to read image: {path}")]
    #[diagnostic(
        code(intake::evidence::read),
        help("Check that the file exists and that you have read permission.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("payload is not valid base64: {message}")]
    #[diagnostic(
        code(intake::evidence::decode),
        help("Encoded payloads must come from `encode_payload`; the text may have been truncated.")
    )]
    Decode { message: String },
}

pub type EvidenceResult<T> = std::result::Result<T, EvidenceError>;

// ---------------------------------------------------------------------------
// Submission input
// ---------------------------------------------------------------------------

/// An uploaded image before normalisation.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    /// File name as uploaded, used for the type check and in the report.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read an image from disk, naming it after the file.
    pub fn from_path(path: &Path) -> EvidenceResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| EvidenceError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    /// Whether the file name carries one of [`ACCEPTED_EXTENSIONS`].
    pub fn has_accepted_extension(&self) -> bool {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                ACCEPTED_EXTENSIONS
                    .iter()
                    .any(|accepted| ext.eq_ignore_ascii_case(accepted))
            })
            .unwrap_or(false)
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Everything the intake form collects for one claim.
#[derive(Debug, Clone)]
pub struct Submission {
    pub images: Vec<RawImage>,
    pub occurred_on: NaiveDate,
    pub location_code: String,
    pub narrative: String,
}

// ---------------------------------------------------------------------------
// Normalised records
// ---------------------------------------------------------------------------

/// The validated incident. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub occurred_on: NaiveDate,
    pub location_code: String,
    pub narrative: String,
}

/// An image ready to be sent to the vision service.
#[derive(Clone)]
pub struct EvidenceImage {
    /// Zero-based position in the submission.
    pub index: usize,
    pub name: String,
    pub raw_bytes: Vec<u8>,
    pub encoded_payload: String,
}

impl fmt::Debug for EvidenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceImage")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("bytes", &self.raw_bytes.len())
            .field("payload_len", &self.encoded_payload.len())
            .finish()
    }
}

/// Output of [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedSubmission {
    pub incident: Incident,
    pub images: Vec<EvidenceImage>,
}

/// Encode raw bytes into the transport form sent to the vision service.
pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Reverse of [`encode_payload`].
pub fn decode_payload(payload: &str) -> EvidenceResult<Vec<u8>> {
    BASE64.decode(payload).map_err(|e| EvidenceError::Decode {
        message: e.to_string(),
    })
}

/// The upload form's file-type filter: every image whose name lacks one of
/// [`ACCEPTED_EXTENSIONS`].
///
/// [`normalize`] does not apply this; blobs handed over in memory may carry
/// any name. Front ends that read files from disk run it first.
pub fn check_upload_types(images: &[RawImage]) -> Result<(), ValidationError> {
    let issues: Vec<_> = images
        .iter()
        .filter(|image| !image.has_accepted_extension())
        .map(|image| ValidationIssue::UnsupportedImageType {
            name: image.name.clone(),
        })
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

/// Validate a submission and encode its images, preserving upload order.
///
/// Whitespace-only location codes and narratives count as empty. All issues
/// are reported together. Image names and bytes are not inspected.
pub fn normalize(submission: Submission) -> Result<NormalizedSubmission, ValidationError> {
    let mut issues = Vec::new();

    if submission.images.is_empty() {
        issues.push(ValidationIssue::NoImages);
    }
    let location_code = submission.location_code.trim();
    if location_code.is_empty() {
        issues.push(ValidationIssue::EmptyLocation);
    }
    let narrative = submission.narrative.trim();
    if narrative.is_empty() {
        issues.push(ValidationIssue::EmptyNarrative);
    }

    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }

    let incident = Incident {
        occurred_on: submission.occurred_on,
        location_code: location_code.to_string(),
        narrative: narrative.to_string(),
    };

    let images = submission
        .images
        .into_iter()
        .enumerate()
        .map(|(index, raw)| EvidenceImage {
            index,
            encoded_payload: encode_payload(&raw.bytes),
            name: raw.name,
            raw_bytes: raw.bytes,
        })
        .collect();

    Ok(NormalizedSubmission { incident, images })
}
