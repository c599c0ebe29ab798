// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # damage-intake
//!
//! Home damage claim intake. Policyholder photos are described by a vision
//! model, each description is compared with the policyholder's own account,
//! and the historical weather for the incident date is checked for a plausible
//! contribution to the damage. The result is a single ordered report.
//!
//! ## Architecture
//!
//! - **Evidence** (`evidence`): validation and base64 transport encoding
//! - **Vision** (`vision`): one interpretation per photo
//! - **Reconciliation** (`reconcile`): narrative vs. interpretation, literal-matched verdicts
//! - **Weather** (`weather`): historical lookup and corroboration
//! - **Report** (`report`): ordered aggregation, text and JSON output
//! - **Pipeline** (`pipeline`): bounded worker pool, concurrent weather lookup
//!
//! The external services sit behind [`vision::VisionInterpreter`],
//! [`reconcile::TextReconciler`] and [`weather::WeatherLookup`], so the
//! pipeline runs against any implementation.
//!
//! ## Library usage
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use damage_intake::config::IntakeConfig;
//! use damage_intake::evidence::{RawImage, Submission};
//! use damage_intake::pipeline::AssessmentPipeline;
//!
//! let config = IntakeConfig::resolve(None).unwrap();
//! let pipeline = AssessmentPipeline::from_config(&config);
//! let report = pipeline
//!     .run(Submission {
//!         images: vec![RawImage::new("roof.jpg", std::fs::read("roof.jpg").unwrap())],
//!         occurred_on: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
//!         location_code: "10001".into(),
//!         narrative: "Tree fell on roof during storm".into(),
//!     })
//!     .unwrap();
//! println!("{report}");
//! ```

pub mod config;
pub mod error;
pub mod evidence;
pub mod llm;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod vision;
pub mod weather;
