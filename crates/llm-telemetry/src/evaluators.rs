//! Named evaluators for grading model output.
//!
//! The registry is independent of the tracing lifecycle: it can be used with
//! or without `init`, from any number of threads.

use crate::error::{EvaluationError, EvaluatorNotFound};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// One model interaction to grade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalCase {
    pub input: String,
    pub output: String,
    pub expected: Option<String>,
    /// Retrieved documents or other grounding material.
    pub context: Vec<String>,
}

impl EvalCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }
}

/// Result of grading one case. `score` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalScore {
    pub score: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl EvalScore {
    pub fn pass() -> Self {
        Self {
            score: 1.0,
            passed: true,
            explanation: None,
        }
    }

    pub fn fail() -> Self {
        Self {
            score: 0.0,
            passed: false,
            explanation: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// Grades a case.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, case: &EvalCase) -> Result<EvalScore, EvaluationError>;
}

/// Thread-safe name to evaluator map.
///
/// Registering an existing name replaces the entry.
#[derive(Default)]
pub struct EvaluatorRegistry {
    entries: Mutex<BTreeMap<String, Arc<dyn Evaluator>>>,
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("names", &self.list())
            .finish()
    }
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `evaluator` under `name` and returns the entry it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Option<Arc<dyn Evaluator>> {
        let name = name.into();
        debug!(evaluator = %name, "registering evaluator");
        self.entries.lock().insert(name, evaluator)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Evaluator>, EvaluatorNotFound> {
        self.entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EvaluatorNotFound {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Evaluator>> {
        self.entries.lock().remove(name)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

static EVALUATORS: OnceLock<EvaluatorRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn evaluators() -> &'static EvaluatorRegistry {
    EVALUATORS.get_or_init(EvaluatorRegistry::new)
}

/// Output equals the expected answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch {
    case_insensitive: bool,
}

impl ExactMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
        }
    }
}

impl Evaluator for ExactMatch {
    fn evaluate(&self, case: &EvalCase) -> Result<EvalScore, EvaluationError> {
        let expected = case
            .expected
            .as_deref()
            .ok_or(EvaluationError::MissingInput("expected"))?;
        let (output, expected) = (case.output.trim(), expected.trim());
        let matched = if self.case_insensitive {
            output.to_lowercase() == expected.to_lowercase()
        } else {
            output == expected
        };
        Ok(if matched {
            EvalScore::pass()
        } else {
            EvalScore::fail().with_explanation(format!("expected `{expected}`"))
        })
    }
}

/// Output mentions every keyword. The score is the fraction found.
#[derive(Debug, Clone)]
pub struct Contains {
    keywords: Vec<String>,
    case_insensitive: bool,
}

impl Contains {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            case_insensitive: false,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

impl Evaluator for Contains {
    fn evaluate(&self, case: &EvalCase) -> Result<EvalScore, EvaluationError> {
        if self.keywords.is_empty() {
            return Ok(EvalScore::pass());
        }

        let haystack = if self.case_insensitive {
            case.output.to_lowercase()
        } else {
            case.output.clone()
        };
        let missing: Vec<&str> = self
            .keywords
            .iter()
            .filter(|keyword| {
                if self.case_insensitive {
                    !haystack.contains(&keyword.to_lowercase())
                } else {
                    !haystack.contains(keyword.as_str())
                }
            })
            .map(String::as_str)
            .collect();

        let found = self.keywords.len() - missing.len();
        let score = EvalScore {
            score: found as f64 / self.keywords.len() as f64,
            passed: missing.is_empty(),
            explanation: None,
        };
        Ok(if missing.is_empty() {
            score
        } else {
            score.with_explanation(format!("missing: {}", missing.join(", ")))
        })
    }
}

/// Output matches a regular expression.
#[derive(Debug, Clone)]
pub struct RegexMatch {
    pattern: Regex,
}

impl RegexMatch {
    pub fn new(pattern: &str) -> Result<Self, EvaluationError> {
        Regex::new(pattern)
            .map(|pattern| Self { pattern })
            .map_err(|e| EvaluationError::Failed(format!("invalid pattern `{pattern}`: {e}")))
    }
}

impl Evaluator for RegexMatch {
    fn evaluate(&self, case: &EvalCase) -> Result<EvalScore, EvaluationError> {
        Ok(if self.pattern.is_match(&case.output) {
            EvalScore::pass()
        } else {
            EvalScore::fail().with_explanation(format!("no match for `{}`", self.pattern.as_str()))
        })
    }
}
