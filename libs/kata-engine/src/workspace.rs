/// Workspace - Editor Flow over a Submission Store
///
/// **Flow:**
/// - `load`: the stored submission, or the starter code when nothing is stored
/// - `save`: persist the current submission (JSON-encoded strings)
/// - `run`: evaluate only, nothing is written
/// - `submit`: evaluate, and mark the problem solved when the verdict passes
/// - `reset`: drop stored code and the solved flag, hand back the starter
///
/// Code is keyed by problem id, the solved flag by slug.
use anyhow::{Context, Result};
use kata_common::store::{code_key, css_key, html_key, solved_key, SubmissionStore};
use kata_common::types::{Problem, ProblemKind, Submission, Verdict};
use tracing::{info, warn};

use crate::evaluator::Evaluator;

pub struct Workspace<'r, S: SubmissionStore> {
    evaluator: Evaluator<'r>,
    store: S,
}

impl<'r, S: SubmissionStore> Workspace<'r, S> {
    pub fn new(evaluator: Evaluator<'r>, store: S) -> Self {
        Self { evaluator, store }
    }

    pub fn evaluator(&self) -> &Evaluator<'r> {
        &self.evaluator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn load(&self, problem: &Problem) -> Result<Submission> {
        match &problem.kind {
            ProblemKind::Algorithmic { starter_code, .. } => {
                let source = self
                    .read_string(&code_key(&problem.id))?
                    .unwrap_or_else(|| starter_code.clone());
                Ok(Submission::code(source))
            }
            ProblemKind::Markup {
                starter_html,
                starter_css,
                ..
            } => {
                let html = self
                    .read_string(&html_key(&problem.id))?
                    .unwrap_or_else(|| starter_html.clone());
                let css = self
                    .read_string(&css_key(&problem.id))?
                    .unwrap_or_else(|| starter_css.clone());
                Ok(Submission::markup(html, css))
            }
        }
    }

    pub fn save(&self, problem: &Problem, submission: &Submission) -> Result<()> {
        match submission {
            Submission::Code { source } => self.write_string(&code_key(&problem.id), source),
            Submission::Markup { html, css } => {
                self.write_string(&html_key(&problem.id), html)?;
                self.write_string(&css_key(&problem.id), css)
            }
        }
    }

    pub fn run(&self, slug: &str, submission: &Submission) -> Verdict {
        self.evaluator.evaluate(slug, submission)
    }

    pub fn submit(&self, slug: &str, submission: &Submission) -> Result<Verdict> {
        let verdict = self.evaluator.evaluate(slug, submission);
        if verdict.passed {
            self.store
                .set(&solved_key(slug), "true")
                .with_context(|| format!("Failed to mark {} as solved", slug))?;
            info!(slug, "Problem marked as solved");
        }
        Ok(verdict)
    }

    pub fn reset(&self, problem: &Problem) -> Result<Submission> {
        match &problem.kind {
            ProblemKind::Algorithmic { .. } => self.store.remove(&code_key(&problem.id))?,
            ProblemKind::Markup { .. } => {
                self.store.remove(&html_key(&problem.id))?;
                self.store.remove(&css_key(&problem.id))?;
            }
        }
        self.store.remove(&solved_key(&problem.slug))?;
        info!(slug = %problem.slug, "Workspace reset to starter code");
        Ok(problem.starter())
    }

    pub fn is_solved(&self, slug: &str) -> Result<bool> {
        let raw = self.store.get(&solved_key(slug))?;
        Ok(matches!(raw.as_deref().map(serde_json::from_str::<bool>), Some(Ok(true))))
    }

    /// Stored values are JSON strings; an undecodable value counts as absent
    fn read_string(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<String>(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable stored value");
                Ok(None)
            }
        }
    }

    fn write_string(&self, key: &str, value: &str) -> Result<()> {
        let encoded = serde_json::to_string(value).context("Failed to encode submission")?;
        self.store.set(key, &encoded)
    }
}
