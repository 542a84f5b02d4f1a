// Problem registry
// Loads and validates the problem catalog (TOML)

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use kata_common::types::{Problem, ProblemKind};
use serde::Deserialize;
use tracing::info;

use crate::error::CatalogError;

const BUILTIN_CATALOG: &str = include_str!("../catalog/problems.toml");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    problems: Vec<Problem>,
}

/// Read-only mapping from slug to problem definition
///
/// Closed after construction: there is no registration API, so every
/// lookup sees the same set of problems for the lifetime of the registry.
#[derive(Debug, Clone)]
pub struct Registry {
    problems: Vec<Problem>,
    by_slug: HashMap<String, usize>,
}

impl Registry {
    /// The catalog bundled with the engine
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_toml(&content)?;
        info!(path = %path.display(), problems = registry.len(), "Loaded problem catalog");
        Ok(registry)
    }

    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let catalog: CatalogFile = toml::from_str(content)?;
        Self::from_problems(catalog.problems)
    }

    /// Validate and index `problems`, sorted by catalog order
    pub fn from_problems(mut problems: Vec<Problem>) -> Result<Self, CatalogError> {
        let mut ids = HashSet::new();
        for problem in &problems {
            validate_problem(problem)?;
            if !ids.insert(problem.id.as_str()) {
                return Err(CatalogError::InvalidProblem {
                    slug: problem.slug.clone(),
                    reason: format!("duplicate id `{}`", problem.id),
                });
            }
        }

        problems.sort_by_key(|p| p.order);

        let mut by_slug = HashMap::new();
        for (index, problem) in problems.iter().enumerate() {
            if by_slug.insert(problem.slug.clone(), index).is_some() {
                return Err(CatalogError::DuplicateSlug(problem.slug.clone()));
            }
        }

        Ok(Self { problems, by_slug })
    }

    pub fn get(&self, slug: &str) -> Option<&Problem> {
        self.by_slug.get(slug).map(|&index| &self.problems[index])
    }

    /// All problems in catalog order
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

fn invalid(problem: &Problem, reason: impl Into<String>) -> CatalogError {
    CatalogError::InvalidProblem {
        slug: problem.slug.clone(),
        reason: reason.into(),
    }
}

/// ASCII JavaScript identifier: letter, `_` or `$`, then also digits
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn validate_problem(problem: &Problem) -> Result<(), CatalogError> {
    if problem.slug.trim().is_empty() {
        return Err(invalid(problem, "slug is empty"));
    }

    match &problem.kind {
        ProblemKind::Algorithmic {
            entry_point,
            starter_code,
            vectors,
        } => {
            if !is_identifier(entry_point) {
                return Err(invalid(
                    problem,
                    format!("entry point `{}` is not a valid identifier", entry_point),
                ));
            }
            if vectors.is_empty() {
                return Err(invalid(problem, "no test vectors"));
            }
            let signature = format!("function {}(", entry_point);
            if !starter_code.contains(&signature) {
                return Err(invalid(
                    problem,
                    format!("starter code does not declare `{}`", signature),
                ));
            }
        }
        ProblemKind::Markup {
            structure, style, ..
        } => {
            if structure.is_empty() && style.is_empty() {
                return Err(invalid(problem, "no assertions"));
            }
            if let Some(assertion) = style.iter().find(|a| a.properties.is_empty()) {
                return Err(invalid(
                    problem,
                    format!("style assertion on `{}` lists no properties", assertion.selector),
                ));
            }
        }
    }

    Ok(())
}
