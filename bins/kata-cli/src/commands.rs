// CLI commands for practicing with Kata
use anyhow::{bail, Context as _, Result};
use clap::Args;
use kata_common::config::EngineConfig;
use kata_common::store::FileStore;
use kata_common::types::{
    CheckStatus, EvaluationReport, Problem, ProblemKind, Submission, Verdict,
};
use kata_engine::{Evaluator, Registry, Workspace};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_STORE_PATH: &str = ".kata/store.json";

/// Where a submission comes from; anything not given is taken from the
/// saved workspace (or the starter code)
#[derive(Args, Debug, Default)]
pub struct SubmissionInput {
    /// JavaScript source file (algorithmic problems)
    #[arg(short, long, conflicts_with_all = ["html", "css"])]
    pub file: Option<PathBuf>,

    /// HTML file (markup problems)
    #[arg(long)]
    pub html: Option<PathBuf>,

    /// CSS file (markup problems)
    #[arg(long)]
    pub css: Option<PathBuf>,
}

pub struct Context {
    registry: Registry,
    config: EngineConfig,
    store_path: PathBuf,
    json: bool,
}

impl Context {
    pub fn open(config_path: &Path, store_path: &Path, json: bool) -> Result<Self> {
        let config = EngineConfig::load_or_default(config_path)
            .with_context(|| format!("Failed to load engine config from {}", config_path.display()))?;
        let registry = Registry::builtin().context("Failed to load bundled problem catalog")?;

        debug!(
            problems = registry.len(),
            timeout_ms = config.timeout_ms,
            store = %store_path.display(),
            "CLI context ready"
        );

        Ok(Self {
            registry,
            config,
            store_path: store_path.to_path_buf(),
            json,
        })
    }

    fn workspace(&self) -> Result<Workspace<'_, FileStore>> {
        let store = FileStore::open(&self.store_path)
            .with_context(|| format!("Failed to open store {}", self.store_path.display()))?;
        Ok(Workspace::new(Evaluator::new(&self.registry, &self.config), store))
    }

    fn problem(&self, slug: &str) -> Result<&Problem> {
        match self.registry.get(slug) {
            Some(problem) => Ok(problem),
            None => bail!(
                "Unknown problem '{}'. Run `kata list` to see available problems",
                slug
            ),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Build the submission for `problem` from files, falling back to the
/// saved workspace for anything not given
fn resolve_submission(
    workspace: &Workspace<'_, FileStore>,
    problem: &Problem,
    input: &SubmissionInput,
) -> Result<Submission> {
    let saved = workspace.load(problem)?;

    match (&problem.kind, saved) {
        (ProblemKind::Algorithmic { .. }, saved) => {
            if input.html.is_some() || input.css.is_some() {
                bail!("'{}' is a JavaScript problem; use --file", problem.slug);
            }
            match &input.file {
                Some(path) => Ok(Submission::code(read_file(path)?)),
                None => Ok(saved),
            }
        }
        (ProblemKind::Markup { .. }, Submission::Markup { html, css }) => {
            if input.file.is_some() {
                bail!("'{}' is an HTML/CSS problem; use --html and --css", problem.slug);
            }
            let html = match &input.html {
                Some(path) => read_file(path)?,
                None => html,
            };
            let css = match &input.css {
                Some(path) => read_file(path)?,
                None => css,
            };
            Ok(Submission::markup(html, css))
        }
        (ProblemKind::Markup { .. }, Submission::Code { .. }) => {
            bail!("Saved workspace for '{}' is not markup", problem.slug)
        }
    }
}

fn print_verdict(verdict: &Verdict, success_text: &str) {
    if verdict.passed {
        println!("✓ {}", success_text);
    } else {
        println!("✗ {}", verdict.message.as_deref().unwrap_or("Failed"));
    }
}

fn print_report(report: &EvaluationReport) {
    println!("→ Attempt {} ({})", report.attempt_id, report.slug);
    for check in &report.checks {
        let mark = match check.status {
            CheckStatus::Passed => "✓",
            CheckStatus::Failed => "✗",
            CheckStatus::RuntimeError => "⚠",
            CheckStatus::TimeLimitExceeded => "⏱",
        };
        println!("  {} [{}] {}", mark, check.index + 1, check.label);
        if let Some(detail) = &check.detail {
            println!("      {}", detail);
        }
    }
    println!("  Passed {}/{} → {:?}", report.passed, report.total, report.status);
}

/// List problems with difficulty, kind and solved state
pub fn list(ctx: &Context) -> Result<()> {
    let workspace = ctx.workspace()?;

    if ctx.json {
        #[derive(Serialize)]
        struct Row<'a> {
            slug: &'a str,
            title: &'a str,
            difficulty: String,
            category: &'a str,
            kind: &'static str,
            solved: bool,
        }
        let mut rows = Vec::new();
        for p in ctx.registry.problems() {
            rows.push(Row {
                slug: &p.slug,
                title: &p.title,
                difficulty: p.difficulty.to_string(),
                category: &p.category,
                kind: p.kind.name(),
                solved: workspace.is_solved(&p.slug)?,
            });
        }
        return print_json(&rows);
    }

    println!("📚 {} problems", ctx.registry.len());
    println!();
    for p in ctx.registry.problems() {
        let mark = if workspace.is_solved(&p.slug)? { "✓" } else { " " };
        println!(
            "  [{}] {:<14} {:<26} {:<7} {}",
            mark,
            p.slug,
            p.title,
            p.difficulty.to_string(),
            p.kind.language()
        );
    }
    Ok(())
}

pub fn show(ctx: &Context, slug: &str, with_solution: bool) -> Result<()> {
    let problem = ctx.problem(slug)?;

    if ctx.json {
        return print_json(problem);
    }

    println!("📝 {} ({}, {})", problem.title, problem.difficulty, problem.category);
    if let Some(video) = problem.video_id.as_deref().filter(|v| !v.is_empty()) {
        println!("   Video: https://www.youtube.com/watch?v={}", video);
    }
    println!();
    for paragraph in &problem.statement {
        println!("{}", paragraph);
        println!();
    }

    for example in &problem.examples {
        println!("Example {}:", example.id);
        println!("  Input:  {}", example.input_text);
        println!("  Output: {}", example.output_text);
        if let Some(explanation) = &example.explanation {
            println!("  Explanation: {}", explanation);
        }
    }

    if !problem.constraints.is_empty() {
        println!();
        println!("Constraints:");
        for constraint in &problem.constraints {
            println!("  • {}", constraint);
        }
    }

    println!();
    match problem.starter() {
        Submission::Code { source } => {
            println!("Starter code:");
            println!("{}", source);
        }
        Submission::Markup { html, css } => {
            println!("Starter HTML:");
            println!("{}", html);
            println!();
            println!("Starter CSS:");
            println!("{}", css);
        }
    }

    if with_solution {
        let solution = &problem.solution;
        println!();
        println!("💡 Solution: {}", solution.approach);
        for line in &solution.explanation {
            println!("  • {}", line);
        }
        if let Some(complexity) = &solution.complexity {
            println!("  Time: {}  Space: {}", complexity.time, complexity.space);
        }
        println!();
        println!("{}", solution.code);
    }

    Ok(())
}

/// Evaluate without saving; returns whether the submission passed
pub fn run(ctx: &Context, slug: &str, input: &SubmissionInput, report: bool) -> Result<bool> {
    let problem = ctx.problem(slug)?;
    let workspace = ctx.workspace()?;
    let submission = resolve_submission(&workspace, problem, input)?;

    if report {
        let report = workspace.evaluator().grade(slug, &submission);
        if ctx.json {
            print_json(&report)?;
        } else {
            print_report(&report);
        }
        return Ok(report.verdict.passed);
    }

    let verdict = workspace.run(slug, &submission);
    if ctx.json {
        print_json(&verdict)?;
    } else {
        print_verdict(&verdict, "It works! Try to submit");
    }
    Ok(verdict.passed)
}

/// Save, evaluate and record the solved flag on a pass
pub fn submit(ctx: &Context, slug: &str, input: &SubmissionInput) -> Result<bool> {
    let problem = ctx.problem(slug)?;
    let workspace = ctx.workspace()?;
    let submission = resolve_submission(&workspace, problem, input)?;

    workspace.save(problem, &submission)?;
    let verdict = workspace.submit(slug, &submission)?;

    if ctx.json {
        print_json(&verdict)?;
    } else {
        print_verdict(&verdict, "Congrats! All tests passed");
    }
    Ok(verdict.passed)
}

pub fn reset(ctx: &Context, slug: &str) -> Result<()> {
    let problem = ctx.problem(slug)?;
    let workspace = ctx.workspace()?;
    let starter = workspace.reset(problem)?;

    if ctx.json {
        return print_json(&starter);
    }
    println!("↺ Code reset to starter for '{}'", slug);
    Ok(())
}

/// Grade every reference solution; returns whether all were accepted
pub fn verify(ctx: &Context) -> Result<bool> {
    let evaluator = Evaluator::new(&ctx.registry, &ctx.config);
    let mut reports = Vec::new();

    if !ctx.json {
        println!("→ Verifying {} reference solutions", ctx.registry.len());
    }

    for problem in ctx.registry.problems() {
        let report = evaluator.grade(&problem.slug, &problem.reference());
        if !ctx.json {
            let mark = if report.verdict.passed { "✓" } else { "✗" };
            println!(
                "  {} {:<14} {}/{} checks",
                mark, problem.slug, report.passed, report.total
            );
            if let Some(message) = &report.verdict.message {
                println!("      {}", message);
            }
        }
        reports.push(report);
    }

    let failed = reports.iter().filter(|r| !r.verdict.passed).count();
    info!(total = reports.len(), failed, "Catalog verification finished");

    if ctx.json {
        print_json(&reports)?;
    } else if failed == 0 {
        println!("✓ All reference solutions accepted");
    } else {
        println!("✗ {} reference solution(s) rejected", failed);
    }
    Ok(failed == 0)
}
