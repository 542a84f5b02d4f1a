/// Script Sandbox - Materializing Learner Code
///
/// **Core Responsibility:**
/// Turn learner JavaScript into something the checkers can call, without
/// giving it any access to the host.
///
/// **Isolation Rules:**
/// - Every materialization gets a fresh engine runtime and context (own
///   realm, no host bindings: no filesystem, network, timers or DOM)
/// - Heap size and native stack depth are capped by the runtime's limits;
///   an exhausted heap is a failed check, never a host abort
/// - Wall-clock time is capped by a `Deadline` the engine polls through its
///   interrupt handler, so a timed-out script stops executing instead of
///   spinning on an abandoned thread
/// - Source size is checked before anything is parsed
///
/// **Value Passing:**
/// Arguments go in as JSON literals, results come back through
/// `JSON.stringify` captured before learner code runs. `undefined` (and
/// anything JSON cannot express) comes back as `null`.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kata_common::config::EngineConfig;
use rquickjs::context::EvalOptions;
use rquickjs::{CatchResultExt, CaughtError, Context, FromJs, Runtime};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EvalError, Result};

const SANDBOX_STACK_BYTES: usize = 8 * 1024 * 1024;

/// Prelude evaluated before learner code; `const` bindings cannot be
/// redeclared or reassigned by the learner's script.
const PRELUDE: &str = "const __kataStringify = JSON.stringify.bind(JSON);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    pub timeout: Duration,
    pub max_memory_bytes: usize,
    pub max_stack_bytes: usize,
    pub max_source_bytes: usize,
}

impl From<&EngineConfig> for SandboxLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_memory_bytes: config.max_memory_bytes,
            max_stack_bytes: config.max_stack_bytes,
            max_source_bytes: config.max_source_bytes,
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Point in time after which a sandbox must stop, or an explicit cancel
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn expired(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || Instant::now() >= self.at
    }

    pub fn limit_ms(&self) -> u64 {
        self.limit.as_millis() as u64
    }
}

/// Anything the algorithmic checker can invoke with a test vector's arguments
pub trait Callable {
    fn call(&mut self, args: &[Value]) -> Result<Value>;
}

impl<F> Callable for F
where
    F: FnMut(&[Value]) -> Result<Value>,
{
    fn call(&mut self, args: &[Value]) -> Result<Value> {
        self(args)
    }
}

/// Slice `source` from the declared signature, discarding scaffold text
/// (comments, notes) the editor may keep above it
pub fn extract_from_signature<'a>(source: &'a str, signature: &str) -> Result<&'a str> {
    match source.find(signature) {
        Some(start) => Ok(&source[start..]),
        None => Err(EvalError::Materialization(format!(
            "Could not find `{}` in the submitted code",
            signature.trim_end_matches('(')
        ))),
    }
}

pub fn check_source_size(source: &str, limits: &SandboxLimits) -> Result<()> {
    if source.len() > limits.max_source_bytes {
        return Err(EvalError::SourceTooLarge {
            size: source.len(),
            limit: limits.max_source_bytes,
        });
    }
    Ok(())
}

fn is_out_of_memory(caught: &CaughtError<'_>) -> bool {
    match caught {
        CaughtError::Error(rquickjs::Error::Allocation) => true,
        CaughtError::Exception(ex) => ex
            .message()
            .is_some_and(|m| m.contains("out of memory")),
        // the engine throws nothing when it cannot even allocate the error
        CaughtError::Value(value) => value.is_null() || value.is_undefined(),
        CaughtError::Error(_) => false,
    }
}

fn describe(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(ex) => {
            let name = ex
                .as_object()
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string());
            match ex.message() {
                Some(message) if !message.is_empty() => format!("{}: {}", name, message),
                _ => name,
            }
        }
        other => other.to_string().trim_end().to_string(),
    }
}

/// A learner function living inside its own engine runtime
pub struct ScriptFunction {
    context: Context,
    entry_point: String,
    deadline: Deadline,
    memory_limit: usize,
}

impl ScriptFunction {
    /// Evaluate `source` once and make sure it defines `entry_point`
    ///
    /// Parse errors and errors thrown by top-level statements are reported
    /// as `EvalError::Materialization` with the engine's message.
    pub fn materialize(
        source: &str,
        entry_point: &str,
        limits: &SandboxLimits,
        deadline: Deadline,
    ) -> Result<Self> {
        check_source_size(source, limits)?;

        let runtime = Runtime::new()
            .map_err(|e| EvalError::Runtime(format!("Failed to start sandbox: {}", e)))?;
        runtime.set_memory_limit(limits.max_memory_bytes);
        runtime.set_max_stack_size(limits.max_stack_bytes);
        let watch = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || watch.expired())));

        let context = Context::full(&runtime)
            .map_err(|e| EvalError::Runtime(format!("Failed to start sandbox: {}", e)))?;

        let function = Self {
            context,
            entry_point: entry_point.to_string(),
            deadline,
            memory_limit: limits.max_memory_bytes,
        };

        function
            .eval::<()>(PRELUDE)
            .map_err(|e| EvalError::Runtime(format!("Sandbox prelude failed: {}", e)))?;

        function.eval::<()>(source).map_err(|e| match e {
            EvalError::Runtime(message) => EvalError::Materialization(message),
            other => other,
        })?;

        let is_function_check = format!("typeof {} === \"function\"", entry_point);
        let is_function = function.eval::<bool>(&is_function_check).map_err(|e| match e {
            EvalError::Runtime(message) => EvalError::Materialization(message),
            other => other,
        })?;
        if !is_function {
            return Err(EvalError::Materialization(format!(
                "`{}` is not defined as a function",
                entry_point
            )));
        }

        debug!(entry_point, source_bytes = source.len(), "Materialized learner function");
        Ok(function)
    }

    /// Evaluate `source` as a sloppy-mode global script
    fn eval<V>(&self, source: &str) -> Result<V>
    where
        V: for<'js> FromJs<'js>,
    {
        self.context.with(|ctx| {
            let mut options = EvalOptions::default();
            options.strict = false;

            ctx.eval_with_options::<V, _>(source, options)
                .catch(&ctx)
                .map_err(|caught| {
                    if self.deadline.expired() {
                        EvalError::Timeout {
                            limit_ms: self.deadline.limit_ms(),
                        }
                    } else if is_out_of_memory(&caught) {
                        EvalError::MemoryLimit {
                            limit_bytes: self.memory_limit,
                        }
                    } else {
                        EvalError::Runtime(describe(caught))
                    }
                })
        })
    }
}

impl Callable for ScriptFunction {
    fn call(&mut self, args: &[Value]) -> Result<Value> {
        let encoded_args = serde_json::to_string(args)
            .map_err(|e| EvalError::Runtime(format!("Failed to encode arguments: {}", e)))?;

        let driver = format!(
            "(function () {{ const json = __kataStringify({}(...{})); return json === undefined ? \"null\" : json; }})()",
            self.entry_point, encoded_args
        );

        let json = self.eval::<String>(&driver)?;
        serde_json::from_str(&json)
            .map_err(|e| EvalError::Runtime(format!("Unreadable return value: {}", e)))
    }
}

/// Run `job` on a dedicated thread and wait at most `timeout` for it
///
/// The job receives the `Deadline` its sandbox must poll. When the wait
/// runs out the deadline is cancelled, so the engine interrupts the script
/// at its next check and the thread winds down on its own.
pub fn run_with_deadline<T, F>(timeout: Duration, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Deadline) -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    let deadline = Deadline::after(timeout);
    let job_deadline = deadline.clone();

    let handle = thread::Builder::new()
        .name("kata-sandbox".to_string())
        .stack_size(SANDBOX_STACK_BYTES)
        .spawn(move || {
            // receiver may be gone after a timeout
            let _ = tx.send(job(job_deadline));
        })
        .map_err(|e| EvalError::Runtime(format!("Failed to start sandbox: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            let _ = handle.join();
            debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Sandbox job finished");
            result
        }
        Err(RecvTimeoutError::Timeout) => {
            deadline.cancel();
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Sandbox job exceeded its deadline; interrupting"
            );
            Err(EvalError::Timeout {
                limit_ms: timeout.as_millis() as u64,
            })
        }
        Err(RecvTimeoutError::Disconnected) => {
            let _ = handle.join();
            Err(EvalError::Runtime("Sandbox terminated unexpectedly".to_string()))
        }
    }
}
