pub mod assert;
pub mod checks;
pub mod css;
pub mod dom;
pub mod error;
pub mod evaluator;
pub mod registry;
pub mod script;
pub mod workspace;

pub use error::{CatalogError, EvalError};
pub use evaluator::{Evaluator, VALIDATION_FAILED_MESSAGE};
pub use registry::Registry;
pub use workspace::Workspace;
