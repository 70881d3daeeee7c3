//! Workflow configuration: YAML schema, parsing, and validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_workflow, parse_workflow_str};
pub use types::{ResourceConfig, StateBackendKind, StateConfig, WorkflowConfig};
pub use validator::validate_workflow;
