#![warn(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod actions;
pub mod engine;
pub mod envfile;
pub mod masking;
pub mod model;
pub mod parser;
pub mod report;
pub mod util;
pub mod value;
pub mod vars;

pub use actions::{Action, ActionRegistry, ActionResult};
pub use engine::case::{RunOptions, run_case};
pub use engine::shutdown::Shutdown;
pub use engine::suite::run_suite;
pub use model::{CaseResult, Status, StepResult, SuiteResult, TestCase, TestSuite};
pub use value::Value;
pub use vars::VariableStore;
