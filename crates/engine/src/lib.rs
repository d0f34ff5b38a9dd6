//! Grading engine for TV programming schedules.
//!
//! Takes an instance document (channels, programs, priority blocks, scoring
//! parameters) and a submission (which program airs on which channel when),
//! reports every constraint violation and computes the schedule's score.

pub mod config;
pub mod grader;
pub mod model;
pub mod parse;
pub mod report;
pub mod scorer;
pub mod timeline;
pub mod validator;

pub use config::GradingOptions;
pub use grader::{grade, grade_with_options, GradeError};
pub use parse::ParseError;
pub use report::{Status, ValidationResult};
