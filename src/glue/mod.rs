//! Glue between a read API front end and the query path.
//!
//! Request parsing itself lives with the front end; this module defines the
//! parser seam and decorators over it.

mod parser;

pub use parser::{
    with_step_adjustment, ParseError, ParsedOptions, QueryParams, RequestParser, StepAdjusted,
    StepAdjustment,
};
