//! Request parsers and the step adjustment decorator.

use std::marker::PhantomData;
use std::time::Duration;

use thiserror::Error;

use crate::rpc::CallContext;

/// Query parameters derived from a read request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub query: String,
    /// Range start, Unix nanoseconds.
    pub start: i64,
    /// Range end, Unix nanoseconds.
    pub end: i64,
    pub step: Duration,
}

/// Everything a read handler needs from a parsed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    pub params: QueryParams,
    /// Per-request timeout, when the request set one.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing required parameter {0}")]
    Missing(&'static str),

    #[error("invalid parameter {param}: {reason}")]
    Invalid { param: &'static str, reason: String },
}

/// Turns an incoming request of type `R` into [`ParsedOptions`].
pub trait RequestParser<R: ?Sized>: Send + Sync {
    fn parse(&self, ctx: &CallContext, request: &R) -> Result<ParsedOptions, ParseError>;
}

impl<R, F> RequestParser<R> for F
where
    R: ?Sized,
    F: Fn(&CallContext, &R) -> Result<ParsedOptions, ParseError> + Send + Sync,
{
    fn parse(&self, ctx: &CallContext, request: &R) -> Result<ParsedOptions, ParseError> {
        self(ctx, request)
    }
}

/// Step adjustment applied after parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepAdjustment {
    /// Added to the parsed step.
    pub adjust_step: Duration,
    /// Only adjust steps that are a multiple of this. Zero means always.
    pub when_step_divisible_by: Duration,
}

impl StepAdjustment {
    /// Whether `step` qualifies for the adjustment.
    pub fn applies_to(&self, step: Duration) -> bool {
        let divisor = self.when_step_divisible_by.as_nanos();
        divisor == 0 || step.as_nanos() % divisor == 0
    }

    /// Adjust `params` in place if its step qualifies.
    pub fn apply(&self, params: &mut QueryParams) {
        if self.applies_to(params.step) {
            params.step += self.adjust_step;
        }
    }
}

/// Parser wrapping `P` with a [`StepAdjustment`].
pub struct StepAdjusted<P, R: ?Sized> {
    base: P,
    adjustment: StepAdjustment,
    _request: PhantomData<fn(&R)>,
}

impl<P, R> RequestParser<R> for StepAdjusted<P, R>
where
    P: RequestParser<R>,
    R: ?Sized,
{
    fn parse(&self, ctx: &CallContext, request: &R) -> Result<ParsedOptions, ParseError> {
        let mut parsed = self.base.parse(ctx, request)?;
        self.adjustment.apply(&mut parsed.params);
        Ok(parsed)
    }
}

/// Wrap `base` so successfully parsed steps get `adjustment` applied.
///
/// Errors from `base` are returned as they are.
pub fn with_step_adjustment<P, R>(base: P, adjustment: StepAdjustment) -> StepAdjusted<P, R>
where
    P: RequestParser<R>,
    R: ?Sized,
{
    StepAdjusted {
        base,
        adjustment,
        _request: PhantomData,
    }
}
