use anyhow::Result;

use crate::errors::CmsError;

/// A single operation on a service; `Resp` is what the caller gets back.
pub trait Request {
    type Resp;
}

pub trait Queryable<Req>
where
    Req: Request,
{
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

pub trait Commandable<Req>
where
    Req: Request,
{
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}

/// Input checks that run before anything is sent to storage.
pub trait Validate {
    fn validate(&self) -> Result<(), CmsError>;
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), CmsError> {
    if value.trim().is_empty() {
        return Err(CmsError::validation(format!("{} is required", field)));
    }
    Ok(())
}

pub(crate) fn require_non_negative<N: PartialOrd + Default>(
    field: &str,
    value: Option<N>,
) -> Result<(), CmsError> {
    match value {
        Some(v) if v < N::default() => Err(CmsError::validation(format!(
            "{} must not be negative",
            field
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn require_price(field: &str, value: Option<f64>) -> Result<(), CmsError> {
    match value {
        Some(v) if !v.is_finite() => Err(CmsError::validation(format!(
            "{} must be a finite number",
            field
        ))),
        _ => require_non_negative(field, value),
    }
}

/// Trims a free-text field, treating blank input as absent.
pub(crate) fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
