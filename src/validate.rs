//! Client-side form checks. They mirror a subset of the backend rules so the
//! user gets feedback before any request goes out.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
    /// Dialog title; most checks use the generic warning title.
    pub title: Option<&'static str>,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            title: None,
        }
    }

    pub fn titled(mut self, title: &'static str) -> Self {
        self.title = Some(title);
        self
    }
}

/// Trimmed value, or the given message when blank.
pub fn required(
    field: &'static str,
    value: Option<&str>,
    message: &str,
) -> Result<String, ValidationError> {
    let v = value.map(str::trim).unwrap_or_default();
    if v.is_empty() {
        return Err(ValidationError::new(field, message));
    }
    Ok(v.to_string())
}

pub fn max_chars(
    field: &'static str,
    value: &str,
    max: usize,
    message: &str,
) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(field, message));
    }
    Ok(())
}

pub fn min_chars(
    field: &'static str,
    value: &str,
    min: usize,
    message: &str,
) -> Result<(), ValidationError> {
    if value.chars().count() < min {
        return Err(ValidationError::new(field, message));
    }
    Ok(())
}

pub fn required_id(
    field: &'static str,
    value: Option<i64>,
    message: &str,
) -> Result<i64, ValidationError> {
    value.ok_or_else(|| ValidationError::new(field, message))
}

/// Blank strings become `None`.
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}
