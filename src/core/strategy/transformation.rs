#![allow(clippy::result_large_err)] // Transformation APIs return AppError so callers get one error type across file and lookup failures.

//! Ordered registration parameters and the Elastix-style parameter file codec.
//!
//! A parameter file is a sequence of `(Key value...)` entries. Entries may
//! share a line, `//` starts a comment outside of strings, and values are kept
//! exactly as written so the engine receives them unchanged.

use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, TransformationKind};
use crate::utils::{atomic_write, compute_sha256_hex};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parameter naming the engine transform model; used to infer the kind.
pub const TRANSFORM_PARAMETER: &str = "Transform";
/// Parameter selecting the engine's output image format.
pub const RESULT_IMAGE_FORMAT_PARAMETER: &str = "ResultImageFormat";

/// Syntax errors found while reading a parameter file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterFileError {
    #[error("line {line}: unbalanced parenthesis")]
    UnbalancedParenthesis { line: usize },
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },
    #[error("line {line}: entry has no key")]
    EmptyKey { line: usize },
    #[error("line {line}: parameter '{key}' has no value")]
    MissingValue { line: usize, key: String },
    #[error("line {line}: invalid parameter name '{key}'")]
    InvalidKey { line: usize, key: String },
    #[error("line {line}: unexpected text '{text}' outside of an entry")]
    StrayText { line: usize, text: String },
    #[error("line {line}: duplicate parameter '{key}'")]
    DuplicateKey { line: usize, key: String },
}

impl ParameterFileError {
    fn into_app_error(self, origin: &str) -> AppError {
        AppError::new(
            ErrorCategory::ParseError,
            format!("malformed parameter file {}: {}", origin, self),
        )
        .with_code("RS-PARAM-002")
    }
}

/// Named, ordered set of registration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformation {
    name: String,
    kind: TransformationKind,
    parameters: IndexMap<String, String>,
}

impl Transformation {
    pub fn new(kind: TransformationKind) -> Self {
        Self {
            name: String::new(),
            kind,
            parameters: IndexMap::new(),
        }
    }

    pub fn with_name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    /// Load a transformation from a parameter file, naming it after the file stem.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let mut transformation = Transformation::default();
        transformation.load_from_file(path)?;
        Ok(transformation)
    }

    /// Parse parameter text without touching the filesystem.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let parameters =
            parse_parameter_text(text).map_err(|err| err.into_app_error("<inline>"))?;
        let mut transformation = Transformation {
            parameters,
            ..Transformation::default()
        };
        transformation.infer_kind();
        Ok(transformation)
    }

    /// Replace the parameter set with the contents of `path`.
    ///
    /// Missing, unreadable, and malformed files all fail with a parse error and
    /// leave the current parameters untouched.
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("cannot read parameter file {}: {}", path.display(), err),
            )
            .with_code("RS-PARAM-001")
        })?;
        let parameters = parse_parameter_text(&text)
            .map_err(|err| err.into_app_error(&path.display().to_string()))?;

        self.parameters = parameters;
        if let Some(stem) = path.file_stem() {
            self.name = stem.to_string_lossy().into_owned();
        }
        self.infer_kind();
        tracing::debug!(
            path = %path.display(),
            parameters = self.parameters.len(),
            kind = %self.kind,
            "loaded parameter file"
        );
        Ok(())
    }

    /// Write the parameters in insertion order to `path`.
    pub fn save_to_file(&self, path: &Path) -> Result<(), AppError> {
        atomic_write(path, self.to_parameter_text().as_bytes()).map_err(|mut err| {
            err.add_context("parameter_file", &path.display().to_string());
            err
        })
    }

    /// Insert `key`, or overwrite its value in place.
    ///
    /// The pair must serialize to exactly one `(key value)` entry that parses
    /// back unchanged; anything else is rejected and the set is left as is.
    pub fn set_parameter<K: Into<String>, V: Into<String>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(), AppError> {
        let key = key.into();
        let value = value.into();
        validate_entry(&key, &value)?;
        self.parameters.insert(key, value);
        Ok(())
    }

    pub fn get_parameter(&self, key: &str) -> Result<&str, AppError> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| missing_key(key))
    }

    /// Remove `key`, keeping the order of the remaining parameters.
    pub fn remove_parameter(&mut self, key: &str) -> Result<String, AppError> {
        self.parameters
            .shift_remove(key)
            .ok_or_else(|| missing_key(key))
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }

    /// Iterate `(key, value)` pairs in file order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Split a value into its whitespace-separated items with quotes removed.
    pub fn parameter_tokens(&self, key: &str) -> Result<Vec<String>, AppError> {
        self.get_parameter(key).map(split_value_tokens)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransformationKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: TransformationKind) {
        self.kind = kind;
    }

    /// Image format the engine will write, if the parameters choose one.
    pub fn result_image_format(&self) -> Option<String> {
        self.parameter_tokens(RESULT_IMAGE_FORMAT_PARAMETER)
            .ok()
            .and_then(|tokens| tokens.into_iter().next())
    }

    /// Serialized parameter file contents.
    pub fn to_parameter_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.parameters {
            out.push('(');
            out.push_str(key);
            out.push(' ');
            out.push_str(value);
            out.push_str(")\n");
        }
        out
    }

    /// SHA-256 of the serialized parameters; changes whenever a value does.
    pub fn fingerprint(&self) -> String {
        compute_sha256_hex(self.to_parameter_text().as_bytes())
    }

    fn infer_kind(&mut self) {
        if let Some(model) = self.parameters.get(TRANSFORM_PARAMETER) {
            let inferred = TransformationKind::from_engine_transform(model);
            if inferred != TransformationKind::Custom {
                self.kind = inferred;
            }
        }
    }
}

fn missing_key(key: &str) -> AppError {
    AppError::new(
        ErrorCategory::KeyNotFound,
        format!("parameter '{}' not found", key),
    )
    .with_code("RS-KEY-001")
    .with_context("key", key)
}

/// Check that `(key value)` is a single well-formed entry.
fn validate_entry(key: &str, value: &str) -> Result<(), AppError> {
    let invalid = |reason: &str| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("invalid parameter ({} {}): {}", key, value, reason),
        )
        .with_code("RS-PARAM-002")
        .with_context("key", key)
    };
    if key.is_empty() || key.contains(|c: char| c.is_whitespace() || matches!(c, '"' | '(' | ')')) {
        return Err(invalid("name must be a single word without quotes or parentheses"));
    }
    if value.contains(['\n', '\r']) {
        return Err(invalid("value must fit on one line"));
    }
    let parsed = parse_parameter_text(&format!("({} {})", key, value))
        .map_err(|err| invalid(&err.to_string()))?;
    match parsed.get_index(0) {
        Some((parsed_key, parsed_value))
            if parsed.len() == 1 && parsed_key == key && parsed_value == value =>
        {
            Ok(())
        }
        _ => Err(invalid("value must be one entry without unquoted parentheses")),
    }
}

fn parse_parameter_text(text: &str) -> Result<IndexMap<String, String>, ParameterFileError> {
    let mut parameters = IndexMap::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line = index + 1;
        for entry in split_line_entries(raw_line, line)? {
            let (key, value) = split_entry(&entry, line)?;
            if parameters.contains_key(&key) {
                return Err(ParameterFileError::DuplicateKey { line, key });
            }
            parameters.insert(key, value);
        }
    }
    Ok(parameters)
}

/// Extract the bodies of all `( ... )` entries on one line.
fn split_line_entries(raw_line: &str, line: usize) -> Result<Vec<String>, ParameterFileError> {
    let mut entries = Vec::new();
    let mut chars = raw_line.char_indices().peekable();
    let mut body: Option<String> = None;
    let mut in_string = false;

    while let Some((offset, ch)) = chars.next() {
        match body.as_mut() {
            None => {
                if ch.is_whitespace() {
                    continue;
                }
                if ch == '/' && matches!(chars.peek(), Some((_, '/'))) {
                    break;
                }
                if ch == '(' {
                    body = Some(String::new());
                    continue;
                }
                if ch == ')' {
                    return Err(ParameterFileError::UnbalancedParenthesis { line });
                }
                return Err(ParameterFileError::StrayText {
                    line,
                    text: raw_line[offset..].trim().to_string(),
                });
            }
            Some(current) => {
                if in_string {
                    if ch == '"' {
                        in_string = false;
                    }
                    current.push(ch);
                    continue;
                }
                match ch {
                    '"' => {
                        in_string = true;
                        current.push(ch);
                    }
                    ')' => {
                        if let Some(done) = body.take() {
                            entries.push(done);
                        }
                    }
                    '(' => return Err(ParameterFileError::UnbalancedParenthesis { line }),
                    _ => current.push(ch),
                }
            }
        }
    }

    if in_string {
        return Err(ParameterFileError::UnterminatedString { line });
    }
    if body.is_some() {
        return Err(ParameterFileError::UnbalancedParenthesis { line });
    }
    Ok(entries)
}

fn split_entry(entry: &str, line: usize) -> Result<(String, String), ParameterFileError> {
    let trimmed = entry.trim();
    let (key, value) = match trimmed.find(char::is_whitespace) {
        Some(split) => (&trimmed[..split], trimmed[split..].trim()),
        None => (trimmed, ""),
    };
    if key.is_empty() {
        return Err(ParameterFileError::EmptyKey { line });
    }
    if key.contains('"') {
        return Err(ParameterFileError::InvalidKey {
            line,
            key: key.to_string(),
        });
    }
    if value.is_empty() {
        return Err(ParameterFileError::MissingValue {
            line,
            key: key.to_string(),
        });
    }
    Ok((key.to_string(), value.to_string()))
}

fn split_value_tokens(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut quoted = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_string = !in_string;
                quoted = true;
            }
            c if c.is_whitespace() && !in_string => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}
