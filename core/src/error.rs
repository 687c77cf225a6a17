//! Error types for qcompiler-core

use compact_str::CompactString;
use thiserror::Error;

/// The kind of failure a compilation step hit, independent of the message.
///
/// Mirrors the exhaustive error-kind list the compiler's callers rely on to
/// branch on failure class without string-matching `Display` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownField,
    UnknownRelation,
    UnknownOperator,
    InvalidArgument,
    InvalidOperatorForType,
    InvalidOption,
    DepthExceeded,
    CycleDetected,
    ResourceLimit,
    Unsupported,
    PlaceholderMismatch,
    StateCorruption,
}

/// Structured compiler error carrying the breadcrumb needed to locate the
/// offending part of the request.
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path={path})")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: CompactString,
    /// Dot-joined breadcrumb of keys from the request root.
    pub path: CompactString,
    pub model: Option<CompactString>,
    pub field: Option<CompactString>,
    pub operator: Option<CompactString>,
    pub value: Option<CompactString>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<CompactString>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: CompactString::default(),
            model: None,
            field: None,
            operator: None,
            value: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<CompactString>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<CompactString>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<CompactString>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_operator(mut self, operator: impl Into<CompactString>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<CompactString>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn unknown_field(field: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        let field = field.into();
        Self::new(ErrorKind::UnknownField, format!("unknown field `{field}`"))
            .with_field(field)
            .with_path(path)
    }

    pub fn unknown_relation(relation: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        let relation = relation.into();
        Self::new(ErrorKind::UnknownRelation, format!("unknown relation `{relation}`"))
            .with_field(relation)
            .with_path(path)
    }

    pub fn unknown_operator(op: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        let op = op.into();
        Self::new(ErrorKind::UnknownOperator, format!("unknown operator `{op}`"))
            .with_operator(op)
            .with_path(path)
    }

    pub fn invalid_operator_for_type(
        op: impl Into<CompactString>,
        field: impl Into<CompactString>,
        path: impl Into<CompactString>,
    ) -> Self {
        let op = op.into();
        let field = field.into();
        Self::new(
            ErrorKind::InvalidOperatorForType,
            format!("operator `{op}` is not valid for field `{field}`"),
        )
        .with_operator(op)
        .with_field(field)
        .with_path(path)
    }

    pub fn invalid_argument(message: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message).with_path(path)
    }

    pub fn invalid_option(key: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        let key = key.into();
        Self::new(ErrorKind::InvalidOption, format!("unrecognized option `{key}`")).with_path(path)
    }

    pub fn depth_exceeded(limit: usize, path: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::DepthExceeded, format!("depth limit {limit} exceeded")).with_path(path)
    }

    pub fn cycle_detected(path: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::CycleDetected, "cycle detected in filter tree").with_path(path)
    }

    pub fn resource_limit(message: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::ResourceLimit, message).with_path(path)
    }

    pub fn unsupported(message: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn placeholder_mismatch(message: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::PlaceholderMismatch, message)
    }

    pub fn state_corruption(message: impl Into<CompactString>) -> Self {
        Self::new(ErrorKind::StateCorruption, message)
    }
}

pub type Result<T> = core::result::Result<T, CompileError>;
