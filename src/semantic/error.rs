//! Unified error types for the semantic layer.
//!
//! This module provides the error type shared by the field space, the join
//! graph, the locality resolver, and the pipeline compiler. Errors are
//! structured values: a kind, a human-readable message, and an optional
//! source span. They are deterministic functions of the input and are never
//! retried.

use std::fmt;

use crate::dsl::span::Span;

/// Result type for semantic operations.
pub type SemanticResult<T> = Result<T, SemanticError>;

/// A semantic error with an optional source location.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    /// The source span the error applies to, when known.
    pub span: Option<Span>,
}

impl SemanticError {
    /// Create an error with no source location.
    pub fn new(kind: SemanticErrorKind) -> Self {
        Self { kind, span: None }
    }

    /// Attach a source span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl From<SemanticErrorKind> for SemanticError {
    fn from(kind: SemanticErrorKind) -> Self {
        SemanticError::new(kind)
    }
}

/// The kinds of semantic failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticErrorKind {
    /// A name is already defined in the explore's own namespace.
    DuplicateName { name: String },

    /// A path segment did not resolve. `segment` is the exact unresolved
    /// segment; `path` is the full path as written.
    UnknownField { segment: String, path: String },

    /// Referenced an explore that doesn't exist.
    UnknownExplore { name: String },

    /// Referenced a named query that doesn't exist.
    UnknownQuery { name: String },

    /// A single restriction operation supplied both accept and except.
    ConflictingRestriction,

    /// An aggregate's locality is undefined because the join path crosses
    /// a cross join.
    UnresolvableLocality { path: String },

    /// A dimension's expression contains an aggregate function.
    AggregateInDimension { field: String },

    /// An aggregate appears inside another aggregate.
    NestedAggregate { field: String },

    /// A measure's expression contains no aggregate function.
    MeasureWithoutAggregate { field: String },

    /// A regex literal compared with a non-string expression.
    RegexComparison { other_type: String },

    /// A regex literal that does not compile.
    InvalidRegex { pattern: String, error: String },

    /// Operands of a comparison or arithmetic operator do not agree.
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    /// A measure field appears in a project stage's field list.
    ProjectMeasure { field: String },

    /// A pipeline has zero stages.
    EmptyPipeline { query: String },

    /// A named query's pipeline, directly or transitively, references
    /// itself.
    CircularQueryReference { name: String },

    /// A function name not present in the standard library registry.
    UnknownFunction { name: String },

    /// An operation needs the explore's primary key, but none is declared.
    MissingPrimaryKey { explore: String },

    /// A stage mixes blocks of different stage kinds.
    MixedStageBlocks { query: String },

    /// A join predicate or explore shape that cannot be expressed.
    InvalidJoin { alias: String, message: String },

    /// A reference that resolves to something unusable in this position.
    InvalidReference { message: String },
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SemanticErrorKind::*;
        match &self.kind {
            DuplicateName { name } => {
                write!(f, "Duplicate field name: '{}'", name)
            }
            UnknownField { segment, path } => {
                if segment == path {
                    write!(f, "Unknown field: '{}'", segment)
                } else {
                    write!(f, "Unknown field: '{}' (in '{}')", segment, path)
                }
            }
            UnknownExplore { name } => {
                write!(f, "Unknown explore: '{}'", name)
            }
            UnknownQuery { name } => {
                write!(f, "Unknown query: '{}'", name)
            }
            ConflictingRestriction => {
                write!(f, "accept and except cannot be combined in one restriction")
            }
            UnresolvableLocality { path } => {
                write!(
                    f,
                    "Aggregate locality for '{}' is undefined across a cross join",
                    path
                )
            }
            AggregateInDimension { field } => {
                write!(
                    f,
                    "Dimension '{}' may not contain an aggregate function",
                    field
                )
            }
            NestedAggregate { field } => {
                write!(f, "Aggregate nested inside aggregate in '{}'", field)
            }
            MeasureWithoutAggregate { field } => {
                write!(
                    f,
                    "Measure '{}' must contain an aggregate function",
                    field
                )
            }
            RegexComparison { other_type } => {
                write!(
                    f,
                    "A regex can only be compared with a string, not {}",
                    other_type
                )
            }
            InvalidRegex { pattern, error } => {
                write!(f, "Invalid regex r'{}': {}", pattern, error)
            }
            TypeMismatch { op, left, right } => {
                write!(f, "Cannot apply '{}' to {} and {}", op, left, right)
            }
            ProjectMeasure { field } => {
                write!(
                    f,
                    "Measure '{}' may not appear in a project stage",
                    field
                )
            }
            EmptyPipeline { query } => {
                write!(f, "Query '{}' has no stages", query)
            }
            CircularQueryReference { name } => {
                write!(f, "Query '{}' references itself", name)
            }
            UnknownFunction { name } => {
                write!(f, "Unknown function: '{}'", name)
            }
            MissingPrimaryKey { explore } => {
                write!(
                    f,
                    "Explore '{}' needs a primary_key for this operation",
                    explore
                )
            }
            MixedStageBlocks { query } => {
                write!(
                    f,
                    "Stage in '{}' mixes group/project/index blocks",
                    query
                )
            }
            InvalidJoin { alias, message } => {
                write!(f, "Invalid join '{}': {}", alias, message)
            }
            InvalidReference { message } => {
                write!(f, "Invalid reference: {}", message)
            }
        }
    }
}

impl std::error::Error for SemanticError {}
