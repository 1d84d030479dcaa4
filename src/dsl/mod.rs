//! Parser for the Strata modeling language.
//!
//! This module provides parsing and AST types for the Strata language, which
//! describes semantic data models and queries over them:
//!
//! - **Explores**: named data sources (tables, other explores, or queries)
//!   with dimensions, measures, joins, and named queries
//! - **Queries**: staged pipelines (group/aggregate, project, index) over an
//!   explore, chained with `->`
//! - **Imports**: cross-file model composition
//!
//! # Example
//!
//! ```ignore
//! use strata::dsl;
//!
//! let source = r#"
//!     explore orders {
//!         from "raw.orders";
//!         primary_key order_id;
//!         dimensions {
//!             order_id number;
//!             status string;
//!             revenue number;
//!         }
//!         measures { order_count = count(); }
//!         joins { items many order_items on order_id; }
//!     }
//!
//!     query by_status {
//!         from orders;
//!         group { status; }
//!         aggregate { order_count; }
//!     }
//! "#;
//!
//! let result = dsl::parse(source);
//! if let Some(model) = result.model {
//!     println!("parsed {} items", model.items.len());
//! }
//! for diag in &result.diagnostics {
//!     eprintln!("{}", diag);
//! }
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::*;
pub use span::{Span, Spanned};

/// Result of parsing a source file.
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed model, if parsing succeeded.
    pub model: Option<Model>,
    /// Diagnostic messages (errors and warnings).
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseResult {
    /// Returns true if parsing succeeded without errors.
    pub fn is_ok(&self) -> bool {
        self.model.is_some()
            && !self
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error)
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Returns only the error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// A diagnostic message with source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The span in the source where the diagnostic applies.
    pub span: Span,
    /// The severity level.
    pub severity: Severity,
    /// The diagnostic message.
    pub message: String,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// Render this diagnostic as a source-annotated report.
    ///
    /// `source_name` labels the file in the output; `source` is the full
    /// source text the span refers to.
    pub fn to_report(&self, source_name: &str, source: &str) -> String {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let mut buf = Vec::new();
        let _ = Report::build(kind, (source_name, self.span.clone()))
            .with_message(&self.message)
            .with_label(
                Label::new((source_name, self.span.clone()))
                    .with_message(&self.message)
                    .with_color(color),
            )
            .finish()
            .write((source_name, Source::from(source)), &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A fatal error that prevents compilation.
    Error,
    /// A warning that doesn't prevent compilation.
    Warning,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} (at {:?})", level, self.message, self.span)
    }
}

impl std::error::Error for Diagnostic {}

/// Parse a source string.
///
/// Returns a `ParseResult` containing the parsed model (if successful) and
/// any diagnostic messages.
pub fn parse(source: &str) -> ParseResult {
    use chumsky::error::Rich;
    use chumsky::input::Input;
    use chumsky::span::SimpleSpan;
    use chumsky::span::Span as _;
    use chumsky::Parser as _;

    // Step 1: Lexical analysis
    let (tokens, lex_errs) = lexer::lexer().parse(source).into_output_errors();

    let mut diagnostics: Vec<Diagnostic> = lex_errs
        .into_iter()
        .map(|e: Rich<'_, char>| {
            let span = e.span();
            Diagnostic::error(span.start()..span.end(), e.to_string())
        })
        .collect();

    let tokens: Vec<(lexer::Token<'_>, SimpleSpan)> = match tokens {
        Some(t) => t,
        None => {
            return ParseResult {
                model: None,
                diagnostics,
            };
        }
    };

    // Step 2: Parsing
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens
        .as_slice()
        .map(eoi, |(tok, span): &(lexer::Token<'_>, SimpleSpan)| {
            (tok, span)
        });

    let (model, parse_errs) = parser::parser().parse(token_stream).into_output_errors();

    diagnostics.extend(parse_errs.into_iter().map(
        |e: Rich<'_, lexer::Token<'_>, SimpleSpan>| {
            let span = e.span();
            Diagnostic::error(span.start()..span.end(), e.to_string())
        },
    ));

    ParseResult { model, diagnostics }
}
