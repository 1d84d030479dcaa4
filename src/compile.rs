//! End-to-end compilation from source text to SQL.
//!
//! This module provides the high-level API:
//!
//! ```text
//! Source → Parse → AST → Build Model → Compile Pipeline → Dialect SQL
//! ```
//!
//! # Example
//!
//! ```ignore
//! use strata::compile::{compile_query, CompileOptions, NoImports};
//! use strata::sql::Dialect;
//!
//! let source = r#"
//!     explore orders {
//!         from "orders";
//!         dimensions { status string; revenue number; }
//!         measures { total_revenue = sum(@revenue); }
//!     }
//!
//!     query by_status {
//!         from orders;
//!         group { status; }
//!         aggregate { total_revenue; }
//!     }
//! "#;
//!
//! let options = CompileOptions::default().with_dialect(Dialect::Postgres);
//! let result = compile_query(source, "by_status", options, &NoImports)?;
//! println!("{}", result.sql);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::dsl::{self, Diagnostic};
use crate::model::Model;
use crate::planner;
use crate::planner::ir::ResultShape;
use crate::semantic;
use crate::semantic::error::{SemanticError, SemanticErrorKind};
use crate::sql::{Dialect, SqlGenerator, UnsupportedCapability};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
///
/// Every variant is a deterministic function of the input; nothing here is
/// transient or retryable. A caller compiling many files can collect one
/// error per unit without aborting the batch.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Lexing or parsing failed; the diagnostics carry locations.
    #[error("Parse error: {}", format_diagnostics(.0))]
    Parse(Vec<Diagnostic>),

    /// Name resolution, typing, or pipeline-shape failure.
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    /// The selected dialect cannot express a required construct.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedCapability),

    /// The caller supplied an unrecognized dialect name.
    #[error("Unknown dialect: '{0}'")]
    UnknownDialect(String),

    /// The import resolver could not supply a path.
    #[error(transparent)]
    Import(#[from] ImportNotFound),

    /// Two files import each other, directly or transitively.
    #[error("Circular import: '{0}'")]
    CircularImport(String),
}

fn format_diagnostics(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// An import path the resolver could not supply.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Import not found: '{path}'")]
pub struct ImportNotFound {
    pub path: String,
}

// ============================================================================
// Import resolution
// ============================================================================

/// Maps a logical import path to source text.
///
/// Resolution is synchronous; the core never touches the filesystem or the
/// network itself.
pub trait ImportResolver {
    fn resolve(&self, path: &str) -> Result<String, ImportNotFound>;
}

/// The default resolver: refuses every import.
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve(&self, path: &str) -> Result<String, ImportNotFound> {
        Err(ImportNotFound {
            path: path.to_string(),
        })
    }
}

/// An in-memory resolver for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    sources: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }
}

impl ImportResolver for MapResolver {
    fn resolve(&self, path: &str) -> Result<String, ImportNotFound> {
        self.sources.get(path).cloned().ok_or_else(|| ImportNotFound {
            path: path.to_string(),
        })
    }
}

// ============================================================================
// Options and results
// ============================================================================

/// Compilation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub dialect: Dialect,
}

impl CompileOptions {
    /// Set the target dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the target dialect from a caller-supplied name.
    pub fn with_dialect_name(self, name: &str) -> Result<Self, CompileError> {
        let dialect = Dialect::parse(name).map_err(CompileError::UnknownDialect)?;
        Ok(self.with_dialect(dialect))
    }
}

/// A compiled query: the SQL text and the structural metadata describing
/// its result, for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub result_shape: ResultShape,
}

// ============================================================================
// Entry points
// ============================================================================

/// Parse and build a model, resolving imports.
pub fn compile_model(
    source: &str,
    resolver: &dyn ImportResolver,
) -> Result<Model, CompileError> {
    let mut importing = HashSet::new();
    compile_model_inner(source, resolver, &mut importing)
}

fn compile_model_inner(
    source: &str,
    resolver: &dyn ImportResolver,
    importing: &mut HashSet<String>,
) -> Result<Model, CompileError> {
    let parsed = dsl::parse(source);
    if parsed.has_errors() || parsed.model.is_none() {
        return Err(CompileError::Parse(parsed.diagnostics));
    }
    let ast = parsed.model.expect("checked above");

    // Resolve imports first, in source order; imported explores seed the
    // namespace the file's own definitions resolve against.
    let mut imported = BTreeMap::new();
    for item in &ast.items {
        if let dsl::ast::Item::Import(path) = &item.value {
            if !importing.insert(path.value.clone()) {
                return Err(CompileError::CircularImport(path.value.clone()));
            }
            let text = resolver.resolve(&path.value)?;
            let module = compile_model_inner(&text, resolver, importing)?;
            importing.remove(&path.value);
            imported.extend(module.explores);
        }
    }

    Ok(semantic::build_model(&ast, imported)?)
}

/// Compile one named query from source text to SQL.
pub fn compile_query(
    source: &str,
    query_name: &str,
    options: CompileOptions,
    resolver: &dyn ImportResolver,
) -> Result<CompiledQuery, CompileError> {
    let model = compile_model(source, resolver)?;
    compile_model_query(&model, query_name, options)
}

/// Compile one named query from an already-built model.
///
/// The model is read-only here; several queries (or several dialects) can
/// be compiled from the same model concurrently.
pub fn compile_model_query(
    model: &Model,
    query_name: &str,
    options: CompileOptions,
) -> Result<CompiledQuery, CompileError> {
    let query = model.query(query_name).ok_or_else(|| {
        SemanticError::new(SemanticErrorKind::UnknownQuery {
            name: query_name.to_string(),
        })
    })?;

    let pipeline = planner::compile(query)?;
    let generator = SqlGenerator::new(options.dialect.dialect());
    let sql = generator.generate(&pipeline)?;

    Ok(CompiledQuery {
        sql,
        result_shape: pipeline.result_shape,
    })
}
