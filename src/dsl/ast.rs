//! AST node types for the Strata modeling language.
//!
//! This module defines the abstract syntax tree produced by the parser,
//! covering:
//! - Model (root container: imports, explores, queries)
//! - Explore definitions with dimensions, measures, joins, and named queries
//! - Query definitions with staged pipelines
//! - Expressions (references, literals, operators, function calls)

use crate::dsl::span::{Span, Spanned};

// ============================================================================
// Model (Root)
// ============================================================================

/// The root AST node representing a complete model file.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// All items defined in the file, in source order.
    pub items: Vec<Spanned<Item>>,
}

/// A top-level item in the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// An import of another model file: `import "path";`
    Import(Spanned<String>),
    /// An explore definition.
    Explore(ExploreDef),
    /// A standalone query definition.
    Query(QueryDef),
}

// ============================================================================
// Explore
// ============================================================================

/// An explore definition: a named data source with fields and joins.
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreDef {
    pub name: Spanned<String>,
    /// What the explore reads from.
    pub source: Spanned<SourceRef>,
    /// Optional primary key field name.
    pub primary_key: Option<Spanned<String>>,
    pub dimensions: Vec<Spanned<DimensionDecl>>,
    pub measures: Vec<Spanned<MeasureDecl>>,
    pub joins: Vec<Spanned<JoinDecl>>,
    /// Named queries (turtles) attached to this explore.
    pub queries: Vec<Spanned<NamedQueryDecl>>,
    /// Field renames applied when extending another explore.
    pub renames: Vec<Spanned<RenameDecl>>,
    /// Keep only these inherited fields.
    pub accept: Option<Spanned<Vec<String>>>,
    /// Drop these inherited fields.
    pub except: Option<Spanned<Vec<String>>>,
    /// Source-level filters applied to every query over this explore.
    pub filters: Vec<Spanned<Expr>>,
}

/// What an explore reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    /// A physical table: `from "schema.table";`
    Table(String),
    /// Another explore: `from other;`
    Explore(String),
    /// A named query of another explore: `from other.query_name;`
    ExploreQuery(String, String),
}

/// A dimension declaration inside a `dimensions { ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionDecl {
    pub name: Spanned<String>,
    pub kind: DimensionKind,
}

/// The two forms of dimension declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionKind {
    /// A typed physical column: `status string;`
    Column(TypeName),
    /// A derived dimension: `region = upper(@status);`
    Derived(Spanned<Expr>),
}

/// A measure declaration: `total = sum(@revenue);`
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureDecl {
    pub name: Spanned<String>,
    pub expr: Spanned<Expr>,
}

/// A join declaration: `items many order_items on order_id;`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinDecl {
    /// The alias under which the target is addressable.
    pub alias: Spanned<String>,
    pub kind: JoinKindName,
    /// The target explore name.
    pub target: Spanned<String>,
    /// The join predicate; absent for cross joins.
    pub on: Option<Spanned<JoinOn>>,
}

/// Join cardinality as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKindName {
    One,
    Many,
    Cross,
}

/// The join predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOn {
    /// A foreign-key field in the source equated with the target's primary
    /// key: `on order_id`
    ForeignKey(String),
    /// An explicit predicate expression: `on (@a = items.b)`
    Expr(Expr),
}

/// A rename declaration: `new_name is old_name;`
#[derive(Debug, Clone, PartialEq)]
pub struct RenameDecl {
    pub new_name: Spanned<String>,
    pub old_name: Spanned<String>,
}

/// A named query (turtle) attached to an explore.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedQueryDecl {
    pub name: Spanned<String>,
    pub stages: Vec<Spanned<StageDecl>>,
}

// ============================================================================
// Query
// ============================================================================

/// A standalone query definition.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDef {
    pub name: Spanned<String>,
    /// The explore the pipeline starts from.
    pub from: Spanned<String>,
    pub stages: Vec<Spanned<StageDecl>>,
}

/// One stage of a query pipeline, as written.
///
/// Which blocks are present determines the stage kind: `group`/`aggregate`/
/// `nest` form a group stage, `project` a project stage, `index` an index
/// stage. Mixing is rejected during model building.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageDecl {
    pub group: Vec<Spanned<FieldPath>>,
    pub aggregate: Vec<Spanned<AggregateDecl>>,
    pub project: Vec<Spanned<FieldPath>>,
    pub index: Vec<Spanned<FieldPath>>,
    pub nests: Vec<Spanned<String>>,
    pub filters: Vec<Spanned<Expr>>,
    pub sort: Vec<Spanned<SortDecl>>,
    pub limit: Option<Spanned<u64>>,
}

/// An aggregate item in an `aggregate { ... }` block: either a reference to
/// a declared measure (`order_count;`) or an inline definition
/// (`item_count = items.count();`).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDecl {
    /// Present for inline definitions.
    pub name: Option<Spanned<String>>,
    pub expr: Spanned<Expr>,
}

/// A sort item: `total_revenue desc;`
#[derive(Debug, Clone, PartialEq)]
pub struct SortDecl {
    pub field: Spanned<FieldPath>,
    pub dir: Option<SortDir>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

// ============================================================================
// Expressions
// ============================================================================

/// A dotted field path: `items.price` is `["items", "price"]`.
pub type FieldPath = Vec<String>;

/// An expression as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A field reference, possibly dotted: `status`, `items.price`.
    /// The `@name` sibling-sigil form parses to the same node.
    Ref(FieldPath),
    /// A literal value.
    Literal(Literal),
    /// A binary operation.
    Binary {
        left: Box<Spanned<Expr>>,
        op: BinaryOp,
        right: Box<Spanned<Expr>>,
    },
    /// A unary operation.
    Unary {
        op: UnaryOp,
        expr: Box<Spanned<Expr>>,
    },
    /// A function or aggregate call: `sum(@revenue)`, `round(x, 2)`.
    /// Aggregates are classified during model building.
    Call {
        name: String,
        args: Vec<Spanned<Expr>>,
    },
    /// A path-locality aggregate call: `items.price.sum()`.
    PathCall {
        path: FieldPath,
        name: String,
        args: Vec<Spanned<Expr>>,
    },
}

/// A literal as written.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    /// The raw digits, kept as written; numeric parsing happens during
    /// model building so the AST stays trivially comparable.
    Number(String),
    Bool(bool),
    Null,
    /// A date literal: `@2023-01-05`.
    Date(String),
    /// A timestamp literal: `@2023-01-05T10:30:00`.
    Timestamp(String),
    /// A regex literal: `r'^a.*'`.
    Regex(String),
}

/// Binary operators, loosest-binding last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A type name as written in a column dimension declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    String,
    Number,
    Bool,
    Date,
    Timestamp,
}

impl Expr {
    /// Wrap an expression with a span.
    pub fn spanned(self, span: Span) -> Spanned<Expr> {
        Spanned::new(self, span)
    }
}
