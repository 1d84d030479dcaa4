//! Typed expression nodes.
//!
//! This is the dialect-agnostic expression tree shared by field definitions,
//! filters, and the compiled IR. Model building resolves `FieldRef` nodes
//! against a field space; SQL generation renders `Column` nodes through a
//! dialect.

use serde::{Deserialize, Serialize};

use super::types::{ExtractUnit, Timeframe, ValueType};

// =============================================================================
// Core Expression Type
// =============================================================================

/// A typed expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A model-level field reference, possibly dotted through join aliases.
    /// Present before resolution; the pipeline compiler replaces these.
    FieldRef { path: Vec<String> },

    /// A physical column reference: entity alias + column name.
    /// This is what resolution produces and what SQL generation consumes.
    Column {
        entity: Option<String>,
        column: String,
    },

    /// A literal value.
    Literal(Literal),

    /// A binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// A unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// A scalar function call, resolved against the function registry.
    Call { name: String, args: Vec<Expr> },

    /// An aggregate computation.
    Aggregate(AggregateExpr),

    /// Date/timestamp truncation to a timeframe.
    Trunc {
        expr: Box<Expr>,
        unit: Timeframe,
    },

    /// Date/timestamp component extraction.
    Extract {
        expr: Box<Expr>,
        unit: ExtractUnit,
    },

    /// Date/timestamp interval arithmetic.
    TimeAdd {
        expr: Box<Expr>,
        negative: bool,
        amount: Box<Expr>,
        unit: Timeframe,
    },

    /// A cast, optionally safe (returning NULL on conversion failure).
    Cast {
        expr: Box<Expr>,
        to: ValueType,
        safe: bool,
    },
}

/// An aggregate call with its locality as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    /// The aggregated expression; `None` for bare `count()`.
    pub input: Option<Box<Expr>>,
    /// How the locality was written.
    pub locality: LocalityHint,
}

/// The locality of an aggregate as written in the source.
///
/// `sum(items.price)` aggregates with respect to the calling context;
/// `items.price.sum()` aggregates with respect to the node owning the
/// field. The two coincide when the calling context owns the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalityHint {
    /// Function form: locality is the node the expression is written on.
    CallingContext,
    /// Path form: locality is the named join path.
    Path(Vec<String>),
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    /// The SQL function name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunc::Count | AggregateFunc::CountDistinct => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }

    /// Parse an aggregate function name as written in the source.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateFunc::Count),
            "count_distinct" => Some(AggregateFunc::CountDistinct),
            "sum" => Some(AggregateFunc::Sum),
            "avg" => Some(AggregateFunc::Avg),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            _ => None,
        }
    }

    /// Whether join fan-out can change this aggregate's result.
    ///
    /// Duplicate rows do not move an extremum, and COUNT(DISTINCT ...) is
    /// already distinct, so none of these need a dedup key.
    pub fn fanout_sensitive(&self) -> bool {
        !matches!(
            self,
            AggregateFunc::Min | AggregateFunc::Max | AggregateFunc::CountDistinct
        )
    }

    /// The result type of the aggregate over an input of `input_type`.
    pub fn result_type(&self, input_type: Option<&ValueType>) -> ValueType {
        match self {
            AggregateFunc::Count | AggregateFunc::CountDistinct => ValueType::Number,
            AggregateFunc::Sum | AggregateFunc::Avg => ValueType::Number,
            AggregateFunc::Min | AggregateFunc::Max => {
                input_type.cloned().unwrap_or(ValueType::Number)
            }
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Date in `YYYY-MM-DD` form.
    Date(String),
    /// Timestamp in `YYYY-MM-DD HH:MM:SS` form.
    Timestamp(String),
    /// A regex pattern, validated at model-build time.
    Regex(String),
    Null,
}

impl Literal {
    /// The value type of this literal.
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::String(_) => ValueType::String,
            Literal::Int(_) | Literal::Float(_) => ValueType::Number,
            Literal::Bool(_) => ValueType::Bool,
            Literal::Date(_) => ValueType::Date,
            Literal::Timestamp(_) => ValueType::Timestamp,
            Literal::Regex(_) => ValueType::Regex,
            Literal::Null => ValueType::String,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
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

impl BinaryOp {
    /// The SQL operator text.
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Whether this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Expr {
    /// Create an unqualified column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column {
            entity: None,
            column: name.into(),
        }
    }

    /// Create a qualified column reference (entity.column).
    pub fn qualified_column(entity: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            entity: Some(entity.into()),
            column: column.into(),
        }
    }

    /// Create a field reference.
    pub fn field_ref(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Expr::FieldRef {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an integer literal.
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    /// Create a string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    /// Create a binary operation.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Whether any aggregate call appears in this expression.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate(_) => true,
            Expr::FieldRef { .. } | Expr::Column { .. } | Expr::Literal(_) => false,
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Unary { expr, .. } => expr.contains_aggregate(),
            Expr::Call { args, .. } => args.iter().any(|a| a.contains_aggregate()),
            Expr::Trunc { expr, .. } | Expr::Extract { expr, .. } => expr.contains_aggregate(),
            Expr::TimeAdd { expr, amount, .. } => {
                expr.contains_aggregate() || amount.contains_aggregate()
            }
            Expr::Cast { expr, .. } => expr.contains_aggregate(),
        }
    }

    /// Visit every aggregate expression in this tree.
    pub fn for_each_aggregate<'a>(&'a self, f: &mut impl FnMut(&'a AggregateExpr)) {
        match self {
            Expr::Aggregate(agg) => f(agg),
            Expr::FieldRef { .. } | Expr::Column { .. } | Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.for_each_aggregate(f);
                right.for_each_aggregate(f);
            }
            Expr::Unary { expr, .. } => expr.for_each_aggregate(f),
            Expr::Call { args, .. } => {
                for a in args {
                    a.for_each_aggregate(f);
                }
            }
            Expr::Trunc { expr, .. } | Expr::Extract { expr, .. } => expr.for_each_aggregate(f),
            Expr::TimeAdd { expr, amount, .. } => {
                expr.for_each_aggregate(f);
                amount.for_each_aggregate(f);
            }
            Expr::Cast { expr, .. } => expr.for_each_aggregate(f),
        }
    }
}
