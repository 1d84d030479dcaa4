//! Model building: lowering the AST into typed explores and queries.
//!
//! The builder walks the parsed file in order, constructing each explore's
//! field space incrementally (define, rename, restrict), wiring joins, and
//! lowering expressions into the typed tree. Field definitions are fully
//! typed here; stage bodies are lowered structurally and resolved per stage
//! by the pipeline compiler, which knows each stage's input shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dsl::ast;
use crate::dsl::span::{Span, Spanned};
use crate::functions;
use crate::model::explore::{Explore, ExploreSource, Join, JoinKind, JoinOn};
use crate::model::expr::{AggregateExpr, AggregateFunc, BinaryOp, Expr, Literal, LocalityHint, UnaryOp};
use crate::model::field::{DimensionDef, FieldDef, MeasureDef, TurtleDef};
use crate::model::query::{
    AggregateItem, GroupStage, IndexStage, NestRef, OrderDir, OrderItem, ProjectStage,
    QueryPipeline, Stage,
};
use crate::model::types::{ExtractUnit, Timeframe, ValueType};
use crate::model::{Model, ModelQuery};
use crate::semantic::space::FieldSpace;

use super::error::{SemanticError, SemanticErrorKind, SemanticResult};

/// Build a typed model from a parsed file.
///
/// `imported` seeds the explore namespace with explores from resolved
/// imports; the file's own definitions are added in source order and may
/// reference them.
pub fn build_model(
    file: &ast::Model,
    imported: BTreeMap<String, Arc<Explore>>,
) -> SemanticResult<Model> {
    let mut builder = ModelBuilder {
        explores: imported,
        queries: BTreeMap::new(),
    };
    for item in &file.items {
        match &item.value {
            // Imports are resolved by the compile driver before building.
            ast::Item::Import(_) => {}
            ast::Item::Explore(def) => builder.build_explore(def, &item.span)?,
            ast::Item::Query(def) => builder.build_query(def, &item.span)?,
        }
    }
    Ok(Model {
        explores: builder.explores,
        queries: builder.queries,
    })
}

struct ModelBuilder {
    explores: BTreeMap<String, Arc<Explore>>,
    queries: BTreeMap<String, ModelQuery>,
}

/// Attach a span to an error that doesn't have one yet.
fn at<T>(result: SemanticResult<T>, span: &Span) -> SemanticResult<T> {
    result.map_err(|e| {
        if e.span.is_none() {
            e.with_span(span.clone())
        } else {
            e
        }
    })
}

impl ModelBuilder {
    fn lookup_explore(&self, name: &str) -> SemanticResult<Arc<Explore>> {
        self.explores.get(name).cloned().ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::UnknownExplore {
                name: name.to_string(),
            })
        })
    }

    // =========================================================================
    // Explores
    // =========================================================================

    fn build_explore(&mut self, def: &ast::ExploreDef, span: &Span) -> SemanticResult<()> {
        let name = def.name.value.clone();

        // Resolve the source and the inherited namespace
        let (source, mut space) = match &def.source.value {
            ast::SourceRef::Table(table) => {
                (ExploreSource::Table(table.clone()), FieldSpace::new())
            }
            ast::SourceRef::Explore(parent_name) => {
                let parent = at(self.lookup_explore(parent_name), &def.source.span)?;
                let space = parent.space.clone();
                (ExploreSource::Extends(parent), space)
            }
            ast::SourceRef::ExploreQuery(parent_name, query_name) => {
                let parent = at(self.lookup_explore(parent_name), &def.source.span)?;
                let turtle = parent
                    .space
                    .lookup(query_name)
                    .ok_or_else(|| {
                        SemanticError::new(SemanticErrorKind::UnknownQuery {
                            name: query_name.clone(),
                        })
                        .with_span(def.source.span.clone())
                    })?;
                let pipeline = match turtle.definition() {
                    FieldDef::Query(t) => t.pipeline.clone(),
                    _ => {
                        return Err(SemanticError::new(SemanticErrorKind::InvalidReference {
                            message: format!("'{}' is not a query", query_name),
                        })
                        .with_span(def.source.span.clone()))
                    }
                };
                let space = at(
                    query_output_space(&parent, &pipeline),
                    &def.source.span,
                )?;
                (
                    ExploreSource::Query {
                        base: parent,
                        pipeline,
                    },
                    space,
                )
            }
        };

        // Renames: each produces a fresh namespace value over the old one
        for rename in &def.renames {
            space = at(
                space.rename(&rename.value.old_name.value, &rename.value.new_name.value),
                &rename.span,
            )?;
        }

        // Restriction: accept and except are mutually exclusive
        let accept = def.accept.as_ref().map(|a| a.value.clone());
        let except = def.except.as_ref().map(|e| e.value.clone());
        let restriction_span = def
            .accept
            .as_ref()
            .map(|a| a.span.clone())
            .or_else(|| def.except.as_ref().map(|e| e.span.clone()))
            .unwrap_or_else(|| span.clone());
        space = at(space.restricted(accept, except), &restriction_span)?;

        // Own dimensions
        for dim in &def.dimensions {
            let field = at(self.lower_dimension(&space, &dim.value), &dim.span)?;
            at(space.define(field), &dim.span)?;
        }

        // Own measures
        for measure in &def.measures {
            let field = at(self.lower_measure(&space, &measure.value), &measure.span)?;
            at(space.define(field), &measure.span)?;
        }

        // The primary key may be inherited from an extended explore
        let primary_key = def
            .primary_key
            .as_ref()
            .map(|k| k.value.clone())
            .or_else(|| match &source {
                ExploreSource::Extends(parent) => parent.primary_key.clone(),
                _ => None,
            });

        // Joins: inherited edges first (their aliases are already in the
        // cloned namespace), then the explore's own
        let mut joins = match &source {
            ExploreSource::Extends(parent) => parent.joins.clone(),
            _ => Vec::new(),
        };
        for join_decl in &def.joins {
            let join = at(
                self.lower_join(&name, primary_key.as_deref(), &join_decl.value),
                &join_decl.span,
            )?;
            at(
                space.add_join(join.alias.clone(), Arc::clone(&join.target)),
                &join_decl.span,
            )?;
            joins.push(join);
        }

        // Named queries (turtles)
        for query in &def.queries {
            let pipeline = at(
                self.lower_stages(&query.value.stages, &query.value.name.value),
                &query.span,
            )?;
            at(
                space.define(FieldDef::Query(TurtleDef {
                    name: query.value.name.value.clone(),
                    pipeline,
                })),
                &query.span,
            )?;
        }

        // Source-level filters
        let mut filters = Vec::new();
        for filter in &def.filters {
            filters.push(at(lower_expr(&filter.value), &filter.span)?);
        }

        let explore = Arc::new(Explore {
            name: name.clone(),
            source,
            primary_key,
            space,
            joins,
            filters,
        });
        self.explores.insert(name, explore);
        Ok(())
    }

    fn lower_dimension(
        &self,
        space: &FieldSpace,
        decl: &ast::DimensionDecl,
    ) -> SemanticResult<FieldDef> {
        let name = decl.name.value.clone();
        match &decl.kind {
            ast::DimensionKind::Column(ty) => Ok(FieldDef::Dimension(DimensionDef {
                value_type: lower_type_name(*ty),
                expr: Expr::column(&name),
                name,
            })),
            ast::DimensionKind::Derived(ast_expr) => {
                let expr = lower_expr(&ast_expr.value)?;
                if expr.contains_aggregate() || references_measure(space, &expr) {
                    return Err(
                        SemanticErrorKind::AggregateInDimension { field: name }.into()
                    );
                }
                let value_type = type_of(space, &expr)?;
                Ok(FieldDef::Dimension(DimensionDef {
                    name,
                    value_type,
                    expr,
                }))
            }
        }
    }

    fn lower_measure(
        &self,
        space: &FieldSpace,
        decl: &ast::MeasureDecl,
    ) -> SemanticResult<FieldDef> {
        let name = decl.name.value.clone();
        let expr = lower_expr(&decl.expr.value)?;

        check_no_nested_aggregates(&expr, &name)?;
        let agg = measure_agg_kind(space, &expr).ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::MeasureWithoutAggregate {
                field: name.clone(),
            })
        })?;
        let value_type = type_of(space, &expr)?;

        Ok(FieldDef::Measure(MeasureDef {
            name,
            value_type,
            agg,
            expr,
        }))
    }

    fn lower_join(
        &self,
        source_name: &str,
        source_pk: Option<&str>,
        decl: &ast::JoinDecl,
    ) -> SemanticResult<Join> {
        let target = self.lookup_explore(&decl.target.value)?;
        let kind = match decl.kind {
            ast::JoinKindName::One => JoinKind::One,
            ast::JoinKindName::Many => JoinKind::Many,
            ast::JoinKindName::Cross => JoinKind::Cross,
        };

        let on = match (&decl.on, kind) {
            (None, JoinKind::Cross) => None,
            (Some(_), JoinKind::Cross) => {
                return Err(SemanticErrorKind::InvalidJoin {
                    alias: decl.alias.value.clone(),
                    message: "cross joins take no predicate".to_string(),
                }
                .into())
            }
            (None, _) => {
                return Err(SemanticErrorKind::InvalidJoin {
                    alias: decl.alias.value.clone(),
                    message: "missing 'on' clause".to_string(),
                }
                .into())
            }
            (Some(on), _) => match &on.value {
                ast::JoinOn::ForeignKey(fk) => {
                    // The foreign key lives on the many side: the target
                    // for a `many` join, the source for a `one` join. The
                    // other side contributes its primary key.
                    let pk = match kind {
                        JoinKind::One => target.primary_key.clone().ok_or_else(|| {
                            SemanticError::new(SemanticErrorKind::MissingPrimaryKey {
                                explore: target.name.clone(),
                            })
                        })?,
                        _ => source_pk
                            .map(str::to_string)
                            .ok_or_else(|| {
                                SemanticError::new(SemanticErrorKind::MissingPrimaryKey {
                                    explore: source_name.to_string(),
                                })
                            })?,
                    };
                    Some(JoinOn::ForeignKey {
                        foreign_key: fk.clone(),
                        primary_key: pk,
                    })
                }
                ast::JoinOn::Expr(e) => Some(JoinOn::Expr(lower_expr(e)?)),
            },
        };

        Ok(Join {
            alias: decl.alias.value.clone(),
            kind,
            target,
            on,
        })
    }

    // =========================================================================
    // Queries and stages
    // =========================================================================

    fn build_query(&mut self, def: &ast::QueryDef, span: &Span) -> SemanticResult<()> {
        let explore = at(self.lookup_explore(&def.from.value), &def.from.span)?;
        let pipeline = at(self.lower_stages(&def.stages, &def.name.value), span)?;
        let name = def.name.value.clone();
        self.queries.insert(
            name.clone(),
            ModelQuery {
                name,
                explore,
                pipeline,
            },
        );
        Ok(())
    }

    fn lower_stages(
        &self,
        decls: &[Spanned<ast::StageDecl>],
        query_name: &str,
    ) -> SemanticResult<QueryPipeline> {
        let mut stages = Vec::new();
        for decl in decls {
            if let Some(stage) = at(self.lower_stage(&decl.value, query_name), &decl.span)? {
                stages.push(stage);
            }
        }
        Ok(QueryPipeline::new(stages))
    }

    fn lower_stage(
        &self,
        decl: &ast::StageDecl,
        query_name: &str,
    ) -> SemanticResult<Option<Stage>> {
        let grouping = !decl.group.is_empty() || !decl.aggregate.is_empty() || !decl.nests.is_empty();
        let projecting = !decl.project.is_empty();
        let indexing = !decl.index.is_empty();

        if [grouping, projecting, indexing].iter().filter(|b| **b).count() > 1 {
            return Err(SemanticErrorKind::MixedStageBlocks {
                query: query_name.to_string(),
            }
            .into());
        }

        let filters = decl
            .filters
            .iter()
            .map(|f| at(lower_expr(&f.value), &f.span))
            .collect::<SemanticResult<Vec<_>>>()?;
        let order_by = decl
            .sort
            .iter()
            .map(|s| OrderItem {
                field: s.value.field.value.clone(),
                dir: match s.value.dir {
                    Some(ast::SortDir::Desc) => OrderDir::Desc,
                    _ => OrderDir::Asc,
                },
            })
            .collect::<Vec<_>>();
        let limit = decl.limit.as_ref().map(|l| l.value);

        if indexing {
            return Ok(Some(Stage::Index(IndexStage {
                fields: decl.index.iter().map(|p| p.value.clone()).collect(),
            })));
        }

        if projecting {
            return Ok(Some(Stage::Project(ProjectStage {
                fields: decl.project.iter().map(|p| p.value.clone()).collect(),
                filters,
                order_by,
                limit,
            })));
        }

        if !grouping && filters.is_empty() && order_by.is_empty() && limit.is_none() {
            // An entirely empty stage contributes nothing.
            return Ok(None);
        }

        let mut aggregates = Vec::new();
        for item in &decl.aggregate {
            aggregates.push(at(self.lower_aggregate_item(&item.value), &item.span)?);
        }

        Ok(Some(Stage::Group(GroupStage {
            group: decl.group.iter().map(|p| p.value.clone()).collect(),
            aggregates,
            nests: decl
                .nests
                .iter()
                .map(|n| NestRef {
                    name: n.value.clone(),
                })
                .collect(),
            filters,
            order_by,
            limit,
        })))
    }

    fn lower_aggregate_item(&self, decl: &ast::AggregateDecl) -> SemanticResult<AggregateItem> {
        let expr = lower_expr(&decl.expr.value)?;
        let name = match (&decl.name, &decl.expr.value) {
            (Some(n), _) => n.value.clone(),
            // A bare reference names its output after the last segment
            (None, ast::Expr::Ref(path)) => path.last().cloned().unwrap_or_default(),
            (None, _) => {
                return Err(SemanticErrorKind::InvalidReference {
                    message: "inline aggregate needs a name: use `name is <expr>`".to_string(),
                }
                .into())
            }
        };
        Ok(AggregateItem { name, expr })
    }
}

// =============================================================================
// Expression lowering
// =============================================================================

/// Lower an AST expression into the typed tree.
///
/// Structural work only: aggregate classification, special time/cast forms,
/// function registry arity checks, regex validation, literal parsing. Field
/// references stay as paths; the pipeline compiler resolves them per stage.
pub fn lower_expr(expr: &ast::Expr) -> SemanticResult<Expr> {
    match expr {
        ast::Expr::Ref(path) => Ok(Expr::FieldRef { path: path.clone() }),
        ast::Expr::Literal(lit) => Ok(Expr::Literal(lower_literal(lit)?)),
        ast::Expr::Unary { op, expr } => Ok(Expr::Unary {
            op: match op {
                ast::UnaryOp::Neg => UnaryOp::Neg,
                ast::UnaryOp::Not => UnaryOp::Not,
            },
            expr: Box::new(lower_expr(&expr.value)?),
        }),
        ast::Expr::Binary { left, op, right } => Ok(Expr::Binary {
            left: Box::new(lower_expr(&left.value)?),
            op: lower_binary_op(*op),
            right: Box::new(lower_expr(&right.value)?),
        }),
        ast::Expr::Call { name, args } => lower_call(name, args),
        ast::Expr::PathCall { path, name, args } => {
            let func = AggregateFunc::parse(name).ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::UnknownFunction {
                    name: format!("{}.{}", path.join("."), name),
                })
            })?;
            if !args.is_empty() {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!(
                        "path-form aggregate '{}.{}()' takes no arguments",
                        path.join("."),
                        name
                    ),
                }
                .into());
            }
            // The path may end at a field or at a join node; the pipeline
            // compiler splits it once it can resolve names.
            Ok(Expr::Aggregate(AggregateExpr {
                func,
                input: None,
                locality: LocalityHint::Path(path.clone()),
            }))
        }
    }
}

fn lower_call(name: &str, args: &[Spanned<ast::Expr>]) -> SemanticResult<Expr> {
    // Aggregates
    if let Some(func) = AggregateFunc::parse(name) {
        let input = match args.len() {
            0 if func == AggregateFunc::Count => None,
            1 => Some(Box::new(lower_expr(&args[0].value)?)),
            _ => {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!("{}() takes {} argument", name, expected_agg_args(func)),
                }
                .into())
            }
        };
        return Ok(Expr::Aggregate(AggregateExpr {
            func,
            input,
            locality: LocalityHint::CallingContext,
        }));
    }

    // Time and cast special forms
    match name {
        "trunc" => {
            let (expr, unit) = time_unit_args(name, args)?;
            let unit = Timeframe::parse(&unit).ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::InvalidReference {
                    message: format!("unknown timeframe '{}' in trunc()", unit),
                })
            })?;
            return Ok(Expr::Trunc {
                expr: Box::new(expr),
                unit,
            });
        }
        "extract" => {
            let (expr, unit) = time_unit_args(name, args)?;
            let unit = parse_extract_unit(&unit).ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::InvalidReference {
                    message: format!("unknown extraction unit '{}' in extract()", unit),
                })
            })?;
            return Ok(Expr::Extract {
                expr: Box::new(expr),
                unit,
            });
        }
        "date_add" | "date_sub" => {
            if args.len() != 3 {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!("{}() takes (expr, amount, unit)", name),
                }
                .into());
            }
            let unit_name = unit_ident(&args[2].value).ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::InvalidReference {
                    message: format!("{}() unit must be a timeframe name", name),
                })
            })?;
            let unit = Timeframe::parse(&unit_name).ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::InvalidReference {
                    message: format!("unknown timeframe '{}' in {}()", unit_name, name),
                })
            })?;
            return Ok(Expr::TimeAdd {
                expr: Box::new(lower_expr(&args[0].value)?),
                negative: name == "date_sub",
                amount: Box::new(lower_expr(&args[1].value)?),
                unit,
            });
        }
        "cast" | "safe_cast" => {
            if args.len() != 2 {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!("{}() takes (expr, 'type')", name),
                }
                .into());
            }
            let to = match &args[1].value {
                ast::Expr::Literal(ast::Literal::String(t)) => {
                    parse_type_name(t).ok_or_else(|| {
                        SemanticError::new(SemanticErrorKind::InvalidReference {
                            message: format!("unknown type '{}' in {}()", t, name),
                        })
                    })?
                }
                _ => {
                    return Err(SemanticErrorKind::InvalidReference {
                        message: format!("{}() type must be a string literal", name),
                    }
                    .into())
                }
            };
            return Ok(Expr::Cast {
                expr: Box::new(lower_expr(&args[0].value)?),
                to,
                safe: name == "safe_cast",
            });
        }
        _ => {}
    }

    // Standard library functions
    let sig = functions::lookup(name).ok_or_else(|| {
        SemanticError::new(SemanticErrorKind::UnknownFunction {
            name: name.to_string(),
        })
    })?;
    sig.check_arity(args.len()).map_err(SemanticError::new)?;

    let lowered = args
        .iter()
        .map(|a| lower_expr(&a.value))
        .collect::<SemanticResult<Vec<_>>>()?;
    Ok(Expr::Call {
        name: sig.name.to_string(),
        args: lowered,
    })
}

fn expected_agg_args(func: AggregateFunc) -> &'static str {
    match func {
        AggregateFunc::Count => "zero or one",
        _ => "exactly one",
    }
}

fn time_unit_args(
    name: &str,
    args: &[Spanned<ast::Expr>],
) -> SemanticResult<(Expr, String)> {
    if args.len() != 2 {
        return Err(SemanticErrorKind::InvalidReference {
            message: format!("{}() takes (expr, unit)", name),
        }
        .into());
    }
    let unit = unit_ident(&args[1].value).ok_or_else(|| {
        SemanticError::new(SemanticErrorKind::InvalidReference {
            message: format!("{}() unit must be a timeframe name", name),
        })
    })?;
    Ok((lower_expr(&args[0].value)?, unit))
}

fn unit_ident(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Ref(path) if path.len() == 1 => Some(path[0].clone()),
        _ => None,
    }
}

fn parse_extract_unit(s: &str) -> Option<ExtractUnit> {
    match s {
        "second" => Some(ExtractUnit::Second),
        "minute" => Some(ExtractUnit::Minute),
        "hour" => Some(ExtractUnit::Hour),
        "day" => Some(ExtractUnit::Day),
        "day_of_week" => Some(ExtractUnit::DayOfWeek),
        "day_of_year" => Some(ExtractUnit::DayOfYear),
        "week" => Some(ExtractUnit::Week),
        "month" => Some(ExtractUnit::Month),
        "quarter" => Some(ExtractUnit::Quarter),
        "year" => Some(ExtractUnit::Year),
        _ => None,
    }
}

fn parse_type_name(s: &str) -> Option<ValueType> {
    match s {
        "string" => Some(ValueType::String),
        "number" => Some(ValueType::Number),
        "bool" => Some(ValueType::Bool),
        "date" => Some(ValueType::Date),
        "timestamp" => Some(ValueType::Timestamp),
        _ => None,
    }
}

fn lower_type_name(ty: ast::TypeName) -> ValueType {
    match ty {
        ast::TypeName::String => ValueType::String,
        ast::TypeName::Number => ValueType::Number,
        ast::TypeName::Bool => ValueType::Bool,
        ast::TypeName::Date => ValueType::Date,
        ast::TypeName::Timestamp => ValueType::Timestamp,
    }
}

fn lower_binary_op(op: ast::BinaryOp) -> BinaryOp {
    match op {
        ast::BinaryOp::Add => BinaryOp::Add,
        ast::BinaryOp::Sub => BinaryOp::Sub,
        ast::BinaryOp::Mul => BinaryOp::Mul,
        ast::BinaryOp::Div => BinaryOp::Div,
        ast::BinaryOp::Eq => BinaryOp::Eq,
        ast::BinaryOp::NotEq => BinaryOp::NotEq,
        ast::BinaryOp::Lt => BinaryOp::Lt,
        ast::BinaryOp::LtEq => BinaryOp::LtEq,
        ast::BinaryOp::Gt => BinaryOp::Gt,
        ast::BinaryOp::GtEq => BinaryOp::GtEq,
        ast::BinaryOp::And => BinaryOp::And,
        ast::BinaryOp::Or => BinaryOp::Or,
    }
}

fn lower_literal(lit: &ast::Literal) -> SemanticResult<Literal> {
    Ok(match lit {
        ast::Literal::String(s) => Literal::String(s.clone()),
        ast::Literal::Number(digits) => {
            if digits.contains('.') {
                Literal::Float(digits.parse::<f64>().unwrap_or(0.0))
            } else {
                match digits.parse::<i64>() {
                    Ok(n) => Literal::Int(n),
                    Err(_) => Literal::Float(digits.parse::<f64>().unwrap_or(0.0)),
                }
            }
        }
        ast::Literal::Bool(b) => Literal::Bool(*b),
        ast::Literal::Null => Literal::Null,
        ast::Literal::Date(d) => Literal::Date(d.clone()),
        // Timestamps are written with a `T` separator; SQL wants a space.
        ast::Literal::Timestamp(t) => Literal::Timestamp(t.replace('T', " ")),
        ast::Literal::Regex(pattern) => {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(SemanticErrorKind::InvalidRegex {
                    pattern: pattern.clone(),
                    error: e.to_string(),
                }
                .into());
            }
            Literal::Regex(pattern.clone())
        }
    })
}

// =============================================================================
// Typing of field definitions
// =============================================================================

/// The value type of a fully lowered expression, resolving field
/// references in `space`.
pub fn type_of(space: &FieldSpace, expr: &Expr) -> SemanticResult<ValueType> {
    match expr {
        Expr::FieldRef { path } => {
            let field = space.resolve(path)?;
            field.value_type().cloned().ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::InvalidReference {
                    message: format!(
                        "'{}' is a query and has no scalar value",
                        path.join(".")
                    ),
                })
            })
        }
        Expr::Column { .. } => Ok(ValueType::String),
        Expr::Literal(lit) => Ok(lit.value_type()),
        Expr::Binary { left, op, right } => type_of_binary(space, left, *op, right),
        Expr::Unary { op, expr } => {
            let inner = type_of(space, expr)?;
            match op {
                UnaryOp::Neg => require_numeric(&inner, "-")?,
                UnaryOp::Not => {}
            }
            Ok(match op {
                UnaryOp::Neg => ValueType::Number,
                UnaryOp::Not => ValueType::Bool,
            })
        }
        Expr::Call { name, args } => {
            for arg in args {
                type_of(space, arg)?;
            }
            let sig = functions::lookup(name).ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::UnknownFunction { name: name.clone() })
            })?;
            Ok(sig.return_type.clone())
        }
        Expr::Aggregate(agg) => {
            let input_type = match &agg.input {
                Some(input) => Some(type_of(space, input)?),
                None => None,
            };
            Ok(agg.func.result_type(input_type.as_ref()))
        }
        Expr::Trunc { expr, .. } => type_of(space, expr),
        Expr::Extract { .. } => Ok(ValueType::Number),
        Expr::TimeAdd { expr, .. } => type_of(space, expr),
        Expr::Cast { to, .. } => Ok(to.clone()),
    }
}

fn type_of_binary(
    space: &FieldSpace,
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
) -> SemanticResult<ValueType> {
    let lt = type_of(space, left)?;
    let rt = type_of(space, right)?;

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            // Interval arithmetic on temporals is expressed via date_add
            require_numeric(&lt, op.sql())?;
            require_numeric(&rt, op.sql())?;
            Ok(ValueType::Number)
        }
        BinaryOp::And | BinaryOp::Or => Ok(ValueType::Bool),
        _ => {
            // Regex comparisons only match against strings
            if lt == ValueType::Regex || rt == ValueType::Regex {
                let other = if lt == ValueType::Regex { &rt } else { &lt };
                if *other != ValueType::String {
                    return Err(SemanticErrorKind::RegexComparison {
                        other_type: other.name(),
                    }
                    .into());
                }
                return Ok(ValueType::Bool);
            }
            let null_involved = matches!(left, Expr::Literal(Literal::Null))
                || matches!(right, Expr::Literal(Literal::Null));
            if !null_involved && !lt.comparable_with(&rt) {
                return Err(SemanticErrorKind::TypeMismatch {
                    op: op.sql().to_string(),
                    left: lt.name(),
                    right: rt.name(),
                }
                .into());
            }
            Ok(ValueType::Bool)
        }
    }
}

fn require_numeric(ty: &ValueType, op: &str) -> SemanticResult<()> {
    if !ty.is_numeric() {
        return Err(SemanticErrorKind::TypeMismatch {
            op: op.to_string(),
            left: ty.name(),
            right: "number".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Whether any field reference in `expr` resolves to a measure.
pub fn references_measure(space: &FieldSpace, expr: &Expr) -> bool {
    match expr {
        Expr::FieldRef { path } => matches!(
            space.resolve(path).as_deref().map(FieldDef::kind),
            Ok(crate::model::field::FieldKind::Measure)
        ),
        Expr::Column { .. } | Expr::Literal(_) => false,
        Expr::Binary { left, right, .. } => {
            references_measure(space, left) || references_measure(space, right)
        }
        Expr::Unary { expr, .. } => references_measure(space, expr),
        Expr::Call { args, .. } => args.iter().any(|a| references_measure(space, a)),
        Expr::Aggregate(agg) => agg
            .input
            .as_ref()
            .map(|i| references_measure(space, i))
            .unwrap_or(false),
        Expr::Trunc { expr, .. } | Expr::Extract { expr, .. } => references_measure(space, expr),
        Expr::TimeAdd { expr, amount, .. } => {
            references_measure(space, expr) || references_measure(space, amount)
        }
        Expr::Cast { expr, .. } => references_measure(space, expr),
    }
}

fn check_no_nested_aggregates(expr: &Expr, field: &str) -> SemanticResult<()> {
    let mut nested = false;
    expr.for_each_aggregate(&mut |agg| {
        if let Some(input) = &agg.input {
            if input.contains_aggregate() {
                nested = true;
            }
        }
    });
    if nested {
        return Err(SemanticErrorKind::NestedAggregate {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

/// The aggregate kind a measure reports: the first structural aggregate, or
/// the kind of the first referenced measure for derived measures.
fn measure_agg_kind(space: &FieldSpace, expr: &Expr) -> Option<AggregateFunc> {
    let mut found = None;
    expr.for_each_aggregate(&mut |agg| {
        if found.is_none() {
            found = Some(agg.func);
        }
    });
    if found.is_some() {
        return found;
    }
    first_measure_kind(space, expr)
}

fn first_measure_kind(space: &FieldSpace, expr: &Expr) -> Option<AggregateFunc> {
    match expr {
        Expr::FieldRef { path } => match space.resolve(path).ok()?.definition() {
            FieldDef::Measure(m) => Some(m.agg),
            _ => None,
        },
        Expr::Binary { left, right, .. } => {
            first_measure_kind(space, left).or_else(|| first_measure_kind(space, right))
        }
        Expr::Unary { expr, .. }
        | Expr::Trunc { expr, .. }
        | Expr::Extract { expr, .. }
        | Expr::Cast { expr, .. } => first_measure_kind(space, expr),
        Expr::TimeAdd { expr, amount, .. } => {
            first_measure_kind(space, expr).or_else(|| first_measure_kind(space, amount))
        }
        Expr::Call { args, .. } => args.iter().find_map(|a| first_measure_kind(space, a)),
        _ => None,
    }
}

// =============================================================================
// Query-sourced explores
// =============================================================================

/// The output namespace of a single-stage pipeline, for explores sourced
/// from a named query. Every output column becomes a dimension.
fn query_output_space(base: &Arc<Explore>, pipeline: &QueryPipeline) -> SemanticResult<FieldSpace> {
    if pipeline.stages.len() != 1 {
        return Err(SemanticErrorKind::InvalidReference {
            message: "only single-stage queries can be used as a source".to_string(),
        }
        .into());
    }
    let mut space = FieldSpace::new();
    match &pipeline.stages[0] {
        Stage::Group(stage) => {
            if !stage.nests.is_empty() {
                return Err(SemanticErrorKind::InvalidReference {
                    message: "a query with nests cannot be used as a source".to_string(),
                }
                .into());
            }
            for path in &stage.group {
                let field = base.space.resolve(path)?;
                let name = path.last().cloned().unwrap_or_default();
                let value_type = field
                    .value_type()
                    .cloned()
                    .unwrap_or(ValueType::String);
                space.define(FieldDef::Dimension(DimensionDef {
                    expr: Expr::column(&name),
                    name,
                    value_type,
                }))?;
            }
            for item in &stage.aggregates {
                let value_type = type_of(&base.space, &item.expr)?;
                space.define(FieldDef::Dimension(DimensionDef {
                    name: item.name.clone(),
                    value_type,
                    expr: Expr::column(&item.name),
                }))?;
            }
        }
        Stage::Project(stage) => {
            for path in &stage.fields {
                let field = base.space.resolve(path)?;
                let name = path.last().cloned().unwrap_or_default();
                let value_type = field
                    .value_type()
                    .cloned()
                    .unwrap_or(ValueType::String);
                space.define(FieldDef::Dimension(DimensionDef {
                    expr: Expr::column(&name),
                    name,
                    value_type,
                }))?;
            }
        }
        Stage::Index(_) => {
            for (name, ty) in [
                ("field_name", ValueType::String),
                ("field_value", ValueType::String),
                ("weight", ValueType::Number),
            ] {
                space.define(FieldDef::Dimension(DimensionDef {
                    name: name.to_string(),
                    value_type: ty,
                    expr: Expr::column(name),
                }))?;
            }
        }
    }
    Ok(space)
}
