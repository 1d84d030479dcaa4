//! The pipeline compiler: query pipelines to dialect-agnostic IR.
//!
//! Compilation proceeds stage by stage. The first stage resolves against
//! the explore (field space + join graph); later stages resolve against the
//! previous stage's output shape. A group stage with N nested queries
//! merges N+1 aggregation scopes into one statement via group-set ids;
//! stages chain as CTEs.

pub mod ir;
pub mod ordering;

use std::collections::HashSet;
use std::sync::Arc;

use petgraph::graph::NodeIndex;

use crate::model::explore::{Explore, ExploreSource, JoinKind, JoinOn};
use crate::model::expr::{AggregateFunc, Expr, Literal, LocalityHint};
use crate::model::field::FieldDef;
use crate::model::query::{
    GroupStage, IndexStage, OrderItem, ProjectStage, QueryPipeline, Stage,
};
use crate::model::types::ValueType;
use crate::model::ModelQuery;
use crate::semantic::error::{SemanticError, SemanticErrorKind, SemanticResult};
use crate::semantic::join_graph::JoinGraph;
use crate::semantic::locality::LocalityResolver;

use ir::{
    AggregateColumn, ColumnKind, CompiledPipeline, FromIR, IndexFieldIR, JoinIR, NestedCteIR,
    OrderBySpec, OrderTarget, OutputColumn, ResolvedAggIR, ResultShape, StageIR, StageKind,
    TurtleIR,
};

/// Compile a model query into its IR.
pub fn compile(query: &ModelQuery) -> SemanticResult<CompiledPipeline> {
    let mut resolving = HashSet::new();
    resolving.insert(query.name.clone());
    compile_pipeline(&query.name, &query.explore, &query.pipeline, &mut resolving)
}

fn compile_pipeline(
    name: &str,
    explore: &Arc<Explore>,
    pipeline: &QueryPipeline,
    resolving: &mut HashSet<String>,
) -> SemanticResult<CompiledPipeline> {
    if pipeline.is_empty() {
        return Err(SemanticErrorKind::EmptyPipeline {
            query: name.to_string(),
        }
        .into());
    }

    let mut stages = Vec::new();
    let mut prior_shape: Option<Vec<(String, ValueType)>> = None;

    for stage in &pipeline.stages {
        let stage_ir = match &prior_shape {
            None => compile_first_stage(name, explore, stage, resolving)?,
            Some(shape) => compile_prior_stage(shape, stage)?,
        };
        prior_shape = Some(stage_output_shape(&stage_ir));
        stages.push(stage_ir);
    }

    let last = stages.last().expect("non-empty pipeline");
    let result_shape = ResultShape::from_columns(&last.columns, &last.turtles);

    Ok(CompiledPipeline {
        stages,
        result_shape,
    })
}

/// Scalar output names and types of a stage, as seen by the next stage.
/// Measures become plain dimensions; turtle columns are not addressable
/// downstream.
fn stage_output_shape(stage: &StageIR) -> Vec<(String, ValueType)> {
    if stage.kind == StageKind::Index {
        return vec![
            ("field_name".to_string(), ValueType::String),
            ("field_value".to_string(), ValueType::String),
            ("weight".to_string(), ValueType::Number),
        ];
    }
    stage
        .columns
        .iter()
        .filter(|c| !matches!(c.kind, ColumnKind::Turtle { .. }))
        .map(|c| (c.name.clone(), c.value_type.clone()))
        .collect()
}

// =============================================================================
// First stage: resolve against the explore
// =============================================================================

fn compile_first_stage(
    query_name: &str,
    explore: &Arc<Explore>,
    stage: &Stage,
    resolving: &mut HashSet<String>,
) -> SemanticResult<StageIR> {
    let graph = JoinGraph::build(Arc::clone(explore));
    let mut resolver = ExprResolver::new(&graph);

    match stage {
        Stage::Group(group) => {
            compile_group_stage(query_name, explore, group, &graph, &mut resolver, resolving)
        }
        Stage::Project(project) => {
            compile_project_stage(explore, project, &graph, &mut resolver, resolving)
        }
        Stage::Index(index) => compile_index_stage(explore, index, &graph, &mut resolver, resolving),
    }
}

fn compile_group_stage(
    query_name: &str,
    explore: &Arc<Explore>,
    stage: &GroupStage,
    graph: &JoinGraph,
    resolver: &mut ExprResolver<'_>,
    resolving: &mut HashSet<String>,
) -> SemanticResult<StageIR> {
    let root = graph.root();

    // Outer-scope dimensions
    let mut columns = Vec::new();
    for path in &stage.group {
        columns.push(resolver.dimension_column(root, path)?);
    }

    // Outer-scope aggregates: inputs and localities resolve now, dedup
    // hints wait until the full used-node set is known.
    let mut pending_columns = Vec::new();
    for item in &stage.aggregates {
        let mut pending = Vec::new();
        let expr = resolver.resolve_aggregate_expr(root, &item.expr, &mut pending)?;
        if pending.is_empty() {
            return Err(SemanticErrorKind::MeasureWithoutAggregate {
                field: item.name.clone(),
            }
            .into());
        }
        let value_type = measure_item_type(resolver, root, &item.expr)
            .unwrap_or_else(|| aggregate_output_type(&expr));
        pending_columns.push((columns.len(), item.name.clone(), value_type, expr, pending));
        columns.push(placeholder_column(&item.name));
    }

    // Turtle scopes
    let mut turtles = Vec::new();
    let mut pending_turtles = Vec::new();
    for (i, nest) in stage.nests.iter().enumerate() {
        let turtle = compile_turtle(
            query_name,
            explore,
            &nest.name,
            i + 1,
            &stage.group,
            graph,
            resolver,
            resolving,
        )?;
        pending_turtles.push(turtle);
        columns.push(OutputColumn {
            name: nest.name.clone(),
            value_type: ValueType::String,
            kind: ColumnKind::Turtle { index: i },
        });
    }

    if columns.is_empty() {
        return Err(SemanticErrorKind::InvalidReference {
            message: format!("stage in '{}' produces no output fields", query_name),
        }
        .into());
    }
    check_unique_names(&columns)?;

    // Filters: explore-level first, then the stage's own
    let filters = resolve_filters(explore, Some(stage), root, resolver)?;

    // Dedup hints need every node the statement joins, across all scopes
    let used = resolver.used_nodes();
    let locality = LocalityResolver::new(graph);
    for (index, name, value_type, expr, pending) in pending_columns {
        let aggs = resolve_pending(&locality, &used, pending)?;
        columns[index] = OutputColumn {
            name,
            value_type,
            kind: ColumnKind::Aggregate(AggregateColumn { expr, aggs }),
        };
    }
    for pending in pending_turtles {
        turtles.push(pending.finish(&locality, &used)?);
    }

    let order_by = stage_ordering(&stage.order_by, &columns)?;
    let from = stage_from(explore, graph, &used, resolver, resolving)?;
    let group_set_count = 1 + turtles.len();

    Ok(StageIR {
        kind: StageKind::Group,
        from,
        group_set_count,
        columns,
        filters,
        order_by,
        limit: stage.limit,
        turtles,
        index_fields: Vec::new(),
    })
}

fn compile_project_stage(
    explore: &Arc<Explore>,
    stage: &ProjectStage,
    graph: &JoinGraph,
    resolver: &mut ExprResolver<'_>,
    resolving: &mut HashSet<String>,
) -> SemanticResult<StageIR> {
    let root = graph.root();

    let mut columns = Vec::new();
    for path in &stage.fields {
        let (node, field) = resolver.resolve_field_path(root, path)?;
        match field.definition() {
            FieldDef::Measure(_) => {
                return Err(SemanticErrorKind::ProjectMeasure {
                    field: path.join("."),
                }
                .into())
            }
            FieldDef::Query(_) => {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!("'{}' is a query, not a scalar field", path.join(".")),
                }
                .into())
            }
            _ => {}
        }
        columns.push(resolver.dimension_column_for(node, path, &field)?);
    }
    if columns.is_empty() {
        return Err(SemanticErrorKind::InvalidReference {
            message: "project stage has no fields".to_string(),
        }
        .into());
    }
    check_unique_names(&columns)?;

    let mut filters = resolve_filters(explore, None, root, resolver)?;
    for f in &stage.filters {
        if f.contains_aggregate() {
            return Err(SemanticErrorKind::InvalidReference {
                message: "filters cannot contain aggregates".to_string(),
            }
            .into());
        }
        filters.push(resolver.resolve_scalar(root, f)?);
    }

    let order_by = stage_ordering(&stage.order_by, &columns)?;
    let used = resolver.used_nodes();
    let from = stage_from(explore, graph, &used, resolver, resolving)?;

    Ok(StageIR {
        kind: StageKind::Project,
        from,
        group_set_count: 1,
        columns,
        filters,
        order_by,
        limit: stage.limit,
        turtles: Vec::new(),
        index_fields: Vec::new(),
    })
}

fn compile_index_stage(
    explore: &Arc<Explore>,
    stage: &IndexStage,
    graph: &JoinGraph,
    resolver: &mut ExprResolver<'_>,
    resolving: &mut HashSet<String>,
) -> SemanticResult<StageIR> {
    let root = graph.root();

    let mut index_fields = Vec::new();
    for path in &stage.fields {
        let (node, field) = resolver.resolve_field_path(root, path)?;
        if !matches!(field.definition(), FieldDef::Dimension(_)) {
            return Err(SemanticErrorKind::InvalidReference {
                message: format!("index fields must be dimensions: '{}'", path.join(".")),
            }
            .into());
        }
        let column = resolver.dimension_column_for(node, path, &field)?;
        let (expr, value_type) = match column.kind {
            ColumnKind::Dimension { expr } => (expr, column.value_type),
            _ => unreachable!("dimension resolution yields dimension columns"),
        };
        index_fields.push(IndexFieldIR {
            name: path.join("."),
            expr,
            value_type,
        });
    }

    let filters = resolve_filters(explore, None, root, resolver)?;
    let used = resolver.used_nodes();
    let from = stage_from(explore, graph, &used, resolver, resolving)?;

    let columns = vec![
        OutputColumn {
            name: "field_name".to_string(),
            value_type: ValueType::String,
            kind: ColumnKind::Dimension {
                expr: Expr::column("field_name"),
            },
        },
        OutputColumn {
            name: "field_value".to_string(),
            value_type: ValueType::String,
            kind: ColumnKind::Dimension {
                expr: Expr::column("field_value"),
            },
        },
        OutputColumn {
            name: "weight".to_string(),
            value_type: ValueType::Number,
            kind: ColumnKind::Dimension {
                expr: Expr::column("weight"),
            },
        },
    ];

    Ok(StageIR {
        kind: StageKind::Index,
        from,
        group_set_count: 1,
        columns,
        filters,
        order_by: Vec::new(),
        limit: None,
        turtles: Vec::new(),
        index_fields,
    })
}

// =============================================================================
// Turtles
// =============================================================================

/// A turtle whose dedup hints are still pending.
struct PendingTurtle {
    name: String,
    group_set: usize,
    columns: Vec<OutputColumn>,
    pending: Vec<(usize, String, ValueType, Expr, Vec<PendingAgg>)>,
    filters: Vec<Expr>,
    explicit_order: Vec<OrderItem>,
    limit: Option<u64>,
    nested: Vec<NestedCteIR>,
}

impl PendingTurtle {
    fn finish(
        mut self,
        locality: &LocalityResolver<'_>,
        used: &[NodeIndex],
    ) -> SemanticResult<TurtleIR> {
        for (index, name, value_type, expr, pending) in self.pending {
            let aggs = resolve_pending(locality, used, pending)?;
            self.columns[index] = OutputColumn {
                name,
                value_type,
                kind: ColumnKind::Aggregate(AggregateColumn { expr, aggs }),
            };
        }

        // Ordering is decided against the finished columns; inside array
        // construction it targets internal column names, not ordinals
        let order_by = if self.explicit_order.is_empty() {
            ordering::default_ordering(&self.columns)
                .into_iter()
                .map(|spec| OrderBySpec {
                    target: match spec.target {
                        OrderTarget::Ordinal(i) => {
                            OrderTarget::Column(self.columns[i - 1].name.clone())
                        }
                        other => other,
                    },
                    dir: spec.dir,
                })
                .collect()
        } else {
            let mut specs = Vec::new();
            for item in &self.explicit_order {
                let name = order_item_name(item);
                if !self.columns.iter().any(|c| c.name == name) {
                    return Err(SemanticErrorKind::UnknownField {
                        segment: name.clone(),
                        path: name,
                    }
                    .into());
                }
                specs.push(OrderBySpec {
                    target: OrderTarget::Column(name),
                    dir: item.dir,
                });
            }
            specs
        };

        // The turtle's result shape: its own columns plus deeper nests
        let mut shape = ResultShape::from_columns(&self.columns, &[]);
        for cte in &self.nested {
            for col_name in &cte.columns {
                let nested_shape = cte
                    .pipeline
                    .result_shape
                    .columns
                    .iter()
                    .find(|c| &c.name == col_name)
                    .and_then(|c| c.nested.clone());
                shape.columns.push(ir::ShapeColumn {
                    name: col_name.clone(),
                    value_type: None,
                    nested: nested_shape,
                });
            }
        }

        Ok(TurtleIR {
            name: self.name,
            group_set: self.group_set,
            columns: self.columns,
            filters: self.filters,
            order_by,
            limit: self.limit,
            nested: self.nested,
            shape,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_turtle(
    query_name: &str,
    explore: &Arc<Explore>,
    nest_name: &str,
    group_set: usize,
    parent_group: &[Vec<String>],
    graph: &JoinGraph,
    resolver: &mut ExprResolver<'_>,
    resolving: &mut HashSet<String>,
) -> SemanticResult<PendingTurtle> {
    if resolving.contains(nest_name) {
        return Err(SemanticErrorKind::CircularQueryReference {
            name: nest_name.to_string(),
        }
        .into());
    }

    let field = explore.space.lookup(nest_name).ok_or_else(|| {
        SemanticError::new(SemanticErrorKind::UnknownQuery {
            name: nest_name.to_string(),
        })
    })?;
    let turtle_def = match field.definition() {
        FieldDef::Query(t) => t.clone(),
        _ => {
            return Err(SemanticErrorKind::InvalidReference {
                message: format!("'{}' is not a query and cannot be nested", nest_name),
            }
            .into())
        }
    };

    let turtle_stage = single_group_stage(&turtle_def.pipeline, nest_name)?;
    resolving.insert(nest_name.to_string());
    let result = compile_turtle_stage(
        query_name,
        explore,
        nest_name,
        group_set,
        parent_group,
        &turtle_stage,
        graph,
        resolver,
        resolving,
    );
    resolving.remove(nest_name);
    result
}

/// Nested queries compile as a single group stage.
fn single_group_stage(pipeline: &QueryPipeline, name: &str) -> SemanticResult<GroupStage> {
    if pipeline.is_empty() {
        return Err(SemanticErrorKind::EmptyPipeline {
            query: name.to_string(),
        }
        .into());
    }
    match (&pipeline.stages[0], pipeline.stages.len()) {
        (Stage::Group(g), 1) => Ok(g.clone()),
        _ => Err(SemanticErrorKind::InvalidReference {
            message: format!(
                "nested query '{}' must be a single group stage",
                name
            ),
        }
        .into()),
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_turtle_stage(
    query_name: &str,
    explore: &Arc<Explore>,
    nest_name: &str,
    group_set: usize,
    parent_group: &[Vec<String>],
    stage: &GroupStage,
    graph: &JoinGraph,
    resolver: &mut ExprResolver<'_>,
    resolving: &mut HashSet<String>,
) -> SemanticResult<PendingTurtle> {
    let root = graph.root();

    let mut columns = Vec::new();
    for path in &stage.group {
        columns.push(resolver.dimension_column(root, path)?);
    }

    let mut pending = Vec::new();
    for item in &stage.aggregates {
        let mut pending_aggs = Vec::new();
        let expr = resolver.resolve_aggregate_expr(root, &item.expr, &mut pending_aggs)?;
        if pending_aggs.is_empty() {
            return Err(SemanticErrorKind::MeasureWithoutAggregate {
                field: item.name.clone(),
            }
            .into());
        }
        let value_type = measure_item_type(resolver, root, &item.expr)
            .unwrap_or_else(|| aggregate_output_type(&expr));
        pending.push((
            columns.len(),
            item.name.clone(),
            value_type,
            expr,
            pending_aggs,
        ));
        columns.push(placeholder_column(&item.name));
    }

    // Filters scoped to one turtle apply inside its group set only;
    // generation turns them into per-set conditional predicates.
    let mut filters = Vec::new();
    for f in &stage.filters {
        if f.contains_aggregate() {
            return Err(SemanticErrorKind::InvalidReference {
                message: "filters cannot contain aggregates".to_string(),
            }
            .into());
        }
        filters.push(resolver.resolve_scalar(root, f)?);
    }

    check_unique_names(&columns)?;

    // Deeper nests: compile a separate single-stage pipeline grouped by
    // the parent keys plus this turtle's dimensions, joined back by key.
    let mut nested = Vec::new();
    if !stage.nests.is_empty() {
        let mut group = parent_group.to_vec();
        group.extend(stage.group.iter().cloned());
        let synthetic = GroupStage {
            group,
            aggregates: Vec::new(),
            nests: stage.nests.clone(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        };
        let pipeline = QueryPipeline::new(vec![Stage::Group(synthetic)]);
        let compiled = compile_pipeline(query_name, explore, &pipeline, resolving)?;

        let join_keys: Vec<String> = compiled
            .stages
            .last()
            .map(|s| {
                s.columns
                    .iter()
                    .filter(|c| !matches!(c.kind, ColumnKind::Turtle { .. }))
                    .map(|c| c.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        let nested_columns: Vec<String> =
            stage.nests.iter().map(|n| n.name.clone()).collect();

        nested.push(NestedCteIR {
            cte_name: format!("__{}_nested", nest_name),
            pipeline: Box::new(compiled),
            join_keys,
            columns: nested_columns,
        });
    }

    Ok(PendingTurtle {
        name: nest_name.to_string(),
        group_set,
        columns,
        pending,
        filters,
        explicit_order: stage.order_by.clone(),
        limit: stage.limit,
        nested,
    })
}

// =============================================================================
// Later stages: resolve against the previous stage's output
// =============================================================================

fn compile_prior_stage(
    shape: &[(String, ValueType)],
    stage: &Stage,
) -> SemanticResult<StageIR> {
    let lookup = |path: &[String]| -> SemanticResult<(String, ValueType)> {
        if path.len() != 1 {
            return Err(SemanticErrorKind::UnknownField {
                segment: path.first().cloned().unwrap_or_default(),
                path: path.join("."),
            }
            .into());
        }
        shape
            .iter()
            .find(|(n, _)| n == &path[0])
            .cloned()
            .ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::UnknownField {
                    segment: path[0].clone(),
                    path: path[0].clone(),
                })
            })
    };

    match stage {
        Stage::Group(group) => {
            if !group.nests.is_empty() {
                return Err(SemanticErrorKind::InvalidReference {
                    message: "nests are only available in the first stage".to_string(),
                }
                .into());
            }
            let mut columns = Vec::new();
            for path in &group.group {
                let (name, value_type) = lookup(path)?;
                columns.push(OutputColumn {
                    kind: ColumnKind::Dimension {
                        expr: Expr::column(&name),
                    },
                    name,
                    value_type,
                });
            }
            for item in &group.aggregates {
                let (expr, aggs) = resolve_prior_aggregate(&lookup, &item.expr, &item.name)?;
                let value_type = aggregate_output_type(&expr);
                columns.push(OutputColumn {
                    name: item.name.clone(),
                    value_type,
                    kind: ColumnKind::Aggregate(AggregateColumn { expr, aggs }),
                });
            }
            check_unique_names(&columns)?;
            let filters = resolve_prior_filters(&lookup, &group.filters)?;
            let order_by = stage_ordering(&group.order_by, &columns)?;
            Ok(StageIR {
                kind: StageKind::Group,
                from: FromIR::Prior,
                group_set_count: 1,
                columns,
                filters,
                order_by,
                limit: group.limit,
                turtles: Vec::new(),
                index_fields: Vec::new(),
            })
        }
        Stage::Project(project) => {
            let mut columns = Vec::new();
            for path in &project.fields {
                let (name, value_type) = lookup(path)?;
                columns.push(OutputColumn {
                    kind: ColumnKind::Dimension {
                        expr: Expr::column(&name),
                    },
                    name,
                    value_type,
                });
            }
            check_unique_names(&columns)?;
            let filters = resolve_prior_filters(&lookup, &project.filters)?;
            let order_by = stage_ordering(&project.order_by, &columns)?;
            Ok(StageIR {
                kind: StageKind::Project,
                from: FromIR::Prior,
                group_set_count: 1,
                columns,
                filters,
                order_by,
                limit: project.limit,
                turtles: Vec::new(),
                index_fields: Vec::new(),
            })
        }
        Stage::Index(index) => {
            let mut index_fields = Vec::new();
            for path in &index.fields {
                let (name, value_type) = lookup(path)?;
                index_fields.push(IndexFieldIR {
                    name: name.clone(),
                    expr: Expr::column(&name),
                    value_type,
                });
            }
            Ok(StageIR {
                kind: StageKind::Index,
                from: FromIR::Prior,
                group_set_count: 1,
                columns: vec![
                    OutputColumn {
                        name: "field_name".to_string(),
                        value_type: ValueType::String,
                        kind: ColumnKind::Dimension {
                            expr: Expr::column("field_name"),
                        },
                    },
                    OutputColumn {
                        name: "field_value".to_string(),
                        value_type: ValueType::String,
                        kind: ColumnKind::Dimension {
                            expr: Expr::column("field_value"),
                        },
                    },
                    OutputColumn {
                        name: "weight".to_string(),
                        value_type: ValueType::Number,
                        kind: ColumnKind::Dimension {
                            expr: Expr::column("weight"),
                        },
                    },
                ],
                filters: Vec::new(),
                order_by: Vec::new(),
                limit: None,
                turtles: Vec::new(),
                index_fields,
            })
        }
    }
}

/// Resolve an aggregate expression over the previous stage's columns.
/// Every aggregate has trivial locality (there are no joins); references
/// must name prior output columns.
fn resolve_prior_aggregate(
    lookup: &dyn Fn(&[String]) -> SemanticResult<(String, ValueType)>,
    expr: &Expr,
    item_name: &str,
) -> SemanticResult<(Expr, Vec<ResolvedAggIR>)> {
    let mut aggs = Vec::new();
    let resolved = rewrite_prior(lookup, expr, &mut aggs)?;
    if aggs.is_empty() {
        return Err(SemanticErrorKind::MeasureWithoutAggregate {
            field: item_name.to_string(),
        }
        .into());
    }
    Ok((resolved, aggs))
}

fn rewrite_prior(
    lookup: &dyn Fn(&[String]) -> SemanticResult<(String, ValueType)>,
    expr: &Expr,
    aggs: &mut Vec<ResolvedAggIR>,
) -> SemanticResult<Expr> {
    Ok(match expr {
        Expr::FieldRef { path } => {
            let (name, _) = lookup(path)?;
            Expr::column(name)
        }
        Expr::Aggregate(agg) => {
            if matches!(&agg.locality, LocalityHint::Path(_)) {
                return Err(SemanticErrorKind::InvalidReference {
                    message: "path-form aggregates are only available in the first stage"
                        .to_string(),
                }
                .into());
            }
            let input = match &agg.input {
                Some(i) => Some(Box::new(rewrite_prior(lookup, i, aggs)?)),
                None => None,
            };
            aggs.push(ResolvedAggIR {
                func: agg.func,
                distinct_key: None,
            });
            Expr::Aggregate(crate::model::expr::AggregateExpr {
                func: agg.func,
                input,
                locality: LocalityHint::CallingContext,
            })
        }
        Expr::Literal(_) | Expr::Column { .. } => expr.clone(),
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(rewrite_prior(lookup, left, aggs)?),
            op: *op,
            right: Box::new(rewrite_prior(lookup, right, aggs)?),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op: *op,
            expr: Box::new(rewrite_prior(lookup, expr, aggs)?),
        },
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| rewrite_prior(lookup, a, aggs))
                .collect::<SemanticResult<Vec<_>>>()?,
        },
        Expr::Trunc { expr, unit } => Expr::Trunc {
            expr: Box::new(rewrite_prior(lookup, expr, aggs)?),
            unit: *unit,
        },
        Expr::Extract { expr, unit } => Expr::Extract {
            expr: Box::new(rewrite_prior(lookup, expr, aggs)?),
            unit: *unit,
        },
        Expr::TimeAdd {
            expr,
            negative,
            amount,
            unit,
        } => Expr::TimeAdd {
            expr: Box::new(rewrite_prior(lookup, expr, aggs)?),
            negative: *negative,
            amount: Box::new(rewrite_prior(lookup, amount, aggs)?),
            unit: *unit,
        },
        Expr::Cast { expr, to, safe } => Expr::Cast {
            expr: Box::new(rewrite_prior(lookup, expr, aggs)?),
            to: to.clone(),
            safe: *safe,
        },
    })
}

fn resolve_prior_filters(
    lookup: &dyn Fn(&[String]) -> SemanticResult<(String, ValueType)>,
    filters: &[Expr],
) -> SemanticResult<Vec<Expr>> {
    let mut out = Vec::new();
    for f in filters {
        if f.contains_aggregate() {
            return Err(SemanticErrorKind::InvalidReference {
                message: "filters cannot contain aggregates".to_string(),
            }
            .into());
        }
        let mut aggs = Vec::new();
        out.push(rewrite_prior(lookup, f, &mut aggs)?);
    }
    Ok(out)
}

// =============================================================================
// Shared helpers
// =============================================================================

/// A pending aggregate: locality known as an absolute alias path, dedup
/// decision deferred until the stage's full used-node set is known.
struct PendingAgg {
    func: AggregateFunc,
    locality_path: Vec<String>,
}

fn resolve_pending(
    locality: &LocalityResolver<'_>,
    used: &[NodeIndex],
    pending: Vec<PendingAgg>,
) -> SemanticResult<Vec<ResolvedAggIR>> {
    pending
        .into_iter()
        .map(|p| {
            let resolved = locality.resolve(
                p.func,
                &LocalityHint::Path(p.locality_path.clone()),
                &[],
                used,
            )?;
            Ok(ResolvedAggIR {
                func: p.func,
                distinct_key: resolved.distinct_key,
            })
        })
        .collect()
}

fn placeholder_column(name: &str) -> OutputColumn {
    OutputColumn {
        name: name.to_string(),
        value_type: ValueType::Number,
        kind: ColumnKind::Dimension {
            expr: Expr::Literal(Literal::Null),
        },
    }
}

/// A bare measure reference reports the measure's declared type.
fn measure_item_type(
    resolver: &mut ExprResolver<'_>,
    context: NodeIndex,
    expr: &Expr,
) -> Option<ValueType> {
    if let Expr::FieldRef { path } = expr {
        if let Ok((_, field)) = resolver.resolve_field_path(context, path) {
            if let FieldDef::Measure(m) = field.definition() {
                return Some(m.value_type.clone());
            }
        }
    }
    None
}

fn aggregate_output_type(expr: &Expr) -> ValueType {
    match expr {
        Expr::Aggregate(agg) => agg.func.result_type(None),
        Expr::Cast { to, .. } => to.clone(),
        _ => ValueType::Number,
    }
}

fn check_unique_names(columns: &[OutputColumn]) -> SemanticResult<()> {
    let mut seen = HashSet::new();
    for col in columns {
        if !seen.insert(col.name.as_str()) {
            return Err(SemanticErrorKind::DuplicateName {
                name: col.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn order_item_name(item: &OrderItem) -> String {
    item.field.last().cloned().unwrap_or_default()
}

fn stage_ordering(
    explicit: &[OrderItem],
    columns: &[OutputColumn],
) -> SemanticResult<Vec<OrderBySpec>> {
    if explicit.is_empty() {
        return Ok(ordering::default_ordering(columns));
    }
    let mut specs = Vec::new();
    for item in explicit {
        let name = order_item_name(item);
        let pos = columns.iter().position(|c| c.name == name).ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::UnknownField {
                segment: name.clone(),
                path: name.clone(),
            })
        })?;
        specs.push(OrderBySpec {
            target: OrderTarget::Ordinal(pos + 1),
            dir: item.dir,
        });
    }
    Ok(specs)
}

fn resolve_filters(
    explore: &Arc<Explore>,
    stage: Option<&GroupStage>,
    root: NodeIndex,
    resolver: &mut ExprResolver<'_>,
) -> SemanticResult<Vec<Expr>> {
    let mut filters = Vec::new();
    for f in explore.all_filters() {
        filters.push(resolver.resolve_scalar(root, &f)?);
    }
    if let Some(stage) = stage {
        for f in &stage.filters {
            if f.contains_aggregate() {
                return Err(SemanticErrorKind::InvalidReference {
                    message: "filters cannot contain aggregates".to_string(),
                }
                .into());
            }
            filters.push(resolver.resolve_scalar(root, f)?);
        }
    }
    Ok(filters)
}

fn stage_from(
    explore: &Arc<Explore>,
    graph: &JoinGraph,
    used: &[NodeIndex],
    resolver: &mut ExprResolver<'_>,
    resolving: &mut HashSet<String>,
) -> SemanticResult<FromIR> {
    let joins = build_joins(graph, used, resolver)?;

    // Walk extension chains down to a physical table or a source pipeline
    let mut source = &explore.source;
    loop {
        match source {
            ExploreSource::Table(table) => {
                return Ok(FromIR::Table {
                    table: table.clone(),
                    joins,
                })
            }
            ExploreSource::Extends(parent) => source = &parent.source,
            ExploreSource::Query { base, pipeline } => {
                let compiled = compile_pipeline(&explore.name, base, pipeline, resolving)?;
                return Ok(FromIR::Pipeline {
                    pipeline: Box::new(compiled),
                    joins,
                });
            }
        }
    }
}

fn build_joins(
    graph: &JoinGraph,
    used: &[NodeIndex],
    resolver: &mut ExprResolver<'_>,
) -> SemanticResult<Vec<JoinIR>> {
    let mut joins = Vec::new();
    for node_idx in graph.nodes_in_order() {
        if node_idx == graph.root() || !used.contains(&node_idx) {
            continue;
        }
        let node = graph.node(node_idx);
        let (parent_idx, edge) = graph
            .parent_edge(node_idx)
            .expect("non-root nodes have a parent");
        let parent = graph.node(parent_idx);

        let table = node.explore.base_table().ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::InvalidJoin {
                alias: edge.alias.clone(),
                message: "joined explores must read from a physical table".to_string(),
            })
        })?;

        let on = match &edge.on {
            None => None,
            Some(JoinOn::ForeignKey {
                foreign_key,
                primary_key,
            }) => {
                // The foreign key lives on the many side of the edge
                let (fk_side, pk_side) = match edge.kind {
                    JoinKind::One => (parent, node),
                    _ => (node, parent),
                };
                Some(Expr::binary(
                    Expr::qualified_column(
                        fk_side.sql_alias.clone(),
                        physical_column(&fk_side.explore.space, foreign_key),
                    ),
                    crate::model::expr::BinaryOp::Eq,
                    Expr::qualified_column(
                        pk_side.sql_alias.clone(),
                        physical_column(&pk_side.explore.space, primary_key),
                    ),
                ))
            }
            Some(JoinOn::Expr(e)) => Some(resolver.resolve_scalar(parent_idx, e)?),
        };

        joins.push(JoinIR {
            sql_alias: node.sql_alias.clone(),
            table: table.to_string(),
            kind: edge.kind,
            on,
        });
    }
    Ok(joins)
}

/// The physical column behind a field name: the dimension's column when it
/// is a plain column reference, the field name otherwise.
fn physical_column(space: &crate::semantic::FieldSpace, field: &str) -> String {
    match space.lookup(field).as_deref().map(FieldDef::definition) {
        Some(FieldDef::Dimension(d)) => match &d.expr {
            Expr::Column { column, .. } => column.clone(),
            _ => field.to_string(),
        },
        _ => field.to_string(),
    }
}

// =============================================================================
// Expression resolution against the join graph
// =============================================================================

/// Resolves model expressions into physical column references, inlining
/// field definitions and recording which join-tree nodes the stage uses.
struct ExprResolver<'a> {
    graph: &'a JoinGraph,
    used: Vec<NodeIndex>,
    /// Fields currently being inlined, to catch circular definitions.
    inlining: Vec<(NodeIndex, String)>,
}

impl<'a> ExprResolver<'a> {
    fn new(graph: &'a JoinGraph) -> Self {
        Self {
            graph,
            used: vec![graph.root()],
            inlining: Vec::new(),
        }
    }

    fn used_nodes(&self) -> Vec<NodeIndex> {
        self.used.clone()
    }

    fn mark_used(&mut self, node: NodeIndex) {
        for idx in self.graph.path_from_root(node) {
            if !self.used.contains(&idx) {
                self.used.push(idx);
            }
        }
    }

    /// Resolve a dotted path starting at `context` to the owning node and
    /// the field definition.
    fn resolve_field_path(
        &mut self,
        context: NodeIndex,
        path: &[String],
    ) -> SemanticResult<(NodeIndex, Arc<FieldDef>)> {
        let full = path.join(".");
        let mut node = context;
        for (i, segment) in path.iter().enumerate() {
            let join_node = {
                let current = self.graph.node(node);
                let mut target_path = current.alias_path.clone();
                target_path.push(segment.clone());
                if current.explore.space.join_target(segment).is_some() {
                    self.graph.node_at_path(&target_path)
                } else {
                    None
                }
            };
            if let Some(next) = join_node {
                if i == path.len() - 1 {
                    // A join alias is not a field
                    return Err(SemanticErrorKind::UnknownField {
                        segment: segment.clone(),
                        path: full,
                    }
                    .into());
                }
                node = next;
                continue;
            }

            // Not a join alias: must be the final, field-naming segment
            if i != path.len() - 1 {
                return Err(SemanticErrorKind::UnknownField {
                    segment: segment.clone(),
                    path: full,
                }
                .into());
            }
            let field = self.graph.node(node).explore.space.lookup(segment).ok_or_else(
                || {
                    SemanticError::new(SemanticErrorKind::UnknownField {
                        segment: segment.clone(),
                        path: full.clone(),
                    })
                },
            )?;
            self.mark_used(node);
            return Ok((node, field));
        }
        Err(SemanticErrorKind::UnknownField {
            segment: path.last().cloned().unwrap_or_default(),
            path: full,
        }
        .into())
    }

    /// Resolve a grouping path into a dimension output column.
    fn dimension_column(
        &mut self,
        context: NodeIndex,
        path: &[String],
    ) -> SemanticResult<OutputColumn> {
        let (node, field) = self.resolve_field_path(context, path)?;
        match field.definition() {
            FieldDef::Dimension(_) => {}
            FieldDef::Measure(_) => {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!(
                        "measure '{}' belongs in aggregate, not group",
                        path.join(".")
                    ),
                }
                .into())
            }
            FieldDef::Query(_) => {
                return Err(SemanticErrorKind::InvalidReference {
                    message: format!("query '{}' belongs in nest, not group", path.join(".")),
                }
                .into())
            }
            FieldDef::Rename { .. } => unreachable!("definition() strips renames"),
        }
        self.dimension_column_for(node, path, &field)
    }

    fn dimension_column_for(
        &mut self,
        node: NodeIndex,
        path: &[String],
        field: &Arc<FieldDef>,
    ) -> SemanticResult<OutputColumn> {
        let dim = match field.definition() {
            FieldDef::Dimension(d) => d,
            _ => unreachable!("caller checked the field kind"),
        };
        let expr = self.inline_dimension(node, field.name(), &dim.expr)?;
        Ok(OutputColumn {
            name: path.last().cloned().unwrap_or_default(),
            value_type: dim.value_type.clone(),
            kind: ColumnKind::Dimension { expr },
        })
    }

    /// Resolve a scalar expression (no measures, no aggregates).
    fn resolve_scalar(&mut self, context: NodeIndex, expr: &Expr) -> SemanticResult<Expr> {
        self.rewrite(context, expr, None)
    }

    /// Resolve an aggregate expression: measures inline, aggregate inputs
    /// resolve in their locality's context, and each aggregate node
    /// records a pending locality decision in traversal order.
    fn resolve_aggregate_expr(
        &mut self,
        context: NodeIndex,
        expr: &Expr,
        pending: &mut Vec<PendingAgg>,
    ) -> SemanticResult<Expr> {
        self.rewrite(context, expr, Some(pending))
    }

    fn inline_dimension(
        &mut self,
        node: NodeIndex,
        name: &str,
        expr: &Expr,
    ) -> SemanticResult<Expr> {
        let key = (node, name.to_string());
        if self.inlining.contains(&key) {
            return Err(SemanticErrorKind::InvalidReference {
                message: format!("circular field definition: '{}'", name),
            }
            .into());
        }
        self.inlining.push(key);
        let result = self.rewrite(node, expr, None);
        self.inlining.pop();
        result
    }

    fn rewrite(
        &mut self,
        context: NodeIndex,
        expr: &Expr,
        mut pending: Option<&mut Vec<PendingAgg>>,
    ) -> SemanticResult<Expr> {
        Ok(match expr {
            Expr::Column { entity, column } => match entity {
                Some(_) => expr.clone(),
                None => Expr::qualified_column(
                    self.graph.node(context).sql_alias.clone(),
                    column.clone(),
                ),
            },
            Expr::Literal(_) => expr.clone(),
            Expr::FieldRef { path } => {
                let (node, field) = self.resolve_field_path(context, path)?;
                match field.definition() {
                    FieldDef::Dimension(d) => {
                        let expr = d.expr.clone();
                        self.inline_dimension(node, field.name(), &expr)?
                    }
                    FieldDef::Measure(m) => match pending.as_deref_mut() {
                        Some(p) => {
                            let expr = m.expr.clone();
                            let key = (node, field.name().to_string());
                            if self.inlining.contains(&key) {
                                return Err(SemanticErrorKind::InvalidReference {
                                    message: format!(
                                        "circular field definition: '{}'",
                                        field.name()
                                    ),
                                }
                                .into());
                            }
                            self.inlining.push(key);
                            let result = self.rewrite(node, &expr, Some(p));
                            self.inlining.pop();
                            result?
                        }
                        None => {
                            return Err(SemanticErrorKind::InvalidReference {
                                message: format!(
                                    "measure '{}' cannot be used in a scalar position",
                                    path.join(".")
                                ),
                            }
                            .into())
                        }
                    },
                    FieldDef::Query(_) => {
                        return Err(SemanticErrorKind::InvalidReference {
                            message: format!(
                                "query '{}' cannot be used in an expression",
                                path.join(".")
                            ),
                        }
                        .into())
                    }
                    FieldDef::Rename { .. } => unreachable!("definition() strips renames"),
                }
            }
            Expr::Aggregate(agg) => {
                let pending = match pending.as_deref_mut() {
                    Some(p) => p,
                    None => {
                        return Err(SemanticErrorKind::InvalidReference {
                            message: "aggregates are not allowed here".to_string(),
                        }
                        .into())
                    }
                };
                self.rewrite_aggregate(context, agg, pending)?
            }
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(self.rewrite(context, left, pending.as_deref_mut())?),
                op: *op,
                right: Box::new(self.rewrite(context, right, pending)?),
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: Box::new(self.rewrite(context, expr, pending)?),
            },
            Expr::Call { name, args } => {
                let mut resolved = Vec::with_capacity(args.len());
                for a in args {
                    resolved.push(self.rewrite(context, a, pending.as_deref_mut())?);
                }
                Expr::Call {
                    name: name.clone(),
                    args: resolved,
                }
            }
            Expr::Trunc { expr, unit } => Expr::Trunc {
                expr: Box::new(self.rewrite(context, expr, pending)?),
                unit: *unit,
            },
            Expr::Extract { expr, unit } => Expr::Extract {
                expr: Box::new(self.rewrite(context, expr, pending)?),
                unit: *unit,
            },
            Expr::TimeAdd {
                expr,
                negative,
                amount,
                unit,
            } => Expr::TimeAdd {
                expr: Box::new(self.rewrite(context, expr, pending.as_deref_mut())?),
                negative: *negative,
                amount: Box::new(self.rewrite(context, amount, pending)?),
                unit: *unit,
            },
            Expr::Cast { expr, to, safe } => Expr::Cast {
                expr: Box::new(self.rewrite(context, expr, pending)?),
                to: to.clone(),
                safe: *safe,
            },
        })
    }

    fn rewrite_aggregate(
        &mut self,
        context: NodeIndex,
        agg: &crate::model::expr::AggregateExpr,
        pending: &mut Vec<PendingAgg>,
    ) -> SemanticResult<Expr> {
        // Normalize the two syntaxes to (locality node, input expression)
        let (locality_node, input) = match &agg.locality {
            LocalityHint::CallingContext => {
                let input = match &agg.input {
                    Some(i) => Some(self.rewrite(context, i, None)?),
                    None => None,
                };
                (context, input)
            }
            LocalityHint::Path(path) => {
                // The path may name a join node (`items.count()`) or end
                // at a field (`items.price.sum()`)
                let context_node = self.graph.node(context);
                let mut abs = context_node.alias_path.clone();
                abs.extend(path.iter().cloned());
                if let Some(node) = self.graph.node_at_path(&abs) {
                    self.mark_used(node);
                    (node, None)
                } else {
                    let (field_node, field) = self.resolve_field_path(context, path)?;
                    let dim = match field.definition() {
                        FieldDef::Dimension(d) => d,
                        _ => {
                            return Err(SemanticErrorKind::InvalidReference {
                                message: format!(
                                    "path-form aggregates apply to dimensions: '{}'",
                                    path.join(".")
                                ),
                            }
                            .into())
                        }
                    };
                    let input = self.inline_dimension(field_node, field.name(), &dim.expr)?;
                    (field_node, Some(input))
                }
            }
        };

        self.mark_used(locality_node);
        pending.push(PendingAgg {
            func: agg.func,
            locality_path: self.graph.node(locality_node).alias_path.clone(),
        });

        Ok(Expr::Aggregate(crate::model::expr::AggregateExpr {
            func: agg.func,
            input: input.map(Box::new),
            locality: LocalityHint::CallingContext,
        }))
    }
}
