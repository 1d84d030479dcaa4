//! SQL generation: compiled IR to SQL text through a dialect.
//!
//! Stages chain as CTEs. A group stage with nested turtles emits the
//! two-level group-set shape: an inner select that replicates rows across
//! group sets and groups by every scope's dimensions, and an outer select
//! that collapses each turtle scope into an array column and each scalar
//! aggregate back onto the outer rows.

use crate::model::expr::{AggregateFunc, BinaryOp, Expr, Literal, UnaryOp};
use crate::model::query::OrderDir;
use crate::model::types::ValueType;
use crate::planner::ir::{
    AggregateColumn, ColumnKind, CompiledPipeline, FromIR, JoinIR, OrderBySpec, OrderTarget,
    ResolvedAggIR, StageIR, StageKind, TurtleIR,
};

use super::dialect::{DialectField, DialectResult, SqlDialect, UnsupportedCapability};

/// Generates SQL text for compiled pipelines.
pub struct SqlGenerator<'a> {
    dialect: &'a dyn SqlDialect,
}

#[derive(Default)]
struct GenState {
    ctes: Vec<(String, String)>,
    next_stage: usize,
}

impl GenState {
    fn fresh_stage(&mut self) -> String {
        let name = format!("__stage{}", self.next_stage);
        self.next_stage += 1;
        name
    }

    fn unique_name(&mut self, base: &str) -> String {
        if !self.ctes.iter().any(|(n, _)| n == base) {
            return base.to_string();
        }
        let mut i = 1;
        loop {
            let candidate = format!("{}_{}", base, i);
            if !self.ctes.iter().any(|(n, _)| n == &candidate) {
                return candidate;
            }
            i += 1;
        }
    }
}

impl<'a> SqlGenerator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self { dialect }
    }

    /// Render a compiled pipeline as one SQL statement.
    pub fn generate(&self, pipeline: &CompiledPipeline) -> DialectResult<String> {
        let mut state = GenState::default();
        let body = self.pipeline_sql(pipeline, &mut state)?;
        if state.ctes.is_empty() {
            Ok(body)
        } else {
            let ctes = state
                .ctes
                .iter()
                .map(|(name, sql)| format!("{} AS (\n{}\n)", name, indent(sql)))
                .collect::<Vec<_>>()
                .join(",\n");
            Ok(format!("WITH {}\n{}", ctes, body))
        }
    }

    fn pipeline_sql(
        &self,
        pipeline: &CompiledPipeline,
        state: &mut GenState,
    ) -> DialectResult<String> {
        let last = pipeline.stages.len() - 1;
        let mut prior: Option<String> = None;
        for (i, stage) in pipeline.stages.iter().enumerate() {
            let sql = self.stage_sql(stage, prior.as_deref(), state)?;
            if i == last {
                return Ok(sql);
            }
            let name = state.fresh_stage();
            state.ctes.push((name.clone(), sql));
            prior = Some(name);
        }
        unreachable!("pipelines are never empty at generation time")
    }

    // =========================================================================
    // Stages
    // =========================================================================

    fn stage_sql(
        &self,
        stage: &StageIR,
        prior: Option<&str>,
        state: &mut GenState,
    ) -> DialectResult<String> {
        let from = self.from_clause(&stage.from, prior, state)?;

        match stage.kind {
            StageKind::Index => self.index_stage_sql(stage, &from),
            StageKind::Project => self.project_stage_sql(stage, &from),
            StageKind::Group if stage.group_set_count == 1 => {
                self.flat_group_sql(stage, &from)
            }
            StageKind::Group => self.group_set_sql(stage, &from, state),
        }
    }

    fn from_clause(
        &self,
        from: &FromIR,
        prior: Option<&str>,
        state: &mut GenState,
    ) -> DialectResult<String> {
        match from {
            FromIR::Table { table, joins } => {
                let mut sql = format!("FROM {} AS base", self.quote_table(table));
                for join in joins {
                    sql.push('\n');
                    sql.push_str(&self.join_clause(join)?);
                }
                Ok(sql)
            }
            FromIR::Pipeline { pipeline, joins } => {
                let body = self.pipeline_sql(pipeline, state)?;
                let name = state.fresh_stage();
                state.ctes.push((name.clone(), body));
                let mut sql = format!("FROM {} AS base", name);
                for join in joins {
                    sql.push('\n');
                    sql.push_str(&self.join_clause(join)?);
                }
                Ok(sql)
            }
            FromIR::Prior => {
                let name = prior.expect("prior stages follow a first stage");
                Ok(format!("FROM {}", name))
            }
        }
    }

    fn join_clause(&self, join: &JoinIR) -> DialectResult<String> {
        let table = self.quote_table(&join.table);
        let alias = join.sql_alias.clone();
        match &join.on {
            // Outer semantics: source rows survive without a match
            Some(on) => Ok(format!(
                "LEFT JOIN {} AS {} ON {}",
                table,
                alias,
                self.render_scalar(on)?
            )),
            None => Ok(format!("CROSS JOIN {} AS {}", table, alias)),
        }
    }

    fn flat_group_sql(&self, stage: &StageIR, from: &str) -> DialectResult<String> {
        let mut select = Vec::new();
        let mut dim_ordinals = Vec::new();
        for (i, col) in stage.columns.iter().enumerate() {
            let name = self.dialect.quote_identifier(&col.name);
            match &col.kind {
                ColumnKind::Dimension { expr } => {
                    dim_ordinals.push(i + 1);
                    select.push(format!("{} AS {}", self.render_scalar(expr)?, name));
                }
                ColumnKind::Aggregate(agg) => {
                    select.push(format!("{} AS {}", self.aggregate_sql(agg, None)?, name));
                }
                ColumnKind::Turtle { .. } => {
                    unreachable!("turtles force the group-set path")
                }
            }
        }

        let mut sql = format!("SELECT\n  {}\n{}", select.join(",\n  "), from);
        self.push_where(&mut sql, &stage.filters)?;
        if !dim_ordinals.is_empty() {
            sql.push_str(&format!("\nGROUP BY {}", join_ordinals(&dim_ordinals)));
        }
        self.push_order_limit(&mut sql, &stage.order_by, stage.limit);
        Ok(sql)
    }

    fn project_stage_sql(&self, stage: &StageIR, from: &str) -> DialectResult<String> {
        let mut select = Vec::new();
        for col in &stage.columns {
            let expr = match &col.kind {
                ColumnKind::Dimension { expr } => self.render_scalar(expr)?,
                _ => unreachable!("project stages output dimensions only"),
            };
            select.push(format!(
                "{} AS {}",
                expr,
                self.dialect.quote_identifier(&col.name)
            ));
        }

        let mut sql = format!("SELECT\n  {}\n{}", select.join(",\n  "), from);
        self.push_where(&mut sql, &stage.filters)?;
        self.push_order_limit(&mut sql, &stage.order_by, stage.limit);
        Ok(sql)
    }

    fn index_stage_sql(&self, stage: &StageIR, from: &str) -> DialectResult<String> {
        let mut parts = Vec::new();
        for field in &stage.index_fields {
            let value = if field.value_type == ValueType::String {
                self.render_scalar(&field.expr)?
            } else {
                self.dialect
                    .sql_cast(&self.render_scalar(&field.expr)?, &ValueType::String, false)?
            };
            let mut sql = format!(
                "SELECT\n  {} AS {},\n  {} AS {},\n  COUNT(*) AS {}\n{}",
                self.dialect.quote_string(&field.name),
                self.dialect.quote_identifier("field_name"),
                value,
                self.dialect.quote_identifier("field_value"),
                self.dialect.quote_identifier("weight"),
                from
            );
            self.push_where(&mut sql, &stage.filters)?;
            sql.push_str("\nGROUP BY 1, 2");
            parts.push(sql);
        }
        Ok(parts.join("\nUNION ALL\n"))
    }

    // =========================================================================
    // Group sets
    // =========================================================================

    fn group_set_sql(
        &self,
        stage: &StageIR,
        from: &str,
        state: &mut GenState,
    ) -> DialectResult<String> {
        // Inner select: one row-set replicated across group sets, grouped
        // by every scope's dimensions plus the discriminator.
        let mut select = vec!["group_set".to_string()];
        let mut group_ordinals = vec![1];

        // Outer dimensions are populated for every set so nested scopes
        // keep their parent keys.
        for col in &stage.columns {
            if let ColumnKind::Dimension { expr } = &col.kind {
                select.push(format!(
                    "{} AS {}",
                    self.render_scalar(expr)?,
                    self.internal_name(&col.name, 0)
                ));
                group_ordinals.push(select.len());
            }
        }
        // Turtle dimensions only exist within their own set
        for turtle in &stage.turtles {
            for col in &turtle.columns {
                if let ColumnKind::Dimension { expr } = &col.kind {
                    select.push(format!(
                        "CASE WHEN group_set={} THEN {} END AS {}",
                        turtle.group_set,
                        self.render_scalar(expr)?,
                        self.internal_name(&col.name, turtle.group_set)
                    ));
                    group_ordinals.push(select.len());
                }
            }
        }
        // Aggregates, conditioned on their scope
        for col in &stage.columns {
            if let ColumnKind::Aggregate(agg) = &col.kind {
                select.push(format!(
                    "{} AS {}",
                    self.aggregate_sql(agg, Some(0))?,
                    self.internal_name(&col.name, 0)
                ));
            }
        }
        for turtle in &stage.turtles {
            for col in &turtle.columns {
                if let ColumnKind::Aggregate(agg) = &col.kind {
                    select.push(format!(
                        "{} AS {}",
                        self.aggregate_sql(agg, Some(turtle.group_set))?,
                        self.internal_name(&col.name, turtle.group_set)
                    ));
                }
            }
        }

        let mut inner = format!(
            "SELECT\n  {}\n{}\n{}",
            select.join(",\n  "),
            from,
            self.dialect.sql_group_set_table(stage.group_set_count - 1)
        );

        // Shared filters apply to every set; a turtle's filters only
        // constrain its own set's rows.
        let mut predicates = stage
            .filters
            .iter()
            .map(|f| self.render_scalar(f))
            .collect::<DialectResult<Vec<_>>>()?;
        for turtle in &stage.turtles {
            if turtle.filters.is_empty() {
                continue;
            }
            let scoped = turtle
                .filters
                .iter()
                .map(|f| self.render_scalar(f))
                .collect::<DialectResult<Vec<_>>>()?
                .join(" AND ");
            predicates.push(format!(
                "(group_set <> {} OR ({}))",
                turtle.group_set, scoped
            ));
        }
        if !predicates.is_empty() {
            inner.push_str(&format!("\nWHERE {}", predicates.join(" AND ")));
        }
        inner.push_str(&format!("\nGROUP BY {}", join_ordinals(&group_ordinals)));

        let inner_name = state.fresh_stage();
        state.ctes.push((inner_name.clone(), inner));

        // Nested CTEs for deeper turtle scopes. The realized CTE name may
        // differ from the IR's suggestion when names collide, so the
        // per-turtle names are kept for struct-field references below.
        let mut nested_joins = Vec::new();
        let mut nested_names: Vec<Vec<String>> = Vec::new();
        for turtle in &stage.turtles {
            let mut names = Vec::new();
            for nested in &turtle.nested {
                let body = self.pipeline_sql(&nested.pipeline, state)?;
                let cte_name = state.unique_name(&nested.cte_name);
                state.ctes.push((cte_name.clone(), body));

                let on = nested
                    .join_keys
                    .iter()
                    .map(|key| {
                        let set = if turtle.columns.iter().any(|c| &c.name == key) {
                            turtle.group_set
                        } else {
                            0
                        };
                        self.dialect.sql_null_safe_eq(
                            &format!(
                                "{}.{}",
                                cte_name,
                                self.dialect.quote_identifier(key)
                            ),
                            &format!("{}.{}", inner_name, self.internal_name(key, set)),
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                nested_joins.push((cte_name.clone(), on));
                names.push(cte_name);
            }
            nested_names.push(names);
        }

        // Outer select: collapse back to one row per outer group
        let mut outer_select = Vec::new();
        let mut outer_group = Vec::new();
        for col in &stage.columns {
            let out_name = self.dialect.quote_identifier(&col.name);
            match &col.kind {
                ColumnKind::Dimension { .. } => {
                    outer_select.push(format!(
                        "{}.{} AS {}",
                        inner_name,
                        self.internal_name(&col.name, 0),
                        out_name
                    ));
                    outer_group.push(outer_select.len());
                }
                ColumnKind::Aggregate(_) => {
                    outer_select.push(format!(
                        "{} AS {}",
                        self.dialect.sql_any_value(&format!(
                            "{}.{}",
                            inner_name,
                            self.internal_name(&col.name, 0)
                        )),
                        out_name
                    ));
                }
                ColumnKind::Turtle { index } => {
                    let turtle = &stage.turtles[*index];
                    outer_select.push(format!(
                        "{} AS {}",
                        self.turtle_sql(turtle, &inner_name, &nested_names[*index])?,
                        out_name
                    ));
                }
            }
        }

        let mut outer = format!(
            "SELECT\n  {}\nFROM {}",
            outer_select.join(",\n  "),
            inner_name
        );
        for (cte_name, on) in &nested_joins {
            outer.push_str(&format!("\nLEFT JOIN {} ON {}", cte_name, on));
        }
        if !outer_group.is_empty() {
            outer.push_str(&format!("\nGROUP BY {}", join_ordinals(&outer_group)));
        }
        self.push_order_limit(&mut outer, &stage.order_by, stage.limit);
        Ok(outer)
    }

    fn turtle_sql(
        &self,
        turtle: &TurtleIR,
        inner_name: &str,
        nested_cte_names: &[String],
    ) -> DialectResult<String> {
        let mut fields = Vec::new();
        for col in &turtle.columns {
            fields.push(DialectField {
                sql_expression: format!(
                    "{}.{}",
                    inner_name,
                    self.internal_name(&col.name, turtle.group_set)
                ),
                sql_output_name: col.name.clone(),
                value_type: col.value_type.clone(),
            });
        }
        for (nested, cte_name) in turtle.nested.iter().zip(nested_cte_names) {
            for col_name in &nested.columns {
                fields.push(DialectField {
                    sql_expression: format!(
                        "{}.{}",
                        cte_name,
                        self.dialect.quote_identifier(col_name)
                    ),
                    sql_output_name: col_name.clone(),
                    value_type: ValueType::String,
                });
            }
        }

        let order_by = if turtle.order_by.is_empty() {
            None
        } else {
            let parts = turtle
                .order_by
                .iter()
                .map(|spec| {
                    let target = match &spec.target {
                        OrderTarget::Column(name) => format!(
                            "{}.{}",
                            inner_name,
                            self.internal_name(name, turtle.group_set)
                        ),
                        OrderTarget::Ordinal(i) => i.to_string(),
                    };
                    format!("{} {}", target, spec.dir.sql())
                })
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("ORDER BY {}", parts))
        };

        self.dialect.sql_aggregate_turtle(
            turtle.group_set,
            &fields,
            order_by.as_deref(),
            turtle.limit,
        )
    }

    /// The internal column name carrying a scope's value through the
    /// group-set stage: `<name>__<set>`.
    fn internal_name(&self, name: &str, group_set: usize) -> String {
        self.dialect
            .quote_identifier(&format!("{}__{}", name, group_set))
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    fn aggregate_sql(
        &self,
        agg: &AggregateColumn,
        group_set: Option<usize>,
    ) -> DialectResult<String> {
        let mut next = 0;
        let sql = self.render_agg(&agg.expr, &agg.aggs, &mut next, group_set)?;
        debug_assert_eq!(next, agg.aggs.len(), "every aggregate node consumed");
        Ok(sql)
    }

    fn render_agg(
        &self,
        expr: &Expr,
        aggs: &[ResolvedAggIR],
        next: &mut usize,
        group_set: Option<usize>,
    ) -> DialectResult<String> {
        match expr {
            Expr::Aggregate(node) => {
                let resolved = &aggs[*next];
                *next += 1;
                let inner = match &node.input {
                    Some(input) => Some(self.render_scalar(input)?),
                    None => None,
                };
                self.one_aggregate_sql(resolved, inner.as_deref(), group_set)
            }
            Expr::Binary { left, op, right } => Ok(format!(
                "({} {} {})",
                self.render_agg(left, aggs, next, group_set)?,
                op.sql(),
                self.render_agg(right, aggs, next, group_set)?
            )),
            Expr::Unary { op, expr } => {
                let inner = self.render_agg(expr, aggs, next, group_set)?;
                Ok(match op {
                    UnaryOp::Neg => format!("(-{})", inner),
                    UnaryOp::Not => format!("(NOT {})", inner),
                })
            }
            Expr::Call { name, args } => {
                let rendered = args
                    .iter()
                    .map(|a| self.render_agg(a, aggs, next, group_set))
                    .collect::<DialectResult<Vec<_>>>()?;
                Ok(format!("{}({})", name, rendered.join(", ")))
            }
            Expr::Cast { expr, to, safe } => {
                let inner = self.render_agg(expr, aggs, next, group_set)?;
                self.dialect.sql_cast(&inner, to, *safe)
            }
            Expr::Trunc { expr, unit } => {
                let inner = self.render_agg(expr, aggs, next, group_set)?;
                Ok(self.dialect.sql_trunc(&inner, *unit))
            }
            Expr::Extract { expr, unit } => {
                let inner = self.render_agg(expr, aggs, next, group_set)?;
                Ok(self.dialect.sql_extract(&inner, *unit))
            }
            Expr::TimeAdd {
                expr,
                negative,
                amount,
                unit,
            } => {
                let inner = self.render_agg(expr, aggs, next, group_set)?;
                let amount = self.render_agg(amount, aggs, next, group_set)?;
                Ok(self.dialect.sql_time_add(&inner, *negative, &amount, *unit))
            }
            _ => self.render_scalar(expr),
        }
    }

    fn one_aggregate_sql(
        &self,
        agg: &ResolvedAggIR,
        inner: Option<&str>,
        group_set: Option<usize>,
    ) -> DialectResult<String> {
        let cond = |func: &str, distinct: bool, input: Option<&str>| -> String {
            match group_set {
                Some(k) => self
                    .dialect
                    .sql_conditional_aggregate(func, distinct, input, k),
                None => super::dialect::helpers::plain_aggregate(func, distinct, input),
            }
        };

        if let Some(key) = &agg.distinct_key {
            // Fan-out-safe aggregation over the locality's primary key
            let key_sql = format!(
                "{}.{}",
                key.sql_alias,
                self.dialect.quote_identifier(&key.column)
            );
            return Ok(match agg.func {
                AggregateFunc::Count => cond("COUNT", true, Some(&key_sql)),
                AggregateFunc::Sum => {
                    let hashed = self.dialect.sql_sum_distinct_hashed_key(&key_sql)?;
                    let keyed = format!(
                        "({} + {})",
                        hashed,
                        inner.expect("sum always has an input")
                    );
                    format!(
                        "({} - {})",
                        cond("SUM", true, Some(&keyed)),
                        cond("SUM", true, Some(&hashed))
                    )
                }
                AggregateFunc::Avg => {
                    let hashed = self.dialect.sql_sum_distinct_hashed_key(&key_sql)?;
                    let keyed = format!(
                        "({} + {})",
                        hashed,
                        inner.expect("avg always has an input")
                    );
                    format!(
                        "(({} - {}) / NULLIF({}, 0))",
                        cond("SUM", true, Some(&keyed)),
                        cond("SUM", true, Some(&hashed)),
                        cond("COUNT", true, Some(&key_sql))
                    )
                }
                // min/max/count_distinct never carry a dedup key
                _ => cond(agg.func.sql_name(), false, inner),
            });
        }

        Ok(match agg.func {
            AggregateFunc::CountDistinct => cond("COUNT", true, inner),
            AggregateFunc::Count => cond("COUNT", false, inner),
            _ => cond(agg.func.sql_name(), false, inner),
        })
    }

    // =========================================================================
    // Scalar expressions
    // =========================================================================

    fn render_scalar(&self, expr: &Expr) -> DialectResult<String> {
        match expr {
            // Entity aliases are generated (base, join aliases) and never
            // need quoting; column names come from the model and do.
            Expr::Column { entity, column } => Ok(match entity {
                Some(entity) => {
                    format!("{}.{}", entity, self.dialect.quote_identifier(column))
                }
                None => self.dialect.quote_identifier(column),
            }),
            Expr::Literal(lit) => self.render_literal(lit),
            Expr::Binary { left, op, right } => self.render_binary(left, *op, right),
            Expr::Unary { op, expr } => {
                let inner = self.render_scalar(expr)?;
                Ok(match op {
                    UnaryOp::Neg => format!("(-{})", inner),
                    UnaryOp::Not => format!("(NOT {})", inner),
                })
            }
            Expr::Call { name, args } => {
                let rendered = args
                    .iter()
                    .map(|a| self.render_scalar(a))
                    .collect::<DialectResult<Vec<_>>>()?;
                Ok(format!("{}({})", name, rendered.join(", ")))
            }
            Expr::Trunc { expr, unit } => {
                Ok(self.dialect.sql_trunc(&self.render_scalar(expr)?, *unit))
            }
            Expr::Extract { expr, unit } => {
                Ok(self.dialect.sql_extract(&self.render_scalar(expr)?, *unit))
            }
            Expr::TimeAdd {
                expr,
                negative,
                amount,
                unit,
            } => Ok(self.dialect.sql_time_add(
                &self.render_scalar(expr)?,
                *negative,
                &self.render_scalar(amount)?,
                *unit,
            )),
            Expr::Cast { expr, to, safe } => {
                self.dialect.sql_cast(&self.render_scalar(expr)?, to, *safe)
            }
            Expr::Aggregate(_) | Expr::FieldRef { .. } => Err(UnsupportedCapability {
                dialect: self.dialect.name(),
                capability: "an unresolved expression reached generation",
            }),
        }
    }

    fn render_binary(&self, left: &Expr, op: BinaryOp, right: &Expr) -> DialectResult<String> {
        // NULL comparisons use IS [NOT] NULL
        if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
            if let Some(other) = null_comparison(left, right) {
                let rendered = self.render_scalar(other)?;
                return Ok(match op {
                    BinaryOp::Eq => format!("({} IS NULL)", rendered),
                    _ => format!("({} IS NOT NULL)", rendered),
                });
            }
            // Regex comparisons become match predicates
            if let Some((value, pattern)) = regex_comparison(left, right) {
                let matched = self.dialect.sql_regexp_match(
                    &self.render_scalar(value)?,
                    &self.dialect.quote_string(pattern),
                )?;
                return Ok(match op {
                    BinaryOp::Eq => matched,
                    _ => format!("(NOT {})", matched),
                });
            }
        }
        Ok(format!(
            "({} {} {})",
            self.render_scalar(left)?,
            op.sql(),
            self.render_scalar(right)?
        ))
    }

    fn render_literal(&self, lit: &Literal) -> DialectResult<String> {
        Ok(match lit {
            Literal::String(s) => self.dialect.quote_string(s),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => {
                let mut buffer = ryu::Buffer::new();
                buffer.format(*f).to_string()
            }
            Literal::Bool(b) => self.dialect.format_bool(*b).to_string(),
            Literal::Null => "NULL".to_string(),
            Literal::Date(d) => self.dialect.sql_literal_time(d, false),
            Literal::Timestamp(t) => self.dialect.sql_literal_time(t, true),
            // Standalone regex values render as their pattern text
            Literal::Regex(p) => self.dialect.quote_string(p),
        })
    }

    // =========================================================================
    // Clause helpers
    // =========================================================================

    fn push_where(&self, sql: &mut String, filters: &[Expr]) -> DialectResult<()> {
        if filters.is_empty() {
            return Ok(());
        }
        let rendered = filters
            .iter()
            .map(|f| self.render_scalar(f))
            .collect::<DialectResult<Vec<_>>>()?;
        sql.push_str(&format!("\nWHERE {}", rendered.join(" AND ")));
        Ok(())
    }

    fn push_order_limit(&self, sql: &mut String, order_by: &[OrderBySpec], limit: Option<u64>) {
        if !order_by.is_empty() {
            let parts = order_by
                .iter()
                .map(|spec| {
                    let target = match &spec.target {
                        OrderTarget::Ordinal(i) => i.to_string(),
                        OrderTarget::Column(name) => self.dialect.quote_identifier(name),
                    };
                    match spec.dir {
                        OrderDir::Asc => format!("{} ASC", target),
                        OrderDir::Desc => format!("{} DESC", target),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nORDER BY {}", parts));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!("\nLIMIT {}", limit));
        }
    }

    fn quote_table(&self, table: &str) -> String {
        table
            .split('.')
            .map(|part| self.dialect.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn null_comparison<'e>(left: &'e Expr, right: &'e Expr) -> Option<&'e Expr> {
    match (left, right) {
        (Expr::Literal(Literal::Null), other) | (other, Expr::Literal(Literal::Null)) => {
            Some(other)
        }
        _ => None,
    }
}

fn regex_comparison<'e>(left: &'e Expr, right: &'e Expr) -> Option<(&'e Expr, &'e str)> {
    match (left, right) {
        (Expr::Literal(Literal::Regex(p)), other) | (other, Expr::Literal(Literal::Regex(p))) => {
            Some((other, p))
        }
        _ => None,
    }
}

fn join_ordinals(ordinals: &[usize]) -> String {
    ordinals
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn indent(sql: &str) -> String {
    sql.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
