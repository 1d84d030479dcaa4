//! Parser for the Strata modeling language using chumsky.
//!
//! Transforms the token stream from the lexer into an AST. The grammar is
//! block-structured: explores and queries at the top level, brace-delimited
//! blocks inside, statements terminated with semicolons.

use chumsky::input::ValueInput;
use chumsky::prelude::*;

use super::ast::*;
use super::lexer::Token;
use super::span::Spanned;

/// Convert a SimpleSpan to our Span type (Range<usize>)
fn to_span(span: SimpleSpan) -> std::ops::Range<usize> {
    span.start..span.end
}

/// Items inside an explore body, folded into an `ExploreDef` afterwards.
#[derive(Debug, Clone)]
enum ExploreItem {
    From(Spanned<SourceRef>),
    PrimaryKey(Spanned<String>),
    Dimensions(Vec<Spanned<DimensionDecl>>),
    Measures(Vec<Spanned<MeasureDecl>>),
    Joins(Vec<Spanned<JoinDecl>>),
    Queries(Vec<Spanned<NamedQueryDecl>>),
    Renames(Vec<Spanned<RenameDecl>>),
    Accept(Spanned<Vec<String>>),
    Except(Spanned<Vec<String>>),
    Where(Vec<Spanned<Expr>>),
}

/// Items inside a stage body, folded into a `StageDecl` afterwards.
#[derive(Debug, Clone)]
enum StageItem {
    Group(Vec<Spanned<FieldPath>>),
    Aggregate(Vec<Spanned<AggregateDecl>>),
    Project(Vec<Spanned<FieldPath>>),
    Index(Vec<Spanned<FieldPath>>),
    Nest(Vec<Spanned<String>>),
    Where(Vec<Spanned<Expr>>),
    Sort(Vec<Spanned<SortDecl>>),
    Limit(Spanned<u64>),
}

fn fold_stage(items: Vec<StageItem>) -> StageDecl {
    let mut stage = StageDecl::default();
    for item in items {
        match item {
            StageItem::Group(v) => stage.group.extend(v),
            StageItem::Aggregate(v) => stage.aggregate.extend(v),
            StageItem::Project(v) => stage.project.extend(v),
            StageItem::Index(v) => stage.index.extend(v),
            StageItem::Nest(v) => stage.nests.extend(v),
            StageItem::Where(v) => stage.filters.extend(v),
            StageItem::Sort(v) => stage.sort.extend(v),
            StageItem::Limit(n) => stage.limit = Some(n),
        }
    }
    stage
}

/// Create the main parser for the Strata language.
///
/// The parser is generic over the input type, accepting any `ValueInput`
/// that produces `Token` values with `SimpleSpan` spans.
pub fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Model, extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    // ==========================================================================
    // Basic token parsers
    // ==========================================================================

    let ident = select! {
        Token::Ident(s) => s.to_string(),
    }
    .labelled("identifier");

    let string_lit = select! {
        Token::StringLit(s) => s.to_string(),
    }
    .labelled("string literal");

    let type_name = select! {
        Token::TypeString => TypeName::String,
        Token::TypeNumber => TypeName::Number,
        Token::TypeBool => TypeName::Bool,
        Token::TypeDate => TypeName::Date,
        Token::TypeTimestamp => TypeName::Timestamp,
    }
    .labelled("type name");

    // A dotted field path: a.b.c
    let path = ident
        .clone()
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<_>>()
        .labelled("field path");

    let spanned_path = path
        .clone()
        .map_with(|p, e| Spanned::new(p, to_span(e.span())));

    // ==========================================================================
    // Expressions
    // ==========================================================================

    let expr = recursive(|expr| {
        let literal = select! {
            Token::Number(s) => Literal::Number(s.to_string()),
            Token::StringLit(s) => Literal::String(s.to_string()),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::RegexLit(s) => Literal::Regex(s.to_string()),
            Token::TimeLit(s) => {
                if s.contains('T') {
                    Literal::Timestamp(s.to_string())
                } else {
                    Literal::Date(s.to_string())
                }
            },
        }
        .map(Expr::Literal)
        .labelled("literal");

        // Argument lists: ( expr, expr, ... )
        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        // A path followed by an optional call:
        //   name           -> Ref
        //   a.b.c          -> Ref
        //   sum(...)       -> Call
        //   items.qty.sum() -> PathCall
        let path_or_call =
            path.clone()
                .then(args.clone().or_not())
                .map(|(segments, maybe_args)| match maybe_args {
                    None => Expr::Ref(segments),
                    Some(call_args) => {
                        if segments.len() == 1 {
                            Expr::Call {
                                name: segments.into_iter().next().unwrap(),
                                args: call_args,
                            }
                        } else {
                            let mut segments = segments;
                            let name = segments.pop().unwrap();
                            Expr::PathCall {
                                path: segments,
                                name,
                                args: call_args,
                            }
                        }
                    }
                });

        // Sibling-field sigil: @name
        let sigil_ref = just(Token::At)
            .ignore_then(ident.clone())
            .map(|name| Expr::Ref(vec![name]));

        let paren = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|inner: Spanned<Expr>| inner.value);

        let atom = choice((literal, sigil_ref, path_or_call, paren))
            .map_with(|v, e| Spanned::new(v, to_span(e.span())));

        // Unary: -x, not x
        let unary_op = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Not).to(UnaryOp::Not),
        ));
        let unary = unary_op
            .map_with(|op, e| (op, to_span(e.span())))
            .repeated()
            .foldr(atom, |(op, op_span), inner: Spanned<Expr>| {
                let span = op_span.start..inner.span.end;
                Spanned::new(
                    Expr::Unary {
                        op,
                        expr: Box::new(inner),
                    },
                    span,
                )
            });

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
            ))
            .then(unary)
            .repeated(),
            fold_binary,
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            fold_binary,
        );

        // Comparison is non-chaining: `a = b = c` is a syntax error.
        let comparison_op = choice((
            just(Token::Eq).to(BinaryOp::Eq),
            just(Token::NotEq).to(BinaryOp::NotEq),
            just(Token::LtEq).to(BinaryOp::LtEq),
            just(Token::GtEq).to(BinaryOp::GtEq),
            just(Token::Lt).to(BinaryOp::Lt),
            just(Token::Gt).to(BinaryOp::Gt),
        ));
        let comparison = sum
            .clone()
            .then(comparison_op.then(sum).or_not())
            .map(|(left, rest)| match rest {
                None => left,
                Some((op, right)) => {
                    let span = left.span.start..right.span.end;
                    Spanned::new(
                        Expr::Binary {
                            left: Box::new(left),
                            op,
                            right: Box::new(right),
                        },
                        span,
                    )
                }
            });

        let conjunction = comparison.clone().foldl(
            just(Token::And).to(BinaryOp::And).then(comparison).repeated(),
            fold_binary,
        );

        conjunction.clone().foldl(
            just(Token::Or).to(BinaryOp::Or).then(conjunction).repeated(),
            fold_binary,
        )
    });

    // ==========================================================================
    // Shared blocks
    // ==========================================================================

    // A list of `name;` entries in braces
    let name_list = ident
        .clone()
        .then_ignore(just(Token::Semicolon))
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // A list of `path;` entries in braces
    let path_list = spanned_path
        .clone()
        .then_ignore(just(Token::Semicolon))
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // where { expr; expr; ... }
    let where_block = just(Token::Where).ignore_then(
        expr.clone()
            .then_ignore(just(Token::Semicolon))
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // The naming separator: both `=` and `is` are accepted.
    let name_sep = just(Token::Eq).or(just(Token::Is)).ignored();

    // ==========================================================================
    // Stage blocks
    // ==========================================================================

    // aggregate { order_count; item_count = items.count(); }
    let aggregate_decl = choice((
        ident
            .clone()
            .map_with(|n, e| Spanned::new(n, to_span(e.span())))
            .then_ignore(name_sep.clone())
            .then(expr.clone())
            .map(|(name, expr)| AggregateDecl {
                name: Some(name),
                expr,
            }),
        expr.clone().map(|expr| AggregateDecl { name: None, expr }),
    ))
    .then_ignore(just(Token::Semicolon))
    .map_with(|a, e| Spanned::new(a, to_span(e.span())));

    let aggregate_block = just(Token::Aggregate).ignore_then(
        aggregate_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // sort { total desc; created_at; }
    let sort_decl = spanned_path
        .clone()
        .then(
            choice((
                just(Token::Asc).to(SortDir::Asc),
                just(Token::Desc).to(SortDir::Desc),
            ))
            .or_not(),
        )
        .then_ignore(just(Token::Semicolon))
        .map(|(field, dir)| SortDecl { field, dir })
        .map_with(|s, e| Spanned::new(s, to_span(e.span())));

    let sort_block = just(Token::Sort).ignore_then(
        sort_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    let number_lit = select! {
        Token::Number(s) => s.to_string(),
    };

    let limit_stmt = just(Token::Limit)
        .ignore_then(number_lit.map_with(|n: String, e| {
            Spanned::new(n.parse::<u64>().unwrap_or(0), to_span(e.span()))
        }))
        .then_ignore(just(Token::Semicolon));

    let nest_block = just(Token::Nest).ignore_then(
        ident
            .clone()
            .map_with(|n, e| Spanned::new(n, to_span(e.span())))
            .then_ignore(just(Token::Semicolon))
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    let stage_item = choice((
        just(Token::Group)
            .ignore_then(path_list.clone())
            .map(StageItem::Group),
        aggregate_block.map(StageItem::Aggregate),
        just(Token::Project)
            .ignore_then(path_list.clone())
            .map(StageItem::Project),
        just(Token::Index)
            .ignore_then(path_list.clone())
            .map(StageItem::Index),
        nest_block.map(StageItem::Nest),
        where_block.clone().map(StageItem::Where),
        sort_block.map(StageItem::Sort),
        limit_stmt.map(StageItem::Limit),
    ));

    // The body of one stage (no braces; the caller supplies delimiters)
    let stage_body = stage_item
        .clone()
        .repeated()
        .collect::<Vec<_>>()
        .map(fold_stage);

    // A braced stage: { group {...} aggregate {...} }
    let braced_stage = stage_body
        .clone()
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .map_with(|s, e| Spanned::new(s, to_span(e.span())));

    // Continuation stages: -> { ... } -> { ... }
    let stage_chain = just(Token::Arrow)
        .ignore_then(braced_stage.clone())
        .repeated()
        .collect::<Vec<_>>();

    // ==========================================================================
    // Explore body
    // ==========================================================================

    // from "table"; | from other; | from other.query;
    let source_ref = choice((
        string_lit.clone().map(SourceRef::Table),
        ident
            .clone()
            .then(just(Token::Dot).ignore_then(ident.clone()).or_not())
            .map(|(name, query)| match query {
                None => SourceRef::Explore(name),
                Some(q) => SourceRef::ExploreQuery(name, q),
            }),
    ));

    let from_stmt = just(Token::From)
        .ignore_then(source_ref.map_with(|s, e| Spanned::new(s, to_span(e.span()))))
        .then_ignore(just(Token::Semicolon));

    let primary_key_stmt = just(Token::PrimaryKey)
        .ignore_then(
            ident
                .clone()
                .map_with(|n, e| Spanned::new(n, to_span(e.span()))),
        )
        .then_ignore(just(Token::Semicolon));

    // dimensions { status string; region = upper(@status); }
    let dimension_decl = choice((
        ident
            .clone()
            .map_with(|n, e| Spanned::new(n, to_span(e.span())))
            .then(type_name)
            .then_ignore(just(Token::Semicolon))
            .map(|(name, ty)| DimensionDecl {
                name,
                kind: DimensionKind::Column(ty),
            }),
        ident
            .clone()
            .map_with(|n, e| Spanned::new(n, to_span(e.span())))
            .then_ignore(name_sep.clone())
            .then(expr.clone())
            .then_ignore(just(Token::Semicolon))
            .map(|(name, expr)| DimensionDecl {
                name,
                kind: DimensionKind::Derived(expr),
            }),
    ))
    .map_with(|d, e| Spanned::new(d, to_span(e.span())));

    let dimensions_block = just(Token::Dimensions).ignore_then(
        dimension_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // measures { total = sum(@revenue); }
    let measure_decl = ident
        .clone()
        .map_with(|n, e| Spanned::new(n, to_span(e.span())))
        .then_ignore(name_sep.clone())
        .then(expr.clone())
        .then_ignore(just(Token::Semicolon))
        .map(|(name, expr)| MeasureDecl { name, expr })
        .map_with(|m, e| Spanned::new(m, to_span(e.span())));

    let measures_block = just(Token::Measures).ignore_then(
        measure_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // joins { items many order_items on order_id; promos cross promotions; }
    let join_kind = choice((
        just(Token::One).to(JoinKindName::One),
        just(Token::Many).to(JoinKindName::Many),
        just(Token::Cross).to(JoinKindName::Cross),
    ));

    // `on fk_field` or `on (expr)`
    let join_on = just(Token::On).ignore_then(choice((
        expr.clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|e: Spanned<Expr>| JoinOn::Expr(e.value)),
        ident.clone().map(JoinOn::ForeignKey),
    )));

    let join_decl = ident
        .clone()
        .map_with(|n, e| Spanned::new(n, to_span(e.span())))
        .then(join_kind)
        .then(
            ident
                .clone()
                .map_with(|n, e| Spanned::new(n, to_span(e.span()))),
        )
        .then(
            join_on
                .map_with(|j, e| Spanned::new(j, to_span(e.span())))
                .or_not(),
        )
        .then_ignore(just(Token::Semicolon))
        .map(|(((alias, kind), target), on)| JoinDecl {
            alias,
            kind,
            target,
            on,
        })
        .map_with(|j, e| Spanned::new(j, to_span(e.span())));

    let joins_block = just(Token::Joins).ignore_then(
        join_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // queries { by_status { group { status; } aggregate { order_count; } } }
    let named_query_decl = ident
        .clone()
        .map_with(|n, e| Spanned::new(n, to_span(e.span())))
        .then(braced_stage.clone())
        .then(stage_chain.clone())
        .map(|((name, first), rest)| {
            let mut stages = vec![first];
            stages.extend(rest);
            NamedQueryDecl { name, stages }
        })
        .map_with(|q, e| Spanned::new(q, to_span(e.span())));

    let queries_block = just(Token::Queries).ignore_then(
        named_query_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    // rename { shipped_on is ship_date; }
    let rename_decl = ident
        .clone()
        .map_with(|n, e| Spanned::new(n, to_span(e.span())))
        .then_ignore(name_sep.clone())
        .then(
            ident
                .clone()
                .map_with(|n, e| Spanned::new(n, to_span(e.span()))),
        )
        .then_ignore(just(Token::Semicolon))
        .map(|(new_name, old_name)| RenameDecl { new_name, old_name })
        .map_with(|r, e| Spanned::new(r, to_span(e.span())));

    let rename_block = just(Token::Rename).ignore_then(
        rename_decl
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace)),
    );

    let accept_block = just(Token::Accept)
        .ignore_then(name_list.clone())
        .map_with(|names, e| Spanned::new(names, to_span(e.span())));

    let except_block = just(Token::Except)
        .ignore_then(name_list.clone())
        .map_with(|names, e| Spanned::new(names, to_span(e.span())));

    let explore_item = choice((
        from_stmt.map(ExploreItem::From),
        primary_key_stmt.map(ExploreItem::PrimaryKey),
        dimensions_block.map(ExploreItem::Dimensions),
        measures_block.map(ExploreItem::Measures),
        joins_block.map(ExploreItem::Joins),
        queries_block.map(ExploreItem::Queries),
        rename_block.map(ExploreItem::Renames),
        accept_block.map(ExploreItem::Accept),
        except_block.map(ExploreItem::Except),
        where_block.clone().map(ExploreItem::Where),
    ));

    let explore_def = just(Token::Explore)
        .ignore_then(
            ident
                .clone()
                .map_with(|n, e| Spanned::new(n, to_span(e.span()))),
        )
        .then(
            explore_item
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .try_map(|(name, items), span| {
            let name_span = name.span.clone();
            let mut def = ExploreDef {
                name,
                source: Spanned::new(SourceRef::Table(String::new()), name_span),
                primary_key: None,
                dimensions: Vec::new(),
                measures: Vec::new(),
                joins: Vec::new(),
                queries: Vec::new(),
                renames: Vec::new(),
                accept: None,
                except: None,
                filters: Vec::new(),
            };
            let mut saw_from = false;
            for item in items {
                match item {
                    ExploreItem::From(s) => {
                        def.source = s;
                        saw_from = true;
                    }
                    ExploreItem::PrimaryKey(k) => def.primary_key = Some(k),
                    ExploreItem::Dimensions(v) => def.dimensions.extend(v),
                    ExploreItem::Measures(v) => def.measures.extend(v),
                    ExploreItem::Joins(v) => def.joins.extend(v),
                    ExploreItem::Queries(v) => def.queries.extend(v),
                    ExploreItem::Renames(v) => def.renames.extend(v),
                    ExploreItem::Accept(v) => def.accept = Some(v),
                    ExploreItem::Except(v) => def.except = Some(v),
                    ExploreItem::Where(v) => def.filters.extend(v),
                }
            }
            if !saw_from {
                return Err(Rich::custom(
                    span,
                    format!("explore '{}' is missing a 'from' clause", def.name.value),
                ));
            }
            Ok(def)
        });

    // ==========================================================================
    // Query definition
    // ==========================================================================

    let query_def = just(Token::Query)
        .ignore_then(
            ident
                .clone()
                .map_with(|n, e| Spanned::new(n, to_span(e.span()))),
        )
        .then(
            just(Token::From)
                .ignore_then(
                    ident
                        .clone()
                        .map_with(|n, e| Spanned::new(n, to_span(e.span()))),
                )
                .then_ignore(just(Token::Semicolon))
                .then(stage_body.map_with(|s, e| Spanned::new(s, to_span(e.span()))))
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .then(stage_chain)
        .map(|((name, (from, first)), rest)| {
            let mut stages = vec![first];
            stages.extend(rest);
            QueryDef { name, from, stages }
        });

    // ==========================================================================
    // Model (root)
    // ==========================================================================

    let import_stmt = just(Token::Import)
        .ignore_then(
            string_lit
                .clone()
                .map_with(|s, e| Spanned::new(s, to_span(e.span()))),
        )
        .then_ignore(just(Token::Semicolon));

    let item = choice((
        import_stmt.map(Item::Import),
        explore_def.map(Item::Explore),
        query_def.map(Item::Query),
    ))
    .map_with(|i, e| Spanned::new(i, to_span(e.span())));

    item.repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|items| Model { items })
}

/// Combine two operands into a spanned binary expression; used by every
/// precedence layer's fold.
fn fold_binary(left: Spanned<Expr>, (op, right): (BinaryOp, Spanned<Expr>)) -> Spanned<Expr> {
    let span = left.span.start..right.span.end;
    Spanned::new(
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    /// Parse source text, panicking with diagnostics on failure.
    fn parse_str(input: &str) -> Model {
        let result = parse(input);
        if !result.is_ok() {
            panic!("parse failed: {:?}", result.diagnostics);
        }
        result.model.expect("model should be present")
    }

    fn first_explore(model: &Model) -> &ExploreDef {
        match &model.items[0].value {
            Item::Explore(e) => e,
            other => panic!("expected explore, got {:?}", other),
        }
    }

    fn first_query(model: &Model) -> &QueryDef {
        for item in &model.items {
            if let Item::Query(q) = &item.value {
                return q;
            }
        }
        panic!("no query in model");
    }

    #[test]
    fn test_parse_minimal_explore() {
        let model = parse_str(
            r#"
            explore orders {
                from "raw.orders";
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.name.value, "orders");
        assert_eq!(
            explore.source.value,
            SourceRef::Table("raw.orders".to_string())
        );
    }

    #[test]
    fn test_parse_explore_missing_from_is_error() {
        let result = parse("explore orders { primary_key id; }");
        assert!(result.has_errors());
    }

    #[test]
    fn test_parse_dimensions() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                dimensions {
                    status string;
                    amount number;
                    created_at timestamp;
                    loud_status = upper(@status);
                }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.dimensions.len(), 4);
        assert_eq!(explore.dimensions[0].value.name.value, "status");
        assert!(matches!(
            explore.dimensions[0].value.kind,
            DimensionKind::Column(TypeName::String)
        ));
        assert!(matches!(
            explore.dimensions[2].value.kind,
            DimensionKind::Column(TypeName::Timestamp)
        ));
        match &explore.dimensions[3].value.kind {
            DimensionKind::Derived(expr) => match &expr.value {
                Expr::Call { name, args } => {
                    assert_eq!(name, "upper");
                    assert_eq!(args.len(), 1);
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected derived dimension, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_measures_both_separators() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                measures {
                    order_count = count();
                    total_revenue is sum(@revenue);
                }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.measures.len(), 2);
        assert_eq!(explore.measures[0].value.name.value, "order_count");
        assert_eq!(explore.measures[1].value.name.value, "total_revenue");
    }

    #[test]
    fn test_parse_joins() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                joins {
                    items many order_items on order_id;
                    customer one customers on customer_id;
                    promos cross promotions;
                }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.joins.len(), 3);
        let items = &explore.joins[0].value;
        assert_eq!(items.alias.value, "items");
        assert_eq!(items.kind, JoinKindName::Many);
        assert_eq!(items.target.value, "order_items");
        assert!(matches!(
            items.on.as_ref().map(|o| &o.value),
            Some(JoinOn::ForeignKey(k)) if k == "order_id"
        ));
        let promos = &explore.joins[2].value;
        assert_eq!(promos.kind, JoinKindName::Cross);
        assert!(promos.on.is_none());
    }

    #[test]
    fn test_parse_join_expr_predicate() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                joins {
                    items many order_items on (@id = items.order_id);
                }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert!(matches!(
            explore.joins[0].value.on.as_ref().map(|o| &o.value),
            Some(JoinOn::Expr(Expr::Binary { .. }))
        ));
    }

    #[test]
    fn test_parse_named_queries() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                queries {
                    by_status {
                        group { status; }
                        aggregate { order_count; }
                    }
                }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.queries.len(), 1);
        let q = &explore.queries[0].value;
        assert_eq!(q.name.value, "by_status");
        assert_eq!(q.stages.len(), 1);
        assert_eq!(q.stages[0].value.group.len(), 1);
        assert_eq!(q.stages[0].value.aggregate.len(), 1);
    }

    #[test]
    fn test_parse_rename_accept_except() {
        let model = parse_str(
            r#"
            explore slim_orders {
                from orders;
                rename { shipped_on is ship_date; }
                except { internal_code; }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.renames.len(), 1);
        assert_eq!(explore.renames[0].value.new_name.value, "shipped_on");
        assert_eq!(explore.renames[0].value.old_name.value, "ship_date");
        assert!(explore.accept.is_none());
        assert_eq!(
            explore.except.as_ref().unwrap().value,
            vec!["internal_code".to_string()]
        );
    }

    #[test]
    fn test_parse_query_with_stages() {
        let model = parse_str(
            r#"
            explore orders { from "orders"; }

            query dashboard {
                from orders;
                group { status; }
                aggregate { total_revenue; item_count = items.count(); }
                nest { by_status; }
                sort { total_revenue desc; }
                limit 10;
            } -> {
                project { status; }
                limit 5;
            }
            "#,
        );
        let query = first_query(&model);
        assert_eq!(query.name.value, "dashboard");
        assert_eq!(query.from.value, "orders");
        assert_eq!(query.stages.len(), 2);

        let first = &query.stages[0].value;
        assert_eq!(first.group.len(), 1);
        assert_eq!(first.aggregate.len(), 2);
        assert_eq!(first.nests.len(), 1);
        assert_eq!(first.sort.len(), 1);
        assert_eq!(first.limit.as_ref().unwrap().value, 10);
        assert!(first.aggregate[0].value.name.is_none());
        assert_eq!(
            first.aggregate[1].value.name.as_ref().unwrap().value,
            "item_count"
        );

        let second = &query.stages[1].value;
        assert_eq!(second.project.len(), 1);
        assert_eq!(second.limit.as_ref().unwrap().value, 5);
    }

    #[test]
    fn test_parse_path_call() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                measures { avg_price = items.price.avg(); }
            }
            "#,
        );
        let explore = first_explore(&model);
        match &explore.measures[0].value.expr.value {
            Expr::PathCall { path, name, args } => {
                assert_eq!(path, &vec!["items".to_string(), "price".to_string()]);
                assert_eq!(name, "avg");
                assert!(args.is_empty());
            }
            other => panic!("expected path call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_expression_precedence() {
        let model = parse_str(
            r#"
            explore t {
                from "t";
                dimensions { m = a + b * c; }
            }
            "#,
        );
        let explore = first_explore(&model);
        match &explore.dimensions[0].value.kind {
            DimensionKind::Derived(expr) => match &expr.value {
                Expr::Binary { op, right, .. } => {
                    assert_eq!(*op, BinaryOp::Add);
                    assert!(matches!(
                        right.value,
                        Expr::Binary {
                            op: BinaryOp::Mul,
                            ..
                        }
                    ));
                }
                other => panic!("expected binary, got {:?}", other),
            },
            other => panic!("expected derived, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_where_filters() {
        let model = parse_str(
            r#"
            explore orders {
                from "orders";
                where { status != 'cancelled'; }
            }

            query q {
                from orders;
                group { status; }
                where { created_at > @2023-01-01; }
            }
            "#,
        );
        let explore = first_explore(&model);
        assert_eq!(explore.filters.len(), 1);
        let query = first_query(&model);
        assert_eq!(query.stages[0].value.filters.len(), 1);
    }

    #[test]
    fn test_parse_import() {
        let model = parse_str(r#"import "shared/base"; explore o { from "o"; }"#);
        assert!(matches!(
            &model.items[0].value,
            Item::Import(p) if p.value == "shared/base"
        ));
    }

    #[test]
    fn test_parse_index_stage() {
        let model = parse_str(
            r#"
            explore orders { from "orders"; }
            query search {
                from orders;
                index { status; items.name; }
            }
            "#,
        );
        let query = first_query(&model);
        assert_eq!(query.stages[0].value.index.len(), 2);
        assert_eq!(
            query.stages[0].value.index[1].value,
            vec!["items".to_string(), "name".to_string()]
        );
    }
}
