//! Lexer for the Strata modeling language.
//!
//! Converts source text into a sequence of tokens with span information.
//! Keywords are carved out of the identifier space; everything else is an
//! identifier, literal, or symbol.

use chumsky::prelude::*;

/// A token in the Strata modeling language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // ========================================================================
    // Definition Keywords
    // ========================================================================
    Explore,
    Query,
    Import,

    // ========================================================================
    // Explore Structure Keywords
    // ========================================================================
    From,
    PrimaryKey,
    Dimensions,
    Measures,
    Joins,
    Queries,
    Rename,
    Accept,
    Except,

    // ========================================================================
    // Stage Keywords
    // ========================================================================
    Group,
    Aggregate,
    Project,
    Index,
    Nest,
    Where,
    Sort,
    Limit,
    Asc,
    Desc,

    // ========================================================================
    // Join Keywords
    // ========================================================================
    One,
    Many,
    Cross,
    On,

    // ========================================================================
    // Expression Keywords
    // ========================================================================
    Is,
    And,
    Or,
    Not,
    True,
    False,
    Null,

    // ========================================================================
    // Type Keywords
    // ========================================================================
    TypeString,
    TypeNumber,
    TypeBool,
    TypeDate,
    TypeTimestamp,

    // ========================================================================
    // Literals
    // ========================================================================
    /// An identifier (not a keyword).
    Ident(&'src str),
    /// A string literal (contents without quotes).
    StringLit(&'src str),
    /// A number (integer or decimal).
    Number(&'src str),
    /// A date or timestamp literal: `@2023-01-05` or `@2023-01-05T10:30:00`.
    TimeLit(&'src str),
    /// A regex literal: `r'pattern'` (contents without quotes).
    RegexLit(&'src str),

    // ========================================================================
    // Symbols
    // ========================================================================
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `->`
    Arrow,
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `@`
    At,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Explore => write!(f, "explore"),
            Token::Query => write!(f, "query"),
            Token::Import => write!(f, "import"),

            Token::From => write!(f, "from"),
            Token::PrimaryKey => write!(f, "primary_key"),
            Token::Dimensions => write!(f, "dimensions"),
            Token::Measures => write!(f, "measures"),
            Token::Joins => write!(f, "joins"),
            Token::Queries => write!(f, "queries"),
            Token::Rename => write!(f, "rename"),
            Token::Accept => write!(f, "accept"),
            Token::Except => write!(f, "except"),

            Token::Group => write!(f, "group"),
            Token::Aggregate => write!(f, "aggregate"),
            Token::Project => write!(f, "project"),
            Token::Index => write!(f, "index"),
            Token::Nest => write!(f, "nest"),
            Token::Where => write!(f, "where"),
            Token::Sort => write!(f, "sort"),
            Token::Limit => write!(f, "limit"),
            Token::Asc => write!(f, "asc"),
            Token::Desc => write!(f, "desc"),

            Token::One => write!(f, "one"),
            Token::Many => write!(f, "many"),
            Token::Cross => write!(f, "cross"),
            Token::On => write!(f, "on"),

            Token::Is => write!(f, "is"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),

            Token::TypeString => write!(f, "string"),
            Token::TypeNumber => write!(f, "number"),
            Token::TypeBool => write!(f, "bool"),
            Token::TypeDate => write!(f, "date"),
            Token::TypeTimestamp => write!(f, "timestamp"),

            Token::Ident(s) => write!(f, "{}", s),
            Token::StringLit(s) => write!(f, "'{}'", s),
            Token::Number(s) => write!(f, "{}", s),
            Token::TimeLit(s) => write!(f, "@{}", s),
            Token::RegexLit(s) => write!(f, "r'{}'", s),

            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Arrow => write!(f, "->"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::At => write!(f, "@"),
        }
    }
}

/// Map an identifier string to a keyword token or return Ident.
fn keyword_or_ident(s: &str) -> Token<'_> {
    match s {
        "explore" => Token::Explore,
        "query" => Token::Query,
        "import" => Token::Import,

        "from" => Token::From,
        "primary_key" => Token::PrimaryKey,
        "dimensions" => Token::Dimensions,
        "measures" => Token::Measures,
        "joins" => Token::Joins,
        "queries" => Token::Queries,
        "rename" => Token::Rename,
        "accept" => Token::Accept,
        "except" => Token::Except,

        "group" => Token::Group,
        "aggregate" => Token::Aggregate,
        "project" => Token::Project,
        "index" => Token::Index,
        "nest" => Token::Nest,
        "where" => Token::Where,
        "sort" => Token::Sort,
        "limit" => Token::Limit,
        "asc" => Token::Asc,
        "desc" => Token::Desc,

        "one" => Token::One,
        "many" => Token::Many,
        "cross" => Token::Cross,
        "on" => Token::On,

        "is" => Token::Is,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,

        "string" => Token::TypeString,
        "number" => Token::TypeNumber,
        "bool" => Token::TypeBool,
        "date" => Token::TypeDate,
        "timestamp" => Token::TypeTimestamp,

        _ => Token::Ident(s),
    }
}

/// Create the lexer.
///
/// Returns a parser that tokenizes the input string into a sequence of
/// tokens with span information, skipping whitespace and comments.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    // Regex literals: r'...' (must be tried before identifiers, since `r`
    // alone would lex as an identifier)
    let regex_lit = just('r')
        .ignore_then(just('\''))
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''))
        .map(Token::RegexLit);

    // Identifiers: start with letter or underscore, followed by alphanumeric
    // or underscore; keywords are carved out afterwards
    let ident = text::ident().map(keyword_or_ident);

    // String literals: single or double quoted
    let single_quoted = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''))
        .map(Token::StringLit);
    let double_quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
        .map(Token::StringLit);

    // Numbers: integers and decimals
    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Number);

    // Time literals: @2023-01-05 or @2023-01-05T10:30:00.
    // The sigil followed by a digit starts a time literal; a bare `@` is the
    // sibling-field sigil handled by the parser.
    let time_lit = just('@')
        .ignore_then(
            one_of("0123456789-:T.")
                .repeated()
                .at_least(1)
                .to_slice(),
        )
        .map(Token::TimeLit);

    // Symbols (multi-char first, then single-char)
    let symbol = choice((
        just("->").to(Token::Arrow),
        just("!=").to(Token::NotEq),
        just("<=").to(Token::LtEq),
        just(">=").to(Token::GtEq),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just(';').to(Token::Semicolon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just('=').to(Token::Eq),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('@').to(Token::At),
    ));

    // Single-line comments: // ... until newline
    let single_line_comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    // Multi-line comments: /* ... */
    let multi_line_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();

    let comment = single_line_comment.or(multi_line_comment);

    // A single token with span
    let token = choice((regex_lit, ident, single_quoted, double_quoted, number, time_lit, symbol))
        .map_with(|tok, e| (tok, e.span()));

    token
        .padded_by(comment.padded().repeated())
        .padded()
        .repeated()
        .collect()
        .padded_by(comment.padded().repeated())
        .padded()
        .then_ignore(end())
}

/// Lex a source string into tokens.
///
/// Returns Ok with the token list on success, or Err with the lex errors.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
