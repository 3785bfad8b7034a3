use crate::metrics::vector::{
    InstantVector, LabelMatcher, MatchOperator, Matching, Vector, VectorMatch,
};
use log::info;
use promql_parser::label::MatchOp;
use promql_parser::parser;
use promql_parser::parser::{
    AggregateExpr, BinaryExpr, Call, Expr, LabelModifier, MatrixSelector, ParenExpr, SubqueryExpr,
    UnaryExpr, VectorSelector,
};
use thiserror::Error;

// Parsing and every walk over the result recurse once per level of nesting.
const MAX_DEPTH: usize = 128;

/// A query that cannot be parsed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}{}", location(.position))]
pub struct PromQLSyntaxError {
    pub message: String,
    /// Only known for errors found before the query reaches the PromQL grammar.
    pub position: Option<Position>,
}

fn location(position: &Option<Position>) -> String {
    match position {
        Some(position) => format!(" at line {}, column {}", position.line, position.column),
        None => String::new(),
    }
}

impl PromQLSyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    fn at(message: impl Into<String>, query: &str, offset: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(Position::of(query, offset)),
        }
    }
}

/// 1-based location in the query text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    fn of(query: &str, offset: usize) -> Self {
        let before = &query[..offset];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Self {
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

/// Parses a PromQL query into the vector expression it selects.
///
/// Returns `Ok(None)` when the query evaluates to a scalar or string and
/// references no series at all.
pub fn parse_query(query: &str) -> Result<Option<Vector>, PromQLSyntaxError> {
    let result = check_nesting(query)
        .and_then(|()| parser::parse(query).map_err(PromQLSyntaxError::new))
        .and_then(|expr| to_vector(&expr));
    if let Err(e) = &result {
        info!("Failed to parse PromQL query: {}", e);
    }
    result
}

/// Folds the vector-valued operands of a binary operation.
///
/// Two vectors form a [`VectorMatch`], a single vector passes through
/// unchanged and scalar-only operations produce nothing.
pub fn reduce_operands(
    operands: Vec<Vector>,
    operator: &str,
    matching: Option<Matching>,
) -> Result<Option<Vector>, PromQLSyntaxError> {
    let mut operands = operands.into_iter();
    match (operands.next(), operands.next(), operands.next()) {
        (None, _, _) => Ok(None),
        (Some(vector), None, _) => Ok(Some(vector)),
        (Some(left), Some(right), None) => {
            let mut vector_match = VectorMatch::new(left, right, operator);
            vector_match.matching = matching;
            Ok(Some(vector_match.into()))
        }
        (Some(_), Some(_), Some(_)) => Err(PromQLSyntaxError::new(format!(
            "invalid number of operands for {operator:?}"
        ))),
    }
}

// Range, subquery, offset and @ modifiers do not change which series are
// selected, so only the selectors and the operators joining them survive.
fn to_vector(expr: &Expr) -> Result<Option<Vector>, PromQLSyntaxError> {
    match expr {
        Expr::VectorSelector(vector_selector) => instant_vector(vector_selector).map(|v| Some(v.into())),
        Expr::MatrixSelector(MatrixSelector { vs, .. }) => instant_vector(vs).map(|v| Some(v.into())),
        Expr::Paren(ParenExpr { expr })
        | Expr::Unary(UnaryExpr { expr })
        | Expr::Subquery(SubqueryExpr { expr, .. }) => to_vector(expr),
        Expr::NumberLiteral(_) | Expr::StringLiteral(_) => Ok(None),
        Expr::Binary(BinaryExpr { op, lhs, rhs, modifier }) => {
            let matching = modifier
                .as_ref()
                .and_then(|modifier| modifier.matching.as_ref())
                .map(|matching| match matching {
                    LabelModifier::Include(labels) => Matching::On(labels.labels.clone()),
                    LabelModifier::Exclude(labels) => Matching::Ignoring(labels.labels.clone()),
                });
            let operands = to_vector(lhs)?.into_iter().chain(to_vector(rhs)?).collect();
            reduce_operands(operands, &op.to_string(), matching)
        }
        Expr::Call(Call { func, args }) => {
            fold_arguments(func.name, args.args.iter().map(|arg| &**arg))
        }
        Expr::Aggregate(AggregateExpr { op, expr, param, .. }) => {
            let arguments = param.iter().map(|param| &**param).chain([&**expr]);
            fold_arguments(&op.to_string(), arguments)
        }
        Expr::Extension(_) => Err(PromQLSyntaxError::new("PromQL extensions are not supported")),
    }
}

/// A single vector argument passes through, several are folded into matches
/// named after the call.
fn fold_arguments<'a>(
    name: &str,
    arguments: impl Iterator<Item = &'a Expr>,
) -> Result<Option<Vector>, PromQLSyntaxError> {
    let mut result = None;
    for argument in arguments {
        if let Some(vector) = to_vector(argument)? {
            let operands = result.into_iter().chain(Some(vector)).collect();
            result = reduce_operands(operands, name, None)?;
        }
    }
    Ok(result)
}

fn instant_vector(vector_selector: &VectorSelector) -> Result<InstantVector, PromQLSyntaxError> {
    let name = vector_selector.name.clone().unwrap_or_default();
    let mut vector = InstantVector::new(name);
    for matcher in &vector_selector.matchers.matchers {
        let operator = match matcher.op {
            MatchOp::Equal => MatchOperator::Equal,
            MatchOp::NotEqual => MatchOperator::NotEqual,
            MatchOp::Re(_) => MatchOperator::Regex,
            MatchOp::NotRe(_) => MatchOperator::NotRegex,
        };
        let label_matcher =
            LabelMatcher::new(matcher.name.as_str(), operator, matcher.value.as_str())
                .map_err(|e| PromQLSyntaxError::new(format!("invalid regular expression: {e}")))?;
        vector = vector.with_matcher(label_matcher);
    }
    Ok(vector)
}

#[derive(Default)]
struct Group {
    braces: bool,
    operators: usize,
    deepest: usize,
}

/// Rejects queries whose syntax tree could be nested deeper than
/// `MAX_DEPTH` before they are handed to the grammar.
///
/// Every operator and every bracket may add a level, so their count along
/// the deepest path is an upper bound of the tree depth. Label matchers
/// inside braces add none.
fn check_nesting(query: &str) -> Result<(), PromQLSyntaxError> {
    let mut groups = vec![Group::default()];
    let mut chars = query.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        let in_braces = groups.last().map_or(false, |group| group.braces);
        match c {
            '"' | '\'' | '`' => {
                let mut escaped = false;
                for (_, next) in chars.by_ref() {
                    match next {
                        _ if escaped => escaped = false,
                        '\\' if c != '`' => escaped = true,
                        _ if next == c => break,
                        _ => {}
                    }
                }
            }
            '#' => {
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '(' | '{' | '[' => {
                // ranges and subqueries wrap the expression before them
                if c == '[' {
                    if let Some(group) = groups.last_mut() {
                        group.operators += 1;
                    }
                }
                groups.push(Group {
                    braces: c == '{',
                    ..Group::default()
                });
            }
            ')' | '}' | ']' if groups.len() > 1 => {
                if let Some(group) = groups.pop() {
                    let depth = 1 + group.operators + group.deepest.max(1);
                    if let Some(parent) = groups.last_mut() {
                        parent.deepest = parent.deepest.max(depth);
                    }
                }
            }
            '=' if !in_braces => {
                if chars.next_if(|&(_, next)| next == '=').is_some() {
                    if let Some(group) = groups.last_mut() {
                        group.operators += 1;
                    }
                }
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '<' | '>' | '!' if !in_braces => {
                if let Some(group) = groups.last_mut() {
                    group.operators += 1;
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = offset + c.len_utf8();
                let is_word = |&(_, next): &(usize, char)| {
                    next.is_ascii_alphanumeric() || next == '_' || next == ':'
                };
                while let Some((next_offset, _)) = chars.next_if(is_word) {
                    end = next_offset + 1;
                }
                let word = &query[offset..end];
                let is_operator = ["and", "or", "unless", "atan2"]
                    .iter()
                    .any(|keyword| word.eq_ignore_ascii_case(keyword));
                if is_operator && !in_braces {
                    if let Some(group) = groups.last_mut() {
                        group.operators += 1;
                    }
                }
            }
            _ => {}
        }

        if nesting_bound(&groups) > MAX_DEPTH {
            return Err(PromQLSyntaxError::at(
                "expression is nested too deeply",
                query,
                offset,
            ));
        }
    }
    Ok(())
}

// Depth already committed along the path to the innermost open bracket.
fn nesting_bound(groups: &[Group]) -> usize {
    let open: usize = groups.iter().map(|group| group.operators).sum();
    let deepest = groups.last().map_or(0, |group| group.deepest);
    open + groups.len() + deepest
}
