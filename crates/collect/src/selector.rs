//! Label selectors: compiled from `LabelSelector` or parsed from text.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use once_cell::sync::Lazy;
use regex::Regex;

type Labels = BTreeMap<String, String>;

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap()
});
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});
static SET_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s+(in|notin)\s*\(([^()]*)\)$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid label key {0:?}")]
    InvalidKey(String),
    #[error("invalid value {value:?} for label {key:?}")]
    InvalidValue { key: String, value: String },
    #[error("unknown operator {operator:?} for label {key:?}")]
    UnknownOperator { key: String, operator: String },
    #[error("operator {operator} for label {key:?} needs at least one value")]
    MissingValues { key: String, operator: &'static str },
    #[error("operator {operator} for label {key:?} takes no values")]
    UnexpectedValues { key: String, operator: &'static str },
    #[error("cannot parse selector term {0:?}")]
    Syntax(String),
}

/// One requirement on a label set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Equal(String, String),
    NotEqual(String, String),
    Exists(String),
    DoesNotExist(String),
}

impl Expression {
    pub fn key(&self) -> &str {
        match self {
            Expression::In(k, _)
            | Expression::NotIn(k, _)
            | Expression::Equal(k, _)
            | Expression::NotEqual(k, _)
            | Expression::Exists(k)
            | Expression::DoesNotExist(k) => k,
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        match self {
            Expression::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Expression::NotIn(key, values) => labels.get(key).map_or(true, |v| !values.contains(v)),
            Expression::Equal(key, value) => labels.get(key) == Some(value),
            Expression::NotEqual(key, value) => labels.get(key) != Some(value),
            Expression::Exists(key) => labels.contains_key(key),
            Expression::DoesNotExist(key) => !labels.contains_key(key),
        }
    }

    fn validate(&self) -> Result<(), SelectorError> {
        validate_key(self.key())?;
        match self {
            Expression::In(key, values) | Expression::NotIn(key, values) => {
                values.iter().try_for_each(|v| validate_value(key, v))
            }
            Expression::Equal(key, value) | Expression::NotEqual(key, value) => validate_value(key, value),
            Expression::Exists(_) | Expression::DoesNotExist(_) => Ok(()),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        match self {
            Expression::In(key, values) => write!(f, "{key} in ({})", join(values)),
            Expression::NotIn(key, values) => write!(f, "{key} notin ({})", join(values)),
            Expression::Equal(key, value) => write!(f, "{key}={value}"),
            Expression::NotEqual(key, value) => write!(f, "{key}!={value}"),
            Expression::Exists(key) => f.write_str(key),
            Expression::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

impl TryFrom<LabelSelectorRequirement> for Expression {
    type Error = SelectorError;

    fn try_from(req: LabelSelectorRequirement) -> Result<Self, Self::Error> {
        let key = req.key;
        let values: Option<BTreeSet<String>> =
            req.values.filter(|v| !v.is_empty()).map(|v| v.into_iter().collect());
        match (req.operator.as_str(), values) {
            ("In", Some(values)) => Ok(Expression::In(key, values)),
            ("NotIn", Some(values)) => Ok(Expression::NotIn(key, values)),
            ("In", None) => Err(SelectorError::MissingValues { key, operator: "In" }),
            ("NotIn", None) => Err(SelectorError::MissingValues { key, operator: "NotIn" }),
            ("Exists", None) => Ok(Expression::Exists(key)),
            ("DoesNotExist", None) => Ok(Expression::DoesNotExist(key)),
            ("Exists", Some(_)) => Err(SelectorError::UnexpectedValues { key, operator: "Exists" }),
            ("DoesNotExist", Some(_)) => Err(SelectorError::UnexpectedValues { key, operator: "DoesNotExist" }),
            (operator, _) => Err(SelectorError::UnknownOperator { key, operator: operator.to_string() }),
        }
    }
}

/// A conjunction of expressions. The empty selector matches everything.
///
/// Expressions are kept sorted by their text form so that two selectors
/// written in a different order compare and display the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector(Vec<Expression>);

impl Selector {
    pub fn from_expressions(exprs: impl IntoIterator<Item = Expression>) -> Result<Self, SelectorError> {
        let mut exprs: Vec<Expression> = exprs.into_iter().collect();
        for e in &exprs {
            e.validate()?;
        }
        exprs.sort_by_cached_key(|e| e.to_string());
        exprs.dedup();
        Ok(Self(exprs))
    }

    /// Compile a Kubernetes `LabelSelector`. `matchLabels` entries become
    /// equality terms; `matchExpressions` must use a known operator with
    /// values exactly when the operator needs them.
    pub fn compile(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let equality = selector
            .match_labels
            .iter()
            .flatten()
            .map(|(k, v)| Ok(Expression::Equal(k.clone(), v.clone())));
        let expressions = selector.match_expressions.iter().flatten().cloned().map(Expression::try_from);
        let exprs = equality.chain(expressions).collect::<Result<Vec<_>, SelectorError>>()?;
        Self::from_expressions(exprs)
    }

    pub fn selects_all(&self) -> bool { self.0.is_empty() }

    pub fn expressions(&self) -> &[Expression] { &self.0 }

    pub fn matches(&self, labels: &Labels) -> bool { self.0.iter().all(|e| e.matches(labels)) }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    /// Parse `team=checkout,env in (a,b),!legacy`. Blank input is the empty selector.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let exprs = split_terms(s)?.into_iter().map(parse_term).collect::<Result<Vec<_>, _>>()?;
        Self::from_expressions(exprs)
    }
}

/// Split on commas outside parentheses.
fn split_terms(s: &str) -> Result<Vec<&str>, SelectorError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(|| SelectorError::Syntax(s.to_string()))?,
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorError::Syntax(s.to_string()));
    }
    terms.push(&s[start..]);
    Ok(terms)
}

fn parse_term(raw: &str) -> Result<Expression, SelectorError> {
    let term = raw.trim();
    if term.is_empty() {
        return Err(SelectorError::Syntax(raw.to_string()));
    }
    if let Some(caps) = SET_TERM_RE.captures(term) {
        let key = caps[1].to_string();
        let values: BTreeSet<String> =
            caps[3].split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect();
        let operator = if &caps[2] == "in" { "In" } else { "NotIn" };
        if values.is_empty() {
            return Err(SelectorError::MissingValues { key, operator });
        }
        return Ok(if operator == "In" { Expression::In(key, values) } else { Expression::NotIn(key, values) });
    }
    if term.contains(['(', ')']) {
        return Err(SelectorError::Syntax(raw.to_string()));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Expression::NotEqual(key.trim().to_string(), value.trim().to_string()));
    }
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Expression::DoesNotExist(key.trim().to_string()));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Expression::Equal(key.trim().to_string(), value.trim().to_string()));
    }
    Ok(Expression::Exists(term.to_string()))
}

/// `[prefix/]name`, where the prefix is a DNS subdomain.
fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = || SelectorError::InvalidKey(key.to_string());
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !PREFIX_RE.is_match(prefix) {
            return Err(invalid());
        }
    }
    if name.is_empty() || name.len() > MAX_NAME_LEN || !NAME_RE.is_match(name) {
        return Err(invalid());
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() || (value.len() <= MAX_NAME_LEN && NAME_RE.is_match(value)) {
        Ok(())
    } else {
        Err(SelectorError::InvalidValue { key: key.to_string(), value: value.to_string() })
    }
}
