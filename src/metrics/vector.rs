use indexmap::IndexMap;
use regex::Regex;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchOperator {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl MatchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOperator::Equal => "=",
            MatchOperator::NotEqual => "!=",
            MatchOperator::Regex => "=~",
            MatchOperator::NotRegex => "!~",
        }
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate on the value of a single label, e.g. `pod=~"job-.+"`.
///
/// Regex matchers are anchored at the start of the label value only, so
/// `job=~"kube"` matches `kubelet`.
#[derive(Clone, Debug)]
pub struct LabelMatcher {
    pub name: String,
    pub value: String,
    pub operator: MatchOperator,
    regex: Option<Regex>,
}

impl LabelMatcher {
    pub fn new(
        name: impl Into<String>,
        operator: MatchOperator,
        value: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let value = value.into();
        let regex = match operator {
            MatchOperator::Regex | MatchOperator::NotRegex => {
                Some(Regex::new(&format!("^(?:{value})"))?)
            }
            MatchOperator::Equal | MatchOperator::NotEqual => None,
        };
        Ok(Self {
            name: name.into(),
            value,
            operator,
            regex,
        })
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operator: MatchOperator::Equal,
            regex: None,
        }
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operator: MatchOperator::NotEqual,
            regex: None,
        }
    }

    pub fn regex(name: impl Into<String>, value: impl Into<String>) -> Result<Self, regex::Error> {
        Self::new(name, MatchOperator::Regex, value)
    }

    pub fn not_regex(
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Self::new(name, MatchOperator::NotRegex, value)
    }

    /// True when the matcher pins the label to exactly one value.
    pub fn is_eq(&self) -> bool {
        self.operator == MatchOperator::Equal
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match (self.operator, &self.regex) {
            (MatchOperator::Equal, _) => self.value == candidate,
            (MatchOperator::NotEqual, _) => self.value != candidate,
            (MatchOperator::Regex, Some(regex)) => regex.is_match(candidate),
            (MatchOperator::NotRegex, Some(regex)) => !regex.is_match(candidate),
            // constructors always compile a regex for the regex operators
            (MatchOperator::Regex, None) => false,
            (MatchOperator::NotRegex, None) => true,
        }
    }
}

impl PartialEq for LabelMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.operator == other.operator && self.value == other.value
    }
}

impl Eq for LabelMatcher {}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.operator, self.value)
    }
}

/// A selector such as `container_cpu_usage_seconds_total{job="kubelet"}`.
///
/// Matchers are keyed by label name; when a query repeats a label the last
/// matcher wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstantVector {
    pub name: String,
    pub label_matchers: IndexMap<String, LabelMatcher>,
}

impl InstantVector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label_matchers: IndexMap::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: LabelMatcher) -> Self {
        self.label_matchers.insert(matcher.name.clone(), matcher);
        self
    }

    pub fn has_label_matcher(&self, name: &str) -> bool {
        self.label_matchers.contains_key(name)
    }

    /// Whether the `job` matcher of this selector accepts the given job name.
    /// Selectors without a `job` matcher belong to no job.
    pub fn is_from_job(&self, job: &str) -> bool {
        self.label_matchers
            .get("job")
            .map(|matcher| matcher.matches(job))
            .unwrap_or(false)
    }

    pub fn get_eq_label_matcher(&self, name: &str) -> Option<&LabelMatcher> {
        self.label_matchers
            .get(name)
            .filter(|matcher| matcher.is_eq())
    }
}

/// Label list of a binary operation's `on(...)` / `ignoring(...)` clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matching {
    On(Vec<String>),
    Ignoring(Vec<String>),
}

/// Two vectors joined by a binary operator, e.g. `a * on(pod) b`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorMatch {
    pub left: Box<Vector>,
    pub right: Box<Vector>,
    pub operator: String,
    pub matching: Option<Matching>,
}

impl VectorMatch {
    pub fn new(left: Vector, right: Vector, operator: impl Into<String>) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            operator: operator.into(),
            matching: None,
        }
    }

    pub fn with_matching(mut self, matching: Matching) -> Self {
        self.matching = Some(matching);
        self
    }

    pub fn on(&self) -> &[String] {
        match &self.matching {
            Some(Matching::On(labels)) => labels,
            _ => &[],
        }
    }

    pub fn ignoring(&self) -> &[String] {
        match &self.matching {
            Some(Matching::Ignoring(labels)) => labels,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Vector {
    Instant(InstantVector),
    Match(VectorMatch),
}

impl From<InstantVector> for Vector {
    fn from(vector: InstantVector) -> Self {
        Vector::Instant(vector)
    }
}

impl From<VectorMatch> for Vector {
    fn from(vector: VectorMatch) -> Self {
        Vector::Match(vector)
    }
}

impl Vector {
    /// All instant selectors of the tree, left to right.
    pub fn instant_vectors(&self) -> Vec<&InstantVector> {
        let mut result = Vec::new();
        self.collect_instant_vectors(&mut result);
        result
    }

    fn collect_instant_vectors<'a>(&'a self, result: &mut Vec<&'a InstantVector>) {
        match self {
            Vector::Instant(vector) => result.push(vector),
            Vector::Match(vector) => {
                vector.left.collect_instant_vectors(result);
                vector.right.collect_instant_vectors(result);
            }
        }
    }
}
