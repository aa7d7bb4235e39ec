// LogSift - core/filter.rs
//
// Composable filter engine for log entries.
// A FilterSpec is a list of conditions joined by a single logical operator.
// Specs are validated and compiled once, then applied lazily to any entry
// stream. Nested groups are built by chaining filters.
// Core layer: pure logic, no I/O.

use crate::core::model::{Level, LogEntry};
use crate::util::error::FilterError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

// =============================================================================
// Specification types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Timestamp,
    Level,
    Message,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::Level => "level",
            Field::Message => "message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Contains,
    NotContains,
    StartsWith,
    Matches,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::Matches => "matches",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }
}

/// Condition operand. Strings always deserialise as `Text`; timestamp
/// conditions parse their text when the filter is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Time(DateTime<Utc>),
    List(Vec<String>),
}

impl FilterValue {
    fn describe(&self) -> String {
        match self {
            FilterValue::Text(s) => s.clone(),
            FilterValue::Time(t) => t.to_rfc3339(),
            FilterValue::List(v) => format!("[{}]", v.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: Field,
    pub operator: Operator,
    pub value: FilterValue,
    /// Message comparisons ignore case unless this is set.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl FilterCondition {
    pub fn new(field: Field, operator: Operator, value: FilterValue) -> Self {
        Self {
            field,
            operator,
            value,
            case_sensitive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

/// A named, reusable combination of conditions. Stateless.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
    #[serde(default)]
    pub logic: LogicalOp,
}

/// Names accepted by [`FilterSpec::preset`].
pub const PRESET_NAMES: &[&str] = &["errors_only", "warnings_and_errors", "exclude_debug"];

impl FilterSpec {
    pub fn new(name: impl Into<String>, logic: LogicalOp, conditions: Vec<FilterCondition>) -> Self {
        Self {
            name: name.into(),
            conditions,
            logic,
        }
    }

    /// ERROR entries only.
    pub fn errors_only() -> Self {
        Self::new(
            "errors_only",
            LogicalOp::And,
            vec![FilterCondition::new(
                Field::Level,
                Operator::Eq,
                FilterValue::Text("ERROR".into()),
            )],
        )
    }

    /// ERROR and WARN entries.
    pub fn warnings_and_errors() -> Self {
        Self::new(
            "warnings_and_errors",
            LogicalOp::And,
            vec![FilterCondition::new(
                Field::Level,
                Operator::In,
                FilterValue::List(vec!["ERROR".into(), "WARN".into()]),
            )],
        )
    }

    /// Everything except DEBUG and TRACE (entries without a level are kept).
    pub fn exclude_debug() -> Self {
        Self::new(
            "exclude_debug",
            LogicalOp::And,
            vec![FilterCondition::new(
                Field::Level,
                Operator::NotIn,
                FilterValue::List(vec!["DEBUG".into(), "TRACE".into()]),
            )],
        )
    }

    /// Entries with `start <= timestamp < end`.
    pub fn time_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(
            "time_window",
            LogicalOp::And,
            vec![
                FilterCondition::new(Field::Timestamp, Operator::Gte, FilterValue::Time(start)),
                FilterCondition::new(Field::Timestamp, Operator::Lt, FilterValue::Time(end)),
            ],
        )
    }

    /// Entries whose message contains `text`, ignoring case.
    pub fn keyword(text: impl Into<String>) -> Self {
        Self::new(
            "keyword",
            LogicalOp::And,
            vec![FilterCondition::new(
                Field::Message,
                Operator::Contains,
                FilterValue::Text(text.into()),
            )],
        )
    }

    /// Look up a parameterless preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "errors_only" => Some(Self::errors_only()),
            "warnings_and_errors" => Some(Self::warnings_and_errors()),
            "exclude_debug" => Some(Self::exclude_debug()),
            _ => None,
        }
    }

    /// Validate every condition and build the evaluator.
    pub fn compile(&self) -> Result<CompiledFilter, FilterError> {
        let predicates = self
            .conditions
            .iter()
            .enumerate()
            .map(|(index, c)| compile_condition(index, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledFilter {
            name: self.name.clone(),
            logic: self.logic,
            predicates,
        })
    }
}

// =============================================================================
// Compilation
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Cmp {
    fn from_operator(op: Operator) -> Option<Self> {
        match op {
            Operator::Eq => Some(Cmp::Eq),
            Operator::Ne => Some(Cmp::Ne),
            Operator::Gt => Some(Cmp::Gt),
            Operator::Gte => Some(Cmp::Gte),
            Operator::Lt => Some(Cmp::Lt),
            Operator::Lte => Some(Cmp::Lte),
            _ => None,
        }
    }

    fn test<T: Ord>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
            Cmp::Gt => lhs > rhs,
            Cmp::Gte => lhs >= rhs,
            Cmp::Lt => lhs < rhs,
            Cmp::Lte => lhs <= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TextOp {
    Eq,
    Ne,
    Contains,
    NotContains,
    StartsWith,
}

#[derive(Debug)]
enum Predicate {
    Time {
        cmp: Cmp,
        at: DateTime<Utc>,
    },
    /// Level comparison by severity rank: `gte WARN` means WARN or worse.
    Level {
        cmp: Cmp,
        rank: u8,
    },
    LevelSet {
        levels: Vec<Level>,
        negate: bool,
    },
    Text {
        op: TextOp,
        needle: String,
    },
    TextSet {
        values: Vec<String>,
        negate: bool,
    },
    /// Case-insensitive text comparison, compiled to an escaped regex so
    /// messages are never lowercased per entry.
    Folded {
        re: Regex,
        negate: bool,
    },
    Regex(Regex),
}

/// Case-insensitive regex over the literal `alternatives`, optionally
/// anchored at the start and end of the message.
fn folded_regex(alternatives: &[String], start: bool, end: bool) -> Result<Regex, regex::Error> {
    let body = alternatives
        .iter()
        .map(|a| regex::escape(a))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(
        "{}(?:{body}){}",
        if start { r"\A" } else { "" },
        if end { r"\z" } else { "" }
    );
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

fn severity_rank(level: Level) -> u8 {
    match level {
        Level::Error => 4,
        Level::Warn => 3,
        Level::Info => 2,
        Level::Debug => 1,
        Level::Trace => 0,
    }
}

fn compile_condition(index: usize, c: &FilterCondition) -> Result<Predicate, FilterError> {
    let field = c.field.as_str();
    let unsupported = || FilterError::UnsupportedOperator {
        index,
        field,
        operator: c.operator.as_str(),
    };
    let invalid = |reason: String| FilterError::InvalidValue {
        index,
        field,
        value: c.value.describe(),
        reason,
    };

    match c.field {
        Field::Timestamp => {
            let cmp = Cmp::from_operator(c.operator).ok_or_else(unsupported)?;
            let at = match &c.value {
                FilterValue::Time(t) => *t,
                FilterValue::Text(s) => parse_time_value(s).ok_or_else(|| {
                    invalid("expected RFC 3339 or 'YYYY-MM-DD HH:MM:SS'".to_string())
                })?,
                FilterValue::List(_) => return Err(invalid("expected a single timestamp".into())),
            };
            Ok(Predicate::Time { cmp, at })
        }

        Field::Level => match c.operator {
            Operator::In | Operator::NotIn => {
                let FilterValue::List(items) = &c.value else {
                    return Err(invalid("expected a list of levels".into()));
                };
                let levels = items
                    .iter()
                    .map(|s| s.parse::<Level>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(invalid)?;
                Ok(Predicate::LevelSet {
                    levels,
                    negate: c.operator == Operator::NotIn,
                })
            }
            op => {
                let cmp = Cmp::from_operator(op).ok_or_else(unsupported)?;
                let FilterValue::Text(s) = &c.value else {
                    return Err(invalid("expected a level name".into()));
                };
                let level = s.parse::<Level>().map_err(invalid)?;
                Ok(match cmp {
                    Cmp::Eq => Predicate::LevelSet {
                        levels: vec![level],
                        negate: false,
                    },
                    Cmp::Ne => Predicate::LevelSet {
                        levels: vec![level],
                        negate: true,
                    },
                    cmp => Predicate::Level {
                        cmp,
                        rank: severity_rank(level),
                    },
                })
            }
        },

        Field::Message => {
            let folded = |alternatives: &[String], start, end, negate| {
                folded_regex(alternatives, start, end)
                    .map(|re| Predicate::Folded { re, negate })
                    .map_err(|e| invalid(e.to_string()))
            };
            match c.operator {
                Operator::In | Operator::NotIn => {
                    let FilterValue::List(items) = &c.value else {
                        return Err(invalid("expected a list of strings".into()));
                    };
                    let negate = c.operator == Operator::NotIn;
                    if c.case_sensitive || items.is_empty() {
                        Ok(Predicate::TextSet {
                            values: items.clone(),
                            negate,
                        })
                    } else {
                        folded(items.as_slice(), true, true, negate)
                    }
                }
                Operator::Matches => {
                    let FilterValue::Text(pattern) = &c.value else {
                        return Err(invalid("expected a regex pattern".into()));
                    };
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(!c.case_sensitive)
                        .build()
                        .map_err(|e| FilterError::InvalidRegex {
                            index,
                            pattern: pattern.clone(),
                            source: e,
                        })?;
                    Ok(Predicate::Regex(re))
                }
                op => {
                    let text_op = match op {
                        Operator::Eq => TextOp::Eq,
                        Operator::Ne => TextOp::Ne,
                        Operator::Contains => TextOp::Contains,
                        Operator::NotContains => TextOp::NotContains,
                        Operator::StartsWith => TextOp::StartsWith,
                        _ => return Err(unsupported()),
                    };
                    let FilterValue::Text(s) = &c.value else {
                        return Err(invalid("expected a string".into()));
                    };
                    if c.case_sensitive {
                        return Ok(Predicate::Text {
                            op: text_op,
                            needle: s.clone(),
                        });
                    }
                    let needle = std::slice::from_ref(s);
                    match text_op {
                        TextOp::Eq => folded(needle, true, true, false),
                        TextOp::Ne => folded(needle, true, true, true),
                        TextOp::Contains => folded(needle, false, false, false),
                        TextOp::NotContains => folded(needle, false, false, true),
                        TextOp::StartsWith => folded(needle, true, false, false),
                    }
                }
            }
        }
    }
}

/// Parse a timestamp operand: RFC 3339, the log line format (with optional
/// fraction, space or `T` separator), or a bare date meaning midnight UTC.
fn parse_time_value(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

impl Predicate {
    fn eval(&self, entry: &LogEntry) -> bool {
        match self {
            // Entries without a timestamp never satisfy a time condition.
            Predicate::Time { cmp, at } => entry.timestamp.is_some_and(|ts| cmp.test(&ts, at)),
            Predicate::Level { cmp, rank } => entry
                .level
                .is_some_and(|l| cmp.test(&severity_rank(l), rank)),
            Predicate::LevelSet { levels, negate } => {
                let hit = entry.level.is_some_and(|l| levels.contains(&l));
                hit != *negate
            }
            Predicate::Text { op, needle } => {
                let hay = entry.message.as_str();
                match op {
                    TextOp::Eq => hay == needle,
                    TextOp::Ne => hay != needle,
                    TextOp::Contains => hay.contains(needle.as_str()),
                    TextOp::NotContains => !hay.contains(needle.as_str()),
                    TextOp::StartsWith => hay.starts_with(needle.as_str()),
                }
            }
            Predicate::TextSet { values, negate } => {
                let hit = values.iter().any(|v| *v == entry.message);
                hit != *negate
            }
            Predicate::Folded { re, negate } => re.is_match(&entry.message) != *negate,
            Predicate::Regex(re) => re.is_match(&entry.message),
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Counters gathered while a filter runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub examined: usize,
    pub matched: usize,
    /// Entries for which each condition held, by condition index.
    pub condition_hits: Vec<usize>,
}

/// A validated [`FilterSpec`], ready to apply.
#[derive(Debug)]
pub struct CompiledFilter {
    name: String,
    logic: LogicalOp,
    predicates: Vec<Predicate>,
}

impl CompiledFilter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate one entry. An empty condition list matches everything.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        match self.logic {
            LogicalOp::And => self.predicates.iter().all(|p| p.eval(entry)),
            LogicalOp::Or => {
                self.predicates.is_empty() || self.predicates.iter().any(|p| p.eval(entry))
            }
        }
    }

    /// Evaluate every condition (for per-condition hit counts) and combine.
    fn evaluate(&self, entry: &LogEntry, hits: &mut [usize]) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        let mut all = true;
        let mut any = false;
        for (p, hit) in self.predicates.iter().zip(hits.iter_mut()) {
            if p.eval(entry) {
                *hit += 1;
                any = true;
            } else {
                all = false;
            }
        }
        match self.logic {
            LogicalOp::And => all,
            LogicalOp::Or => any,
        }
    }

    /// Lazily filter `entries`. The input is never modified; matching items
    /// are passed through as they are.
    pub fn apply<I>(&self, entries: I) -> Filtered<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Borrow<LogEntry>,
    {
        Filtered {
            inner: entries.into_iter(),
            filter: self,
            stats: MatchStats {
                examined: 0,
                matched: 0,
                condition_hits: vec![0; self.predicates.len()],
            },
        }
    }
}

/// Streaming filter adapter returned by [`CompiledFilter::apply`].
pub struct Filtered<'f, I> {
    inner: I,
    filter: &'f CompiledFilter,
    stats: MatchStats,
}

impl<I> Filtered<'_, I> {
    /// Counters so far. Final once the iterator is exhausted.
    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    pub fn into_stats(self) -> MatchStats {
        self.stats
    }
}

impl<I> Iterator for Filtered<'_, I>
where
    I: Iterator,
    I::Item: Borrow<LogEntry>,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        for item in self.inner.by_ref() {
            self.stats.examined += 1;
            if self
                .filter
                .evaluate(item.borrow(), &mut self.stats.condition_hits)
            {
                self.stats.matched += 1;
                return Some(item);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

/// Compile `spec` and collect the matching entries with their stats.
/// An invalid `spec` is rejected before any entry is examined.
pub fn filter_entries<I>(
    entries: I,
    spec: &FilterSpec,
) -> Result<(Vec<LogEntry>, MatchStats), FilterError>
where
    I: IntoIterator<Item = LogEntry>,
{
    let compiled = spec.compile()?;
    let mut filtered = compiled.apply(entries);
    let matched: Vec<LogEntry> = filtered.by_ref().collect();
    tracing::debug!(
        filter = %compiled.name(),
        examined = filtered.stats().examined,
        matched = matched.len(),
        "Filter applied"
    );
    Ok((matched, filtered.into_stats()))
}
