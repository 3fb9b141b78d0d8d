//! RRULE expansion for recurring events.
//!
//! A rule arrives either as RFC 5545 text (`FREQ=WEEKLY;INTERVAL=2`, optionally with its
//! own `DTSTART`) or as a structured object with at least a `frequency`. Both are turned
//! into iCalendar text and handed to the rrule crate, anchored at the caller's start
//! instant unless the text brings its own.

use chrono::{DateTime, Local};
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datetime;
use crate::error::{AgendaError, AgendaResult};

/// Upper bound accepted by the rrule crate for a single expansion.
const MAX_EXPANSION: usize = u16::MAX as usize;

/// A recurrence rule as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    /// RFC 5545 rule text, e.g. `RRULE:FREQ=DAILY;COUNT=3`.
    Text(String),
    Structured(StructuredRule),
}

/// Structured rule options. Field names follow the JSON the browser client sends;
/// the all-lowercase spellings used by rrule.js are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRule {
    #[serde(alias = "freq")]
    pub frequency: FrequencySpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Last possible occurrence, in any form `datetime::parse_instant` accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,

    #[serde(default, alias = "byweekday", skip_serializing_if = "Vec::is_empty")]
    pub by_weekday: Vec<WeekdaySpec>,

    #[serde(default, alias = "bymonthday", skip_serializing_if = "Vec::is_empty")]
    pub by_month_day: Vec<i32>,

    #[serde(default, alias = "bymonth", skip_serializing_if = "Vec::is_empty")]
    pub by_month: Vec<u32>,

    #[serde(default, alias = "byyearday", skip_serializing_if = "Vec::is_empty")]
    pub by_year_day: Vec<i32>,

    #[serde(default, alias = "byweekno", skip_serializing_if = "Vec::is_empty")]
    pub by_week_no: Vec<i32>,

    #[serde(default, alias = "byhour", skip_serializing_if = "Vec::is_empty")]
    pub by_hour: Vec<u32>,

    #[serde(default, alias = "byminute", skip_serializing_if = "Vec::is_empty")]
    pub by_minute: Vec<u32>,

    #[serde(default, alias = "bysecond", skip_serializing_if = "Vec::is_empty")]
    pub by_second: Vec<u32>,

    #[serde(default, alias = "bysetpos", skip_serializing_if = "Vec::is_empty")]
    pub by_set_pos: Vec<i32>,

    #[serde(default, alias = "wkst", skip_serializing_if = "Option::is_none")]
    pub week_start: Option<WeekdaySpec>,
}

/// Frequency as a name (`"weekly"`) or as an rrule.js constant (`2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencySpec {
    Name(String),
    Code(u8),
}

/// Weekday as RFC 5545 text (`"MO"`, `"-1FR"`) or an rrule.js index (0 = Monday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeekdaySpec {
    Name(String),
    Index(u8),
}

const WEEKDAYS: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

impl FrequencySpec {
    fn to_ics(&self) -> AgendaResult<&'static str> {
        const FREQUENCIES: [&str; 7] = [
            "YEARLY", "MONTHLY", "WEEKLY", "DAILY", "HOURLY", "MINUTELY", "SECONDLY",
        ];

        match self {
            FrequencySpec::Name(name) => FREQUENCIES
                .iter()
                .find(|f| f.eq_ignore_ascii_case(name.trim()))
                .copied()
                .ok_or_else(|| AgendaError::Rule(format!("Unknown frequency '{}'", name))),
            FrequencySpec::Code(code) => FREQUENCIES
                .get(usize::from(*code))
                .copied()
                .ok_or_else(|| AgendaError::Rule(format!("Unknown frequency code {}", code))),
        }
    }
}

impl WeekdaySpec {
    fn to_ics(&self) -> AgendaResult<String> {
        match self {
            WeekdaySpec::Name(name) => {
                let name = name.trim().to_ascii_uppercase();
                if !name.is_ascii() {
                    return Err(AgendaError::Rule(format!("Invalid weekday '{}'", name)));
                }
                let (ordinal, day) = name.split_at(name.len().saturating_sub(2));
                let ordinal_ok = ordinal.is_empty()
                    || ordinal.trim_start_matches(['+', '-']).parse::<u8>().is_ok();
                if WEEKDAYS.contains(&day) && ordinal_ok {
                    Ok(name)
                } else {
                    Err(AgendaError::Rule(format!("Invalid weekday '{}'", name)))
                }
            }
            WeekdaySpec::Index(index) => WEEKDAYS
                .get(usize::from(*index))
                .map(|d| d.to_string())
                .ok_or_else(|| AgendaError::Rule(format!("Invalid weekday index {}", index))),
        }
    }
}

impl RuleSpec {
    /// Resolve an untyped JSON value at the API boundary.
    ///
    /// `null` and the empty string mean "no rule". Strings become `Text`; objects must
    /// carry `frequency` (or `freq`). Anything else is a `Rule` error.
    pub fn from_json(value: &Value) -> AgendaResult<Option<RuleSpec>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(RuleSpec::Text(s.clone()))),
            Value::Object(map) if map.contains_key("frequency") || map.contains_key("freq") => {
                let rule: StructuredRule = serde_json::from_value(value.clone())
                    .map_err(|e| AgendaError::Rule(e.to_string()))?;
                Ok(Some(RuleSpec::Structured(rule)))
            }
            _ => Err(AgendaError::Rule("Invalid rule input".into())),
        }
    }

    /// Check that the rule parses when anchored at `start`.
    pub fn validate(&self, start: DateTime<Local>) -> AgendaResult<()> {
        to_rrule_set(start, self).map(|_| ())
    }
}

/// Expand `rule` from `start` into at most `limit` ascending occurrences.
///
/// An absent rule yields no occurrences. The function is pure: the same inputs always
/// give the same sequence.
pub fn expand(
    start: DateTime<Local>,
    rule: Option<&RuleSpec>,
    limit: usize,
) -> AgendaResult<Vec<DateTime<Local>>> {
    let Some(rule) = rule else {
        return Ok(Vec::new());
    };

    let rrule_set = to_rrule_set(start, rule)?;
    if limit == 0 {
        return Ok(Vec::new());
    }

    let limit = u16::try_from(limit.min(MAX_EXPANSION)).unwrap_or(u16::MAX);
    let result = rrule_set.all(limit);

    let mut occurrences: Vec<DateTime<Local>> = result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Local))
        .collect();
    occurrences.sort();

    Ok(occurrences)
}

fn to_rrule_set(start: DateTime<Local>, rule: &RuleSpec) -> AgendaResult<RRuleSet> {
    let rrule_str = match rule {
        RuleSpec::Text(text) => build_text_rule(start, text),
        RuleSpec::Structured(structured) => build_structured_rule(start, structured)?,
    };

    rrule_str
        .parse::<RRuleSet>()
        .map_err(|e| AgendaError::Rule(format!("Failed to parse RRULE '{}': {}", rrule_str, e)))
}

/// DTSTART without a zone designator, so the rrule crate expands in local time.
fn dtstart_line(start: DateTime<Local>) -> String {
    format!("DTSTART:{}", start.format("%Y%m%dT%H%M%S"))
}

/// Build an iCalendar-format rule string from caller text.
fn build_text_rule(start: DateTime<Local>, text: &str) -> String {
    let mut lines: Vec<String> = text
        .trim()
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    let has_dtstart = has_property(&lines, "DTSTART");
    if !has_dtstart && !has_property(&lines, "RRULE") && !has_property(&lines, "RDATE") {
        lines = vec![format!("RRULE:{}", lines.join(";"))];
    }
    if !has_dtstart {
        lines.insert(0, dtstart_line(start));
    }

    lines.join("\n")
}

fn has_property(lines: &[String], name: &str) -> bool {
    lines
        .iter()
        .any(|line| line.to_ascii_uppercase().starts_with(name))
}

/// Build an iCalendar-format rule string from structured options.
fn build_structured_rule(start: DateTime<Local>, rule: &StructuredRule) -> AgendaResult<String> {
    let mut parts = vec![format!("FREQ={}", rule.frequency.to_ics()?)];

    if let Some(interval) = rule.interval {
        parts.push(format!("INTERVAL={}", interval));
    }
    if let Some(count) = rule.count {
        parts.push(format!("COUNT={}", count));
    }
    if let Some(until) = &rule.until {
        let until = datetime::parse_instant(until)
            .map_err(|_| AgendaError::Rule(format!("Invalid until '{}'", until)))?;
        parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%S")));
    }
    if let Some(week_start) = &rule.week_start {
        parts.push(format!("WKST={}", week_start.to_ics()?));
    }
    if !rule.by_weekday.is_empty() {
        let days = rule
            .by_weekday
            .iter()
            .map(WeekdaySpec::to_ics)
            .collect::<AgendaResult<Vec<_>>>()?;
        parts.push(format!("BYDAY={}", days.join(",")));
    }

    push_list(&mut parts, "BYMONTHDAY", &rule.by_month_day);
    push_list(&mut parts, "BYMONTH", &rule.by_month);
    push_list(&mut parts, "BYYEARDAY", &rule.by_year_day);
    push_list(&mut parts, "BYWEEKNO", &rule.by_week_no);
    push_list(&mut parts, "BYHOUR", &rule.by_hour);
    push_list(&mut parts, "BYMINUTE", &rule.by_minute);
    push_list(&mut parts, "BYSECOND", &rule.by_second);
    push_list(&mut parts, "BYSETPOS", &rule.by_set_pos);

    Ok(format!("{}\nRRULE:{}", dtstart_line(start), parts.join(";")))
}

fn push_list<T: ToString>(parts: &mut Vec<String>, key: &str, values: &[T]) {
    if values.is_empty() {
        return;
    }
    let joined: Vec<String> = values.iter().map(T::to_string).collect();
    parts.push(format!("{}={}", key, joined.join(",")));
}
