//! Five-field cron expressions.
//!
//! Only syntax is checked here; when a schedule fires is decided by the
//! worker's scheduler. The normalised text (single spaces, lower-case
//! names) is what gets embedded in the runtime config, so two spellings of
//! the same schedule compare equal.

use std::fmt;
use std::str::FromStr;

use crate::error::CronError;

struct FieldRule {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

const FIELDS: [FieldRule; 5] = [
    FieldRule {
        name: "minute",
        min: 0,
        max: 59,
        names: &[],
    },
    FieldRule {
        name: "hour",
        min: 0,
        max: 23,
        names: &[],
    },
    FieldRule {
        name: "day-of-month",
        min: 1,
        max: 31,
        names: &[],
    },
    FieldRule {
        name: "month",
        min: 1,
        max: 12,
        names: MONTH_NAMES,
    },
    FieldRule {
        name: "day-of-week",
        min: 0,
        max: 7,
        names: DAY_NAMES,
    },
];

/// A syntactically valid cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CronExpr {
    fields: [String; 5],
}

impl CronExpr {
    pub fn parse(input: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.len() != FIELDS.len() {
            return Err(CronError::FieldCount(parts.len()));
        }

        let mut fields: [String; 5] = Default::default();
        for (slot, (part, rule)) in fields.iter_mut().zip(parts.iter().zip(FIELDS.iter())) {
            *slot = parse_field(part, rule)?;
        }

        Ok(Self { fields })
    }

    pub fn minute(&self) -> &str {
        &self.fields[0]
    }

    pub fn hour(&self) -> &str {
        &self.fields[1]
    }
}

fn parse_field(field: &str, rule: &FieldRule) -> Result<String, CronError> {
    let lowered = field.to_ascii_lowercase();
    for item in lowered.split(',') {
        if item.is_empty() {
            return Err(CronError::EmptyItem { field: rule.name });
        }
        parse_item(item, rule)?;
    }
    Ok(lowered)
}

fn parse_item(item: &str, rule: &FieldRule) -> Result<(), CronError> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    if let Some(step) = step {
        let step: u32 = step.parse().map_err(|_| CronError::InvalidValue {
            field: rule.name,
            value: item.to_string(),
        })?;
        if step == 0 {
            return Err(CronError::ZeroStep { field: rule.name });
        }
    }

    if range == "*" {
        return Ok(());
    }

    match range.split_once('-') {
        Some((start, end)) => {
            let start = parse_value(start, rule)?;
            let end = parse_value(end, rule)?;
            if start > end {
                return Err(CronError::InvertedRange {
                    field: rule.name,
                    start,
                    end,
                });
            }
        }
        None => {
            parse_value(range, rule)?;
        }
    }

    Ok(())
}

fn parse_value(value: &str, rule: &FieldRule) -> Result<u32, CronError> {
    if let Some(index) = rule.names.iter().position(|n| *n == value) {
        // Month names are 1-based, day names 0-based.
        return Ok(index as u32 + rule.min);
    }

    let parsed: u32 = value.parse().map_err(|_| CronError::InvalidValue {
        field: rule.name,
        value: value.to_string(),
    })?;

    if parsed < rule.min || parsed > rule.max {
        return Err(CronError::OutOfRange {
            field: rule.name,
            value: parsed,
            min: rule.min,
            max: rule.max,
        });
    }

    Ok(parsed)
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields.join(" "))
    }
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
