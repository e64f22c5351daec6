// ABOUTME: Deterministic workout-name grammar turning free-text titles into interval expectations
// ABOUTME: Cascade of repetition, named-effort, and keyword rules with plausibility validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! Workout name parsing
//!
//! Titles such as `6x400m w/ 200m jog`, `4 mi @ T`, `5k race 18:45` or `Hills` are
//! mapped onto a [`ParsedWorkout`]. Rules run in a fixed order and the first match
//! wins, so the same text always yields the same structure. Text no rule recognises
//! is reported as [`ParseOutcome::Unrecognized`] and may be handed to a fallback
//! classifier; text that matches a rule but fails plausibility checks is
//! [`ParseOutcome::Rejected`].

use regex::{Captures, Regex};
use runbase_core::constants::{limits, race, units::METERS_PER_MILE, GENERIC_WORKOUT_NAMES};
use runbase_core::models::WorkoutType;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Recovery between repetitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Recovery {
    /// Recovery jog / walk of a distance in meters
    Distance(f64),
    /// Standing or jogging recovery in seconds
    Duration(f64),
}

/// One `N x DISTANCE` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatSet {
    /// Repetitions
    pub reps: u32,
    /// Distance of each repetition in meters
    pub distance_m: f64,
    /// Recovery after each repetition
    pub recovery: Option<Recovery>,
}

/// Shape of the prescribed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkoutStructure {
    /// One or more repeat blocks
    Repeats {
        /// Blocks in order
        sets: Vec<RepeatSet>,
    },
    /// A single continuous effort
    Continuous {
        /// Effort distance if stated
        distance_m: Option<f64>,
    },
    /// Type known, shape not stated
    Unstructured,
}

/// Which rule produced a parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseRule {
    /// `N x DISTANCE`
    Repetition,
    /// Race / time trial
    Race,
    /// `tempo N`, `N at T`, `easy N`, `long N`, ...
    NamedEffort,
    /// Classification keyword without structure
    Keyword,
    /// Fallback classifier verdict
    Classifier,
}

/// Structured interpretation of a workout title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedWorkout {
    /// Workout classification
    pub workout_type: WorkoutType,
    /// Prescribed structure
    pub structure: WorkoutStructure,
    /// Target or achieved time stated in the title (races)
    pub target_time_s: Option<f64>,
    /// Rule that matched
    pub rule: ParseRule,
}

impl ParsedWorkout {
    /// Distinct repetition distances, ascending
    #[must_use]
    pub fn rep_distances(&self) -> Vec<f64> {
        let mut distances: Vec<f64> = match &self.structure {
            WorkoutStructure::Repeats { sets } => sets.iter().map(|s| s.distance_m).collect(),
            WorkoutStructure::Continuous { .. } | WorkoutStructure::Unstructured => Vec::new(),
        };
        distances.sort_by(f64::total_cmp);
        distances.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
        distances
    }

    /// Distance of a continuous effort
    #[must_use]
    pub fn effort_distance_m(&self) -> Option<f64> {
        match &self.structure {
            WorkoutStructure::Continuous { distance_m } => *distance_m,
            WorkoutStructure::Repeats { .. } | WorkoutStructure::Unstructured => None,
        }
    }

    /// Total prescribed repetitions
    #[must_use]
    pub fn total_reps(&self) -> u32 {
        match &self.structure {
            WorkoutStructure::Repeats { sets } => sets.iter().map(|s| s.reps).sum(),
            WorkoutStructure::Continuous { .. } | WorkoutStructure::Unstructured => 0,
        }
    }

    /// Whether the title describes repeated work bouts
    #[must_use]
    pub fn is_repeat_workout(&self) -> bool {
        matches!(self.structure, WorkoutStructure::Repeats { .. })
            || matches!(
                self.workout_type,
                WorkoutType::Interval | WorkoutType::Repetition
            )
    }
}

/// Result of running the rule cascade
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A rule matched and passed validation
    Parsed(ParsedWorkout),
    /// A rule matched but the values are implausible
    Rejected {
        /// Why validation failed
        reason: String,
    },
    /// No rule matched
    Unrecognized,
}

const DIST: &str = r"(\d+(?:\.\d+)?)\s*(km|k|miles?|mi|meters?|m)?";

static REPEAT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 6x400, 6 x 400m, 4X1mi, 3x2k
    Regex::new(&format!(r"(?i)\b(\d{{1,3}})\s*[x×]\s*{DIST}\b")).ok()
});

static RECOVERY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 200m jog, 90s rest, 2:00 rec, 3 min recovery
    Regex::new(
        r"(?i)(\d+(?::\d{2})?(?:\.\d+)?)\s*(meters?|m|secs?|seconds?|s|mins?|minutes?)?\s*(?:jog|rest|recovery|rec|walk|float)\b",
    )
    .ok()
});

static RACE_NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\brace\b|\btime\s*trial\b|\bparkrun\b").ok()
});

static TIME_TRIAL_ABBREVIATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bTT\b").ok());

static RACE_TIME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 18:45, 1:05:30
    Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\b").ok()
});

static EXPLICIT_DISTANCE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Distances with an explicit unit: 10k, 5 km, 10 mile, 3.1mi
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(km|k|miles?|mi)\b").ok()
});

/// Race distances recognised without a number-and-unit token; longer phrases first
static NAMED_RACE_DISTANCES: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    [
        (r"(?i)\bhalf\s*marathon\b", race::HALF_MARATHON_M),
        (r"(?i)\bmarathon\b", race::MARATHON_M),
        (r"(?i)\bhalf\b", race::HALF_MARATHON_M),
        (r"(?i)\bparkrun\b", 5_000.0),
        (r"(?i)\b2\s*mile\b", race::TWO_MILE_M),
        (r"(?i)\bmile\b", METERS_PER_MILE),
        (r"\b3200m?\b", 3_200.0),
        (r"\b3000m?\b", 3_000.0),
        (r"\b1500m?\b", 1_500.0),
        (r"\b800m?\b", 800.0),
        (r"\b400m?\b", 400.0),
        (r"\b200m?\b", 200.0),
    ]
    .into_iter()
    .filter_map(|(pattern, meters)| Regex::new(pattern).ok().map(|re| (re, meters)))
    .collect()
});

static TEMPO_EFFORT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\btempo\s+{DIST}\b|\b{DIST}\s+tempo\b|\b{DIST}\s*(?:@|at)\s*T\b"
    ))
    .ok()
});

static EASY_EFFORT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\beasy\s+{DIST}\b|\b{DIST}\s+easy\b")).ok()
});

static LONG_EFFORT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\blong(?:\s+run)?\s+{DIST}\b|\b{DIST}\s+long\b"
    ))
    .ok()
});

static RECOVERY_EFFORT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\brecovery\s+{DIST}\b|\b{DIST}\s+recovery\b")).ok()
});

/// Keyword rules, checked in order
static KEYWORD_RULES: LazyLock<Vec<(Regex, WorkoutType)>> = LazyLock::new(|| {
    [
        (r"(?i)\btempo\b|\bthreshold\b|\bcruise\b|(?:@|\bat)\s*T\b", WorkoutType::Tempo),
        (r"(?i)\bhill|\bmins?\s*H\b", WorkoutType::Hills),
        (r"(?i)\bfartlek\b", WorkoutType::Fartlek),
        (
            r"(?i)\binterval|\brepeat|\btrack\b|\bspeed\b|\d+\s*[x×]\s*\(",
            WorkoutType::Interval,
        ),
        (r"(?i)\blong\s+run\b|\blong\b", WorkoutType::Long),
        (r"(?i)\brecovery\b|\bshakeout\b", WorkoutType::Recovery),
        (r"(?i)\beasy\b|\bstrides?\b", WorkoutType::Easy),
    ]
    .into_iter()
    .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind)))
    .collect()
});

/// Convert a number and optional unit into meters
///
/// Unit-less values up to 10 are miles (`4x1`, `3 easy`); larger ones are meters.
fn to_meters(value: f64, unit: Option<&str>) -> f64 {
    match unit.map(str::to_lowercase).as_deref() {
        Some("km" | "k") => value * 1_000.0,
        Some("mi" | "mile" | "miles") => value * METERS_PER_MILE,
        Some(_) => value,
        None if value <= 10.0 => value * METERS_PER_MILE,
        None => value,
    }
}

fn is_plausible_distance(distance_m: f64) -> bool {
    (limits::MIN_PRESCRIBED_DISTANCE_M..=limits::MAX_PRESCRIBED_DISTANCE_M).contains(&distance_m)
}

/// Whether a title carries no information beyond "a run happened"
#[must_use]
pub fn is_generic_name(name: &str) -> bool {
    let normalized = name.trim().to_lowercase();
    normalized.is_empty() || GENERIC_WORKOUT_NAMES.contains(&normalized.as_str())
}

/// Whether a title names a race or time trial
#[must_use]
pub fn is_race_name(name: &str) -> bool {
    RACE_NAME_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(name))
        || TIME_TRIAL_ABBREVIATION
            .as_ref()
            .is_some_and(|re| re.is_match(name))
}

/// Extract a race distance from a title
#[must_use]
pub fn parse_race_distance_m(name: &str) -> Option<f64> {
    for (pattern, meters) in NAMED_RACE_DISTANCES.iter().take(4) {
        if pattern.is_match(name) {
            return Some(*meters);
        }
    }
    if let Some(caps) = EXPLICIT_DISTANCE_PATTERN
        .as_ref()
        .and_then(|re| re.captures(name))
    {
        if let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
            return Some(to_meters(value, caps.get(2).map(|m| m.as_str())));
        }
    }
    NAMED_RACE_DISTANCES
        .iter()
        .skip(4)
        .find(|(pattern, _)| pattern.is_match(name))
        .map(|(_, meters)| *meters)
}

/// Extract a race time (`mm:ss` or `h:mm:ss`) from a title, in seconds
#[must_use]
pub fn parse_race_time_s(name: &str) -> Option<f64> {
    let caps = RACE_TIME_PATTERN.as_ref()?.captures(name)?;
    let first: f64 = caps.get(1)?.as_str().parse().ok()?;
    let second: f64 = caps.get(2)?.as_str().parse().ok()?;
    if second >= 60.0 {
        return None;
    }
    match caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok()) {
        Some(third) if third < 60.0 => Some(first.mul_add(3_600.0, second * 60.0) + third),
        Some(_) => None,
        None => Some(first.mul_add(60.0, second)),
    }
}

/// Closest commonly raced distance
#[must_use]
pub fn closest_race_distance_m(distance_m: f64) -> f64 {
    race::COMMON_DISTANCES_M
        .iter()
        .copied()
        .min_by(|a, b| (a - distance_m).abs().total_cmp(&(b - distance_m).abs()))
        .unwrap_or(distance_m)
}

/// Rule-cascade parser for workout titles
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkoutNameParser;

impl WorkoutNameParser {
    /// Create a parser
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parse a workout title
    #[must_use]
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let text = text.trim();
        if is_generic_name(text) {
            return ParseOutcome::Unrecognized;
        }

        match parse_repeats(text) {
            Some(Ok(parsed)) => return ParseOutcome::Parsed(parsed),
            Some(Err(reason)) => return ParseOutcome::Rejected { reason },
            None => {}
        }

        if is_race_name(text) {
            return parse_race(text);
        }

        if let Some(outcome) = parse_named_effort(text) {
            return outcome;
        }

        KEYWORD_RULES
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map_or(ParseOutcome::Unrecognized, |(_, kind)| {
                ParseOutcome::Parsed(ParsedWorkout {
                    workout_type: *kind,
                    structure: WorkoutStructure::Unstructured,
                    target_time_s: None,
                    rule: ParseRule::Keyword,
                })
            })
    }
}

fn capture_distance(caps: &Captures<'_>, value_group: usize) -> Option<f64> {
    let value: f64 = caps.get(value_group)?.as_str().parse().ok()?;
    Some(to_meters(value, caps.get(value_group + 1).map(|m| m.as_str())))
}

fn parse_recovery(segment: &str) -> Option<Recovery> {
    let caps = RECOVERY_PATTERN.as_ref()?.captures(segment)?;
    let raw = caps.get(1)?.as_str();
    let unit = caps.get(2).map(|m| m.as_str().to_lowercase());

    if let Some((minutes, seconds)) = raw.split_once(':') {
        let minutes: f64 = minutes.parse().ok()?;
        let seconds: f64 = seconds.parse().ok()?;
        return Some(Recovery::Duration(minutes.mul_add(60.0, seconds)));
    }

    let value: f64 = raw.parse().ok()?;
    match unit.as_deref() {
        Some(u) if u.starts_with("min") => Some(Recovery::Duration(value * 60.0)),
        Some(u) if u.starts_with('s') => Some(Recovery::Duration(value)),
        Some(_) => Some(Recovery::Distance(value)),
        None if value >= limits::MIN_PRESCRIBED_DISTANCE_M => Some(Recovery::Distance(value)),
        None => Some(Recovery::Duration(value * 60.0)),
    }
}

fn parse_repeats(text: &str) -> Option<Result<ParsedWorkout, String>> {
    let pattern = REPEAT_PATTERN.as_ref()?;
    let matches: Vec<Captures<'_>> = pattern.captures_iter(text).collect();
    if matches.is_empty() {
        return None;
    }

    let mut sets = Vec::with_capacity(matches.len());
    for (idx, caps) in matches.iter().enumerate() {
        let whole = caps.get(0)?;
        let reps: u32 = caps.get(1)?.as_str().parse().ok()?;
        let distance_m = capture_distance(caps, 2)?;

        if reps == 0 || reps > limits::MAX_REP_COUNT {
            return Some(Err(format!(
                "rep count {reps} outside 1-{}",
                limits::MAX_REP_COUNT
            )));
        }
        if !is_plausible_distance(distance_m) {
            return Some(Err(format!("rep distance {distance_m:.0} m is implausible")));
        }

        let tail_end = matches
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let recovery = parse_recovery(&text[whole.end()..tail_end]);

        sets.push(RepeatSet {
            reps,
            distance_m,
            recovery,
        });
    }

    let longest = sets.iter().map(|s| s.distance_m).fold(0.0, f64::max);
    let workout_type = KEYWORD_RULES
        .iter()
        .take(3)
        .find(|(pattern, _)| pattern.is_match(text))
        .map_or_else(
            || {
                if longest <= 600.0 {
                    WorkoutType::Repetition
                } else {
                    WorkoutType::Interval
                }
            },
            |(_, kind)| *kind,
        );

    Some(Ok(ParsedWorkout {
        workout_type,
        structure: WorkoutStructure::Repeats { sets },
        target_time_s: None,
        rule: ParseRule::Repetition,
    }))
}

fn parse_race(text: &str) -> ParseOutcome {
    let distance_m = parse_race_distance_m(text);
    if let Some(d) = distance_m {
        if !is_plausible_distance(d) {
            return ParseOutcome::Rejected {
                reason: format!("race distance {d:.0} m is implausible"),
            };
        }
    }
    ParseOutcome::Parsed(ParsedWorkout {
        workout_type: WorkoutType::Race,
        structure: WorkoutStructure::Continuous { distance_m },
        target_time_s: parse_race_time_s(text),
        rule: ParseRule::Race,
    })
}

fn parse_named_effort(text: &str) -> Option<ParseOutcome> {
    let rules: [(&LazyLock<Option<Regex>>, WorkoutType); 4] = [
        (&TEMPO_EFFORT_PATTERN, WorkoutType::Tempo),
        (&LONG_EFFORT_PATTERN, WorkoutType::Long),
        (&RECOVERY_EFFORT_PATTERN, WorkoutType::Recovery),
        (&EASY_EFFORT_PATTERN, WorkoutType::Easy),
    ];

    for (pattern, workout_type) in rules {
        let Some(caps) = pattern.as_ref().and_then(|re| re.captures(text)) else {
            continue;
        };
        // Alternations place the number in group 1, 3 or 5
        let distance_m = [1, 3, 5]
            .into_iter()
            .find_map(|group| capture_distance(&caps, group));
        let Some(distance_m) = distance_m else {
            continue;
        };
        if !is_plausible_distance(distance_m) {
            return Some(ParseOutcome::Rejected {
                reason: format!("{workout_type} distance {distance_m:.0} m is implausible"),
            });
        }
        return Some(ParseOutcome::Parsed(ParsedWorkout {
            workout_type,
            structure: WorkoutStructure::Continuous {
                distance_m: Some(distance_m),
            },
            target_time_s: None,
            rule: ParseRule::NamedEffort,
        }));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> ParsedWorkout {
        match WorkoutNameParser::new().parse(text) {
            ParseOutcome::Parsed(p) => p,
            other => panic!("expected parse for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_repeats() {
        let p = parsed("6x400m");
        assert_eq!(p.rule, ParseRule::Repetition);
        assert_eq!(p.workout_type, WorkoutType::Repetition);
        assert_eq!(p.total_reps(), 6);
        assert_eq!(p.rep_distances(), vec![400.0]);
    }

    #[test]
    fn test_repeats_with_recovery_and_units() {
        let p = parsed("4 x 1mi w/ 2:00 rest");
        let WorkoutStructure::Repeats { sets } = &p.structure else {
            panic!("expected repeats");
        };
        assert_eq!(sets.len(), 1);
        assert!((sets[0].distance_m - METERS_PER_MILE).abs() < 1e-9);
        assert_eq!(sets[0].recovery, Some(Recovery::Duration(120.0)));
        assert_eq!(p.workout_type, WorkoutType::Interval);
    }

    #[test]
    fn test_multiple_sets() {
        let p = parsed("4x400 200m jog, 4x200 90s rest");
        let WorkoutStructure::Repeats { sets } = &p.structure else {
            panic!("expected repeats");
        };
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].recovery, Some(Recovery::Distance(200.0)));
        assert_eq!(sets[1].recovery, Some(Recovery::Duration(90.0)));
        assert_eq!(p.rep_distances(), vec![200.0, 400.0]);
    }

    #[test]
    fn test_unitless_small_numbers_are_miles() {
        let p = parsed("3x2 @ T");
        assert_eq!(p.workout_type, WorkoutType::Tempo);
        assert!((p.rep_distances()[0] - 2.0 * METERS_PER_MILE).abs() < 1e-9);
    }

    #[test]
    fn test_implausible_repeats_are_rejected() {
        let outcome = WorkoutNameParser::new().parse("99x400");
        assert!(matches!(outcome, ParseOutcome::Rejected { .. }));
        let outcome = WorkoutNameParser::new().parse("5x20m");
        assert!(matches!(outcome, ParseOutcome::Rejected { .. }));
    }

    #[test]
    fn test_race_with_time() {
        let p = parsed("5k race 18:45");
        assert_eq!(p.workout_type, WorkoutType::Race);
        assert_eq!(p.effort_distance_m(), Some(5_000.0));
        assert_eq!(p.target_time_s, Some(1_125.0));
    }

    #[test]
    fn test_race_named_distances() {
        assert_eq!(parse_race_distance_m("Half Marathon PR"), Some(race::HALF_MARATHON_M));
        assert_eq!(parse_race_distance_m("parkrun"), Some(5_000.0));
        assert_eq!(parse_race_distance_m("Mile TT"), Some(METERS_PER_MILE));
        assert_eq!(
            parse_race_distance_m("10 mile race"),
            Some(10.0 * METERS_PER_MILE)
        );
        assert_eq!(parse_race_distance_m("3000m TT"), Some(3_000.0));
        assert!(is_race_name("Mile TT"));
        assert!(!is_race_name("tt easy"));
    }

    #[test]
    fn test_race_time_formats() {
        assert_eq!(parse_race_time_s("HM 1:25:30"), Some(5_130.0));
        assert_eq!(parse_race_time_s("5:12 mile"), Some(312.0));
        assert_eq!(parse_race_time_s("no time"), None);
    }

    #[test]
    fn test_named_efforts() {
        let p = parsed("tempo 4mi");
        assert_eq!(p.workout_type, WorkoutType::Tempo);
        assert!((p.effort_distance_m().unwrap() - 4.0 * METERS_PER_MILE).abs() < 1e-9);

        let p = parsed("5 mi at T");
        assert_eq!(p.workout_type, WorkoutType::Tempo);

        let p = parsed("long run 16k");
        assert_eq!(p.workout_type, WorkoutType::Long);
        assert_eq!(p.effort_distance_m(), Some(16_000.0));

        let p = parsed("8 easy");
        assert_eq!(p.workout_type, WorkoutType::Easy);
    }

    #[test]
    fn test_keyword_only() {
        let p = parsed("Hill sprints");
        assert_eq!(p.workout_type, WorkoutType::Hills);
        assert_eq!(p.structure, WorkoutStructure::Unstructured);
        assert_eq!(p.rule, ParseRule::Keyword);
        assert_eq!(parsed("Fartlek fun").workout_type, WorkoutType::Fartlek);
        assert_eq!(parsed("3x(2,2,4)").workout_type, WorkoutType::Interval);
    }

    #[test]
    fn test_generic_and_unknown_names() {
        let parser = WorkoutNameParser::new();
        assert_eq!(parser.parse("Morning Run"), ParseOutcome::Unrecognized);
        assert_eq!(parser.parse(""), ParseOutcome::Unrecognized);
        assert_eq!(parser.parse("with the club"), ParseOutcome::Unrecognized);
    }

    #[test]
    fn test_closest_race_distance() {
        assert_eq!(closest_race_distance_m(4_960.0), 5_000.0);
        assert_eq!(closest_race_distance_m(1_620.0), METERS_PER_MILE);
    }
}
