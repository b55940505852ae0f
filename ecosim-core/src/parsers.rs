//! Tolerant parsers for free-text fields from the warming meta-analysis tables.
//!
//! Every function here returns `Option` and never fails: unusable text yields `None` and the
//! rest of the row is still built. The categorical mappers are ordered keyword rule lists
//! where the first matching rule wins, so text containing several plausible keywords
//! (e.g. "boreal forest tundra transition") is always classified the same way.

use regex::Regex;
use std::sync::LazyLock;

use crate::site::{Coordinates, EcosystemType, WarmingMethod, WarmingSeason, WarmingTiming};

/// Degree, optional minutes and hemisphere letter for both axes.
///
/// Matches `68°38'N,149°34'W`, `65.5°N, 150.3°W` and `68.5N 149.5W`.
static COORDINATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)°?(?:'?(\d+)')?([NS])[,\s]+([\d.]+)°?(?:'?(\d+)')?([EW])")
        .expect("Invalid regex")
});

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.\-]").expect("Invalid regex"));

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d.]+").expect("Invalid regex"));

/// An ordered keyword rule: the variant matches when any keyword is a substring of the
/// lower-cased text.
type KeywordRule<T> = (&'static [&'static str], T);

const ECOSYSTEM_RULES: &[KeywordRule<EcosystemType>] = &[
    (&["tundra"], EcosystemType::Tundra),
    (&["forest"], EcosystemType::Forest),
    (&["shrub", "heath"], EcosystemType::ShrubHeathland),
    (
        &["grass", "meadow", "prairie", "steppe"],
        EcosystemType::GrasslandMeadowPrairie,
    ),
    (
        &["crop", "wheat", "maize", "agriculture"],
        EcosystemType::Cropland,
    ),
    (&["peat"], EcosystemType::Peat),
];

const WARMING_METHOD_RULES: &[KeywordRule<WarmingMethod>] = &[
    (&["greenhouse"], WarmingMethod::Greenhouse),
    (&["cable", "heating wire"], WarmingMethod::HeatingCable),
    (&["infrared"], WarmingMethod::InfraredRadiator),
    (&["otc", "open top chamber"], WarmingMethod::OpenTopChamber),
    (&["curtain"], WarmingMethod::Curtain),
];

const WARMING_SEASON_RULES: &[KeywordRule<WarmingSeason>] = &[
    (&["all year"], WarmingSeason::AllYear),
    (&["growing season"], WarmingSeason::GrowingSeason),
    (&["winter"], WarmingSeason::Winter),
];

fn first_matching_rule<T: Copy>(text: &str, rules: &[KeywordRule<T>]) -> Option<T> {
    let text = text.to_lowercase();
    rules
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, variant)| *variant)
}

fn axis_degrees(degrees: &str, minutes: Option<&str>) -> Option<f64> {
    let mut value: f64 = degrees.parse().ok()?;
    if let Some(minutes) = minutes {
        value += minutes.parse::<f64>().ok()? / 60.0;
    }
    Some(value)
}

/// Extract a coordinate pair from location text.
///
/// Minutes, when present, are added as `minutes / 60`. `S` and `W` negate the axis. Text
/// without a match, or whose values fall outside the valid ranges, gives `None`.
///
/// ```rust
/// use ecosim_core::parsers::parse_coordinates;
///
/// let c = parse_coordinates("65.5°N, 150.3°W").unwrap();
/// assert_eq!(c.latitude(), 65.5);
/// assert_eq!(c.longitude(), -150.3);
/// assert!(parse_coordinates("invalid").is_none());
/// ```
pub fn parse_coordinates(text: &str) -> Option<Coordinates> {
    let caps = COORDINATE_PATTERN.captures(text)?;

    let mut latitude = axis_degrees(&caps[1], caps.get(2).map(|m| m.as_str()))?;
    if &caps[3] == "S" {
        latitude = -latitude;
    }
    let mut longitude = axis_degrees(&caps[4], caps.get(5).map(|m| m.as_str()))?;
    if &caps[6] == "W" {
        longitude = -longitude;
    }

    Coordinates::new(latitude, longitude)
}

/// Extract a temperature increase in °C.
///
/// All characters other than digits, `.` and `-` are blanked before numbers are extracted.
/// A single number is returned as is. With two or more numbers the mean of the first two is
/// returned, which covers ranges such as "3-5 °C"; any further numbers are ignored.
///
/// ```rust
/// use ecosim_core::parsers::parse_temperature_increase;
///
/// assert_eq!(parse_temperature_increase("3-5°C in air temperature"), Some(4.0));
/// assert_eq!(parse_temperature_increase("1.5-2"), Some(1.75));
/// assert_eq!(parse_temperature_increase("invalid"), None);
/// ```
pub fn parse_temperature_increase(text: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(text, " ");
    let mut numbers = NUMBER.find_iter(&cleaned).map(|m| m.as_str());

    let first: f64 = numbers.next()?.parse().ok()?;
    match numbers.next() {
        None => Some(first),
        Some(second) => {
            let second: f64 = second.parse().ok()?;
            Some((first + second) / 2.0)
        }
    }
}

/// Parse a comma-separated list of measurement timepoints in months.
///
/// Empty tokens are skipped. Any token that is not an integer invalidates the whole field.
/// Source order and duplicates are kept.
///
/// ```rust
/// use ecosim_core::parsers::parse_duration_months;
///
/// assert_eq!(parse_duration_months("1, 3, 6, 12"), Some(vec![1, 3, 6, 12]));
/// assert_eq!(parse_duration_months("1, x, 6"), None);
/// ```
pub fn parse_duration_months(text: &str) -> Option<Vec<i32>> {
    let months = text
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()?;

    (!months.is_empty()).then_some(months)
}

pub fn map_ecosystem_type(text: &str) -> Option<EcosystemType> {
    first_matching_rule(text, ECOSYSTEM_RULES)
}

pub fn map_warming_method(text: &str) -> Option<WarmingMethod> {
    first_matching_rule(text, WARMING_METHOD_RULES)
}

/// Classify warming timing.
///
/// "night" wins over everything else. "day" without "all" means day time only, so
/// "all day" has to be checked after that rule.
pub fn map_warming_timing(text: &str) -> Option<WarmingTiming> {
    let text = text.to_lowercase();
    if text.contains("night") {
        Some(WarmingTiming::NightTime)
    } else if text.contains("day") && !text.contains("all") {
        Some(WarmingTiming::DayTime)
    } else if text.contains("all day") {
        Some(WarmingTiming::AllDay)
    } else if text.contains("growing season") {
        Some(WarmingTiming::GrowingSeason)
    } else {
        None
    }
}

pub fn map_warming_season(text: &str) -> Option<WarmingSeason> {
    first_matching_rule(text, WARMING_SEASON_RULES)
}
