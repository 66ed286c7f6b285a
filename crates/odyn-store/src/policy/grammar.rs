//! Permission grammar: rights letters, time windows and permission specs.
//!
//! ```text
//! spec     := "*" | element | [ element, ... ]
//! element  := rights | window ":" rights
//! window   := TIMESTAMP | TIMESTAMP "-" TIMESTAMP
//! rights   := "*" | { "g" | "s" | "m" | "c" | "d" | "G" }+
//! TIMESTAMP = YYYYMMDDHHMMSS (UTC)
//! ```
//!
//! `TIMESTAMP:rights` is active from the timestamp onward;
//! `START-END:rights` only within the closed range.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Width of a grant timestamp.
const TIMESTAMP_LEN: usize = 14;

/// Format used when writing timestamps back out.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Error from parsing an ACL, grant or app policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AclError {
    #[error("unknown rights letter '{0}'")]
    UnknownRight(char),
    #[error("empty rights string")]
    EmptyRights,
    #[error("malformed timestamp '{0}' (expected YYYYMMDDHHMMSS)")]
    BadTimestamp(String),
    #[error("time range '{0}' ends before it starts")]
    InvertedRange(String),
    #[error("invalid actor key '{0}'")]
    BadActorKey(String),
    #[error("invalid app policy target '{0}'")]
    BadAppTarget(String),
    #[error("app policy key '{0}' is both a shared target and an application")]
    AppKeyCollision(String),
    #[error("expected {expected}, found {found}")]
    WrongShape {
        expected: &'static str,
        found: String,
    },
}

impl AclError {
    pub(crate) fn wrong_shape(expected: &'static str, found: &Value) -> Self {
        Self::WrongShape {
            expected,
            found: found.to_string(),
        }
    }
}

/// A single access right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Right {
    /// `g`: read the property value.
    Get,
    /// `s`: write the property value.
    Set,
    /// `m`: modify metadata (attributes, ACL).
    ModifyMetadata,
    /// `c`: clear value history.
    ClearHistory,
    /// `d`: delete the property.
    Delete,
    /// `G`: read the value in aggregate / anonymized form only.
    GetAggregate,
}

impl Right {
    /// All rights, in canonical letter order.
    pub const ALL: [Right; 6] = [
        Right::Get,
        Right::Set,
        Right::ModifyMetadata,
        Right::ClearHistory,
        Right::Delete,
        Right::GetAggregate,
    ];

    pub fn letter(self) -> char {
        match self {
            Right::Get => 'g',
            Right::Set => 's',
            Right::ModifyMetadata => 'm',
            Right::ClearHistory => 'c',
            Right::Delete => 'd',
            Right::GetAggregate => 'G',
        }
    }

    pub fn from_letter(c: char) -> Option<Right> {
        Right::ALL.into_iter().find(|r| r.letter() == c)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A set of rights.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RightSet(u8);

impl RightSet {
    pub const EMPTY: RightSet = RightSet(0);

    pub fn all() -> Self {
        Right::ALL.into_iter().collect()
    }

    /// Parse a rights string. `*` means every right.
    pub fn parse(s: &str) -> Result<Self, AclError> {
        if s == "*" {
            return Ok(Self::all());
        }
        if s.is_empty() {
            return Err(AclError::EmptyRights);
        }
        s.chars()
            .map(|c| Right::from_letter(c).ok_or(AclError::UnknownRight(c)))
            .collect()
    }

    pub fn contains(&self, right: Right) -> bool {
        self.0 & right.bit() != 0
    }

    pub fn insert(&mut self, right: Right) {
        self.0 |= right.bit();
    }

    pub fn union(self, other: RightSet) -> RightSet {
        RightSet(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    pub fn iter(&self) -> impl Iterator<Item = Right> + '_ {
        Right::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Right> for RightSet {
    fn from_iter<I: IntoIterator<Item = Right>>(iter: I) -> Self {
        let mut set = RightSet::EMPTY;
        for r in iter {
            set.insert(r);
        }
        set
    }
}

impl fmt::Display for RightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in self.iter() {
            write!(f, "{}", r.letter())?;
        }
        Ok(())
    }
}

impl fmt::Debug for RightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RightSet(\"{self}\")")
    }
}

/// Parse a `YYYYMMDDHHMMSS` UTC timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, AclError> {
    let bad = || AclError::BadTimestamp(s.to_string());
    if s.len() != TIMESTAMP_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let field = |range: std::ops::Range<usize>| s[range].parse::<u32>().map_err(|_| bad());

    let year = s[0..4].parse::<i32>().map_err(|_| bad())?;
    let (month, day) = (field(4..6)?, field(6..8)?);
    let (hour, minute, second) = (field(8..10)?, field(10..12)?, field(12..14)?);
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc())
        .ok_or_else(bad)
}

/// Format a timestamp in grant form.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// When a grant element applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    /// No time bound.
    Always,
    /// From the instant onward (inclusive).
    From(DateTime<Utc>),
    /// Within the closed range.
    Between(DateTime<Utc>, DateTime<Utc>),
}

impl Window {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match *self {
            Window::Always => true,
            Window::From(start) => now >= start,
            Window::Between(start, end) => start <= now && now <= end,
        }
    }
}

/// One element of a permission spec: rights plus when they apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    pub window: Window,
    pub rights: RightSet,
}

impl Grant {
    /// An unconditional grant.
    pub fn always(rights: RightSet) -> Self {
        Self {
            window: Window::Always,
            rights,
        }
    }

    /// Parse `rights`, `TIMESTAMP:rights` or `START-END:rights`.
    pub fn parse(s: &str) -> Result<Self, AclError> {
        let Some((window, rights)) = s.split_once(':') else {
            return Ok(Self::always(RightSet::parse(s)?));
        };

        let window = match window.split_once('-') {
            Some((start, end)) => {
                let start = parse_timestamp(start)?;
                let end = parse_timestamp(end)?;
                if end < start {
                    return Err(AclError::InvertedRange(window.to_string()));
                }
                Window::Between(start, end)
            }
            None => Window::From(parse_timestamp(window)?),
        };

        Ok(Self {
            window,
            rights: RightSet::parse(rights)?,
        })
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.window.is_active(now)
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.window {
            Window::Always => {}
            Window::From(start) => write!(f, "{}:", format_timestamp(start))?,
            Window::Between(start, end) => {
                write!(f, "{}-{}:", format_timestamp(start), format_timestamp(end))?
            }
        }
        write!(f, "{}", self.rights)
    }
}

/// The right-hand side of an ACL entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionSpec {
    /// `"*"`: every right, no time bound.
    All,
    /// One or more grant elements; their active rights are unioned.
    Grants(Vec<Grant>),
}

impl PermissionSpec {
    /// Parse the JSON form: a string or an array of strings.
    pub fn from_json(value: &Value) -> Result<Self, AclError> {
        match value {
            Value::String(s) if s == "*" => Ok(PermissionSpec::All),
            Value::String(s) => Ok(PermissionSpec::Grants(vec![Grant::parse(s)?])),
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Grant::parse(s),
                    other => Err(AclError::wrong_shape("rights string", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(PermissionSpec::Grants),
            other => Err(AclError::wrong_shape(
                "rights string or non-empty array",
                other,
            )),
        }
    }

    /// Canonical JSON form: `"*"`, a single string, or an array.
    pub fn to_json(&self) -> Value {
        match self {
            PermissionSpec::All => Value::String("*".into()),
            PermissionSpec::Grants(grants) if grants.len() == 1 => {
                Value::String(grants[0].to_string())
            }
            PermissionSpec::Grants(grants) => {
                Value::Array(grants.iter().map(|g| Value::String(g.to_string())).collect())
            }
        }
    }

    /// Union of the rights of every element active at `now`.
    pub fn active_rights(&self, now: DateTime<Utc>) -> RightSet {
        match self {
            PermissionSpec::All => RightSet::all(),
            PermissionSpec::Grants(grants) => grants
                .iter()
                .filter(|g| g.is_active(now))
                .fold(RightSet::EMPTY, |acc, g| acc.union(g.rights)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_rights_letters() {
        let set = RightSet::parse("gsmcdG").unwrap();
        assert!(set.is_all());
        assert_eq!(set.to_string(), "gsmcdG");

        let set = RightSet::parse("dg").unwrap();
        assert!(set.contains(Right::Get));
        assert!(set.contains(Right::Delete));
        assert!(!set.contains(Right::Set));
        assert_eq!(set.to_string(), "gd");
    }

    #[test]
    fn test_get_and_aggregate_are_independent() {
        let g = RightSet::parse("g").unwrap();
        let big_g = RightSet::parse("G").unwrap();
        assert!(g.contains(Right::Get) && !g.contains(Right::GetAggregate));
        assert!(big_g.contains(Right::GetAggregate) && !big_g.contains(Right::Get));
    }

    #[test]
    fn test_rights_parse_errors() {
        assert_eq!(RightSet::parse("gx"), Err(AclError::UnknownRight('x')));
        assert_eq!(RightSet::parse(""), Err(AclError::EmptyRights));
        assert_eq!(RightSet::parse("S"), Err(AclError::UnknownRight('S')));
    }

    #[test]
    fn test_star_is_all_rights() {
        assert!(RightSet::parse("*").unwrap().is_all());
    }

    #[test]
    fn test_parse_timestamp() {
        let t = ts("20150803202208");
        assert_eq!(t, Utc.with_ymd_and_hms(2015, 8, 3, 20, 22, 8).unwrap());
        assert_eq!(format_timestamp(&t), "20150803202208");
    }

    #[test]
    fn test_parse_timestamp_rejects_malformed() {
        for bad in [
            "2015080320220",
            "201508032022080",
            "2015O803202208",
            "20151303202208",
            "20150230000000",
            "20150803246000",
            "",
        ] {
            assert!(parse_timestamp(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_grant_bare() {
        let g = Grant::parse("gs").unwrap();
        assert_eq!(g.window, Window::Always);
        assert_eq!(g.to_string(), "gs");
    }

    #[test]
    fn test_grant_open_ended() {
        let g = Grant::parse("20150803202208:gs").unwrap();
        let start = ts("20150803202208");
        assert!(g.is_active(start));
        assert!(g.is_active(start + Duration::days(400)));
        assert!(!g.is_active(start - Duration::seconds(1)));
        assert_eq!(g.to_string(), "20150803202208:gs");
    }

    #[test]
    fn test_grant_range_is_inclusive() {
        let g = Grant::parse("20150803202208-20150804235959:smcd").unwrap();
        let start = ts("20150803202208");
        let end = ts("20150804235959");
        assert!(g.is_active(start));
        assert!(g.is_active(end));
        assert!(g.is_active(start + Duration::hours(3)));
        assert!(!g.is_active(end + Duration::seconds(1)));
        assert!(!g.is_active(start - Duration::seconds(1)));
    }

    #[test]
    fn test_grant_range_inverted() {
        assert!(matches!(
            Grant::parse("20150804235959-20150803202208:g"),
            Err(AclError::InvertedRange(_))
        ));
    }

    #[test]
    fn test_grant_bad_rights_after_window() {
        assert_eq!(
            Grant::parse("20150803202208:gq"),
            Err(AclError::UnknownRight('q'))
        );
        assert_eq!(Grant::parse("20150803202208:"), Err(AclError::EmptyRights));
    }

    #[test]
    fn test_spec_from_json_shapes() {
        assert_eq!(PermissionSpec::from_json(&json!("*")).unwrap(), PermissionSpec::All);
        assert!(matches!(
            PermissionSpec::from_json(&json!("gsmcd")).unwrap(),
            PermissionSpec::Grants(g) if g.len() == 1
        ));
        assert!(matches!(
            PermissionSpec::from_json(&json!(["g", "20150803202208-20150804235959:smcd"])).unwrap(),
            PermissionSpec::Grants(g) if g.len() == 2
        ));
        assert!(PermissionSpec::from_json(&json!([])).is_err());
        assert!(PermissionSpec::from_json(&json!(7)).is_err());
        assert!(PermissionSpec::from_json(&json!(["g", 7])).is_err());
    }

    #[test]
    fn test_spec_json_is_canonical() {
        let spec = PermissionSpec::from_json(&json!(["sg", "20150803202208:Gd"])).unwrap();
        assert_eq!(spec.to_json(), json!(["gs", "20150803202208:dG"]));
        let single = PermissionSpec::from_json(&json!(["dg"])).unwrap();
        assert_eq!(single.to_json(), json!("gd"));
    }

    #[test]
    fn test_overlapping_ranges_union() {
        let spec = PermissionSpec::from_json(&json!([
            "20150801000000-20150810000000:g",
            "20150803000000-20150805000000:s",
            "20150901000000:d",
        ]))
        .unwrap();
        let rights = spec.active_rights(ts("20150804000000"));
        assert_eq!(rights.to_string(), "gs");
        let later = spec.active_rights(ts("20150902000000"));
        assert_eq!(later.to_string(), "d");
    }
}
