//! Compact identifier range sets.
//!
//! A [`RangeSet`] is an ordered list of [`Interval`]s rendered on the wire as
//! `range *("," range)` where `range = id | id ":" id | id ":" "*"`.
//!
//! The id space is 1-based. The value `0` is a sentinel meaning "no defined
//! bound" and is never a real entity id: an interval whose end is `0` is
//! unbounded above, and the interval `0:0` is empty.

use crate::error::{ProtocolError, ProtocolResult};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifier type used in range sets.
pub type Id = u64;

/// A closed interval of ids, possibly unbounded above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interval {
    begin: Id,
    end: Id,
}

impl Interval {
    /// Creates an interval from `begin` to `end` inclusive.
    ///
    /// An `end` of `0` leaves the interval unbounded above.
    #[must_use]
    pub const fn new(begin: Id, end: Id) -> Self {
        Self { begin, end }
    }

    /// Creates an interval covering exactly one id.
    #[must_use]
    pub const fn single(id: Id) -> Self {
        Self { begin: id, end: id }
    }

    /// Creates an interval from `begin` with no upper bound (`begin:*`).
    #[must_use]
    pub const fn open(begin: Id) -> Self {
        Self { begin, end: 0 }
    }

    /// Number of ids covered.
    ///
    /// Returns `0` for the empty sentinel interval and `Id::MAX` when the
    /// interval is unbounded above.
    #[must_use]
    pub fn size(&self) -> Id {
        if self.begin == 0 && self.end == 0 {
            return 0;
        }
        if !self.has_defined_end() {
            return Id::MAX;
        }
        self.end - self.begin + 1
    }

    /// Returns true if the lower bound is set.
    #[must_use]
    pub const fn has_defined_begin(&self) -> bool {
        self.begin != 0
    }

    /// Returns true if the upper bound is set.
    #[must_use]
    pub const fn has_defined_end(&self) -> bool {
        self.end != 0
    }

    /// Lower bound (`0` when undefined).
    #[must_use]
    pub const fn begin(&self) -> Id {
        self.begin
    }

    /// Upper bound, or `Id::MAX` when unbounded.
    #[must_use]
    pub const fn end(&self) -> Id {
        if self.has_defined_end() {
            self.end
        } else {
            Id::MAX
        }
    }

    /// Sets the lower bound.
    pub fn set_begin(&mut self, value: Id) {
        debug_assert!(value <= self.end || !self.has_defined_end());
        self.begin = value;
    }

    /// Sets the upper bound.
    pub fn set_end(&mut self, value: Id) {
        debug_assert!(value >= self.begin || !self.has_defined_begin());
        self.end = value;
    }

    /// Returns true if `id` falls inside this interval.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.size() > 0 && id >= self.begin && id <= self.end()
    }

    /// Renders the interval in wire form: `n`, `n:m` or `n:*`.
    #[must_use]
    pub fn to_sequence(&self) -> String {
        match self.size() {
            0 => String::new(),
            1 => self.begin.to_string(),
            _ if self.has_defined_end() => format!("{}:{}", self.begin, self.end),
            _ => format!("{}:*", self.begin),
        }
    }

    fn parse(text: &str) -> ProtocolResult<Self> {
        match text.split_once(':') {
            None => Ok(Self::single(parse_id(text)?)),
            Some((begin, "*")) => Ok(Self::open(parse_id(begin)?)),
            Some((begin, end)) => {
                let begin = parse_id(begin)?;
                let end = parse_id(end)?;
                // `5:3` denotes the same ids as `3:5`
                Ok(Self::new(begin.min(end), begin.max(end)))
            }
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sequence())
    }
}

fn parse_id(text: &str) -> ProtocolResult<Id> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidRange(format!("not an id: {text:?}")));
    }
    match text.parse::<Id>() {
        Ok(0) => Err(ProtocolError::InvalidRange(
            "0 is not a valid id".to_string(),
        )),
        Ok(id) => Ok(id),
        Err(_) => Err(ProtocolError::InvalidRange(format!("id out of range: {text}"))),
    }
}

/// An ordered sequence of id intervals.
///
/// Intervals keep their insertion order. Only a single [`RangeSet::add`] call
/// sorts and merges its own input; intervals from separate calls are never
/// merged with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    intervals: Vec<Interval>,
}

impl RangeSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from a collection of ids.
    pub fn from_ids<I: IntoIterator<Item = Id>>(ids: I) -> Self {
        let mut set = Self::new();
        set.add(ids);
        set
    }

    /// Adds ids, grouped into maximal runs of consecutive values.
    ///
    /// `[5, 1, 2, 3, 9]` appends the intervals `1:3`, `5` and `9`.
    pub fn add<I: IntoIterator<Item = Id>>(&mut self, ids: I) {
        let mut values: Vec<Id> = ids.into_iter().collect();
        values.sort_unstable();
        values.dedup();

        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return;
        };
        let (mut begin, mut end) = (first, first);
        for value in iter {
            if value == end + 1 {
                end = value;
            } else {
                self.intervals.push(Interval::new(begin, end));
                begin = value;
                end = value;
            }
        }
        self.intervals.push(Interval::new(begin, end));
    }

    /// Appends an interval as-is.
    pub fn add_interval(&mut self, interval: Interval) {
        self.intervals.push(interval);
    }

    /// Returns the intervals in insertion order.
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Returns true if the set holds no intervals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Returns true if every interval has a defined upper bound.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.intervals.iter().all(Interval::has_defined_end)
    }

    /// Returns true if any interval covers `id`.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.intervals.iter().any(|i| i.contains(id))
    }

    /// Expands a bounded set into its covered ids.
    ///
    /// Returns `None` if any interval is unbounded.
    #[must_use]
    pub fn to_ids(&self) -> Option<BTreeSet<Id>> {
        if !self.is_bounded() {
            return None;
        }
        Some(
            self.intervals
                .iter()
                .filter(|i| i.size() > 0)
                .flat_map(|i| i.begin()..=i.end())
                .collect(),
        )
    }

    /// Renders the set in wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.intervals
            .iter()
            .map(Interval::to_sequence)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Decodes a set from wire form.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        if text.is_empty() {
            return Err(ProtocolError::InvalidRange("empty range set".into()));
        }
        let intervals = text
            .split(',')
            .map(Interval::parse)
            .collect::<ProtocolResult<Vec<_>>>()?;
        Ok(Self { intervals })
    }
}

impl FromStr for RangeSet {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
