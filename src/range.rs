use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::RangeError;

/// The only unit with defined semantics.
pub const BYTES_UNIT: &str = "bytes";

/// A single byte interval as written in a `Range` header, possibly open at
/// one end.
///
/// Both bounds absent means the whole entity (`*`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeItem {
    from: Option<u64>,
    to: Option<u64>,
    // written as `N` rather than `N-N`
    compact: bool,
}

impl RangeItem {
    pub const fn new(from: Option<u64>, to: Option<u64>) -> Self {
        RangeItem { from, to, compact: false }
    }

    /// `*`
    pub const fn entire() -> Self {
        RangeItem::new(None, None)
    }

    /// `from-to`
    pub const fn span(from: u64, to: u64) -> Self {
        RangeItem::new(Some(from), Some(to))
    }

    /// `from-`
    pub const fn starting_at(from: u64) -> Self {
        RangeItem::new(Some(from), None)
    }

    /// `-length`, the last `length` bytes.
    pub const fn suffix(length: u64) -> Self {
        RangeItem::new(None, Some(length))
    }

    /// `position`, a single byte.
    pub const fn position(position: u64) -> Self {
        RangeItem { from: Some(position), to: Some(position), compact: true }
    }

    pub fn from(&self) -> Option<u64> {
        self.from
    }

    pub fn to(&self) -> Option<u64> {
        self.to
    }

    pub fn is_entire(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Parses one item. Accepted, in order: `*`, `N-M`, `N-`, `-N`, `N`.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        if text == "*" {
            return Ok(RangeItem::entire());
        }

        let malformed = || RangeError::MalformedItem(text.to_string());
        match text.split_once('-') {
            Some(("", "")) => Err(malformed()),
            Some(("", to)) => Ok(RangeItem::suffix(numeral(to).ok_or_else(malformed)?)),
            Some((from, "")) => Ok(RangeItem::starting_at(numeral(from).ok_or_else(malformed)?)),
            Some((from, to)) => {
                let from = numeral(from).ok_or_else(malformed)?;
                let to = numeral(to).ok_or_else(malformed)?;
                Ok(RangeItem::span(from, to))
            }
            None => Ok(RangeItem::position(numeral(text).ok_or_else(malformed)?)),
        }
    }
}

/// Base-10 digits only; no sign, no whitespace, no overflow.
fn numeral(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl PartialEq for RangeItem {
    fn eq(&self, other: &RangeItem) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl Eq for RangeItem {}

impl Hash for RangeItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.from.hash(state);
        self.to.hash(state);
    }
}

impl FromStr for RangeItem {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RangeItem::parse(s)
    }
}

impl fmt::Display for RangeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.to) {
            (None, None) => f.write_str("*"),
            (Some(from), Some(to)) if self.compact && from == to => write!(f, "{from}"),
            (Some(from), Some(to)) => write!(f, "{from}-{to}"),
            (Some(from), None) => write!(f, "{from}-"),
            (None, Some(to)) => write!(f, "-{to}"),
        }
    }
}

/// A unit plus an ordered list of [`RangeItem`]s, the value of a single
/// `Range` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeSet {
    unit: String,
    items: Vec<RangeItem>,
}

impl RangeSet {
    /// Strict construction. An empty unit means `bytes`, any other unit is
    /// rejected.
    pub fn new(unit: &str, items: impl IntoIterator<Item = RangeItem>) -> Result<Self, RangeError> {
        if !unit.is_empty() && unit != BYTES_UNIT {
            return Err(RangeError::UnsupportedUnit(unit.to_string()));
        }
        RangeSet::with_unit(BYTES_UNIT, items.into_iter().collect())
    }

    /// A `bytes` range over `items`.
    pub fn bytes(items: impl IntoIterator<Item = RangeItem>) -> Result<Self, RangeError> {
        RangeSet::new(BYTES_UNIT, items)
    }

    /// `bytes=*`
    pub fn entire() -> Self {
        RangeSet { unit: BYTES_UNIT.to_string(), items: vec![RangeItem::entire()] }
    }

    fn with_unit(unit: &str, items: Vec<RangeItem>) -> Result<Self, RangeError> {
        if items.len() > 1 && items.iter().any(RangeItem::is_entire) {
            return Err(RangeError::EntireNotAlone);
        }
        let unit = if unit.is_empty() { BYTES_UNIT } else { unit };
        Ok(RangeSet { unit: unit.to_string(), items })
    }

    /// Parses `unit=item(,item)*`. Any unit is kept here; normalization is
    /// where non-`bytes` units are refused.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let (unit, items) = text
            .split_once('=')
            .ok_or_else(|| RangeError::MalformedRange(text.to_string()))?;
        let items = items
            .split(',')
            .map(|item| RangeItem::parse(item.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        RangeSet::with_unit(unit, items)
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn items(&self) -> &[RangeItem] {
        &self.items
    }

    pub fn is_bytes(&self) -> bool {
        self.unit == BYTES_UNIT
    }

    /// Response style rendering of one item: `unit item/length`, with `*`
    /// standing in for an unknown length. Used for `Content-Range`.
    pub fn content_range(&self, item: &RangeItem, length: Option<u64>) -> String {
        match length {
            Some(length) => format!("{} {}/{}", self.unit, item, length),
            None => format!("{} {}/*", self.unit, item),
        }
    }
}

impl FromStr for RangeSet {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RangeSet::parse(s)
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.unit)?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}
