//! Rule table for Life-like automata written as `"survival/birth"`.
//!
//! Both groups list single neighbor counts separated by commas, e.g. `"2,3/3"`
//! for Conway's Life. A group may be empty (`"/2"` is Seeds).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Largest neighbor count a Moore neighborhood can produce.
pub const MAX_NEIGHBORS: u8 = 8;
/// Number of slots in the flat encoding: two states times nine counts.
pub const RULE_SLOTS: usize = 2 * (MAX_NEIGHBORS as usize + 1);

const GROUP_DELIMITER: char = '/';
const DIGIT_DELIMITER: char = ',';

const PRESETS: [(&str, &str); 4] = [
    ("life", "2,3/3"),
    ("highlife", "2,3/3,6"),
    ("seeds", "/2"),
    ("day-and-night", "3,4,6,7,8/3,6,7,8"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleGroup {
    Survival,
    Birth,
}

impl fmt::Display for RuleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Survival => f.write_str("survival"),
            Self::Birth => f.write_str("birth"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RuleParseError {
    #[error("expected `survival/birth`, found no `/` in {0:?}")]
    MissingDelimiter(String),
    #[error("expected exactly one `/` in {0:?}")]
    ExtraDelimiter(String),
    #[error("{group} group contains non-digit token {token:?}")]
    InvalidToken { group: RuleGroup, token: String },
    #[error("{group} group token {token:?} is not a single digit (separate digits with `,`)")]
    MultiDigit { group: RuleGroup, token: String },
    #[error("{group} group digit {digit} is outside 0..=8")]
    OutOfRange { group: RuleGroup, digit: u8 },
    #[error("{group} group lists {digit} more than once")]
    Duplicate { group: RuleGroup, digit: u8 },
}

/// Immutable (state, neighbor count) → next state lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleTable {
    survival: u16,
    birth: u16,
    table: [u8; RULE_SLOTS],
}

impl RuleTable {
    /// Parse a rule string such as `"2,3/3"`.
    pub fn build(text: &str) -> Result<Self, RuleParseError> {
        let mut groups = text.split(GROUP_DELIMITER);
        let survival = groups.next().unwrap_or_default();
        let Some(birth) = groups.next() else {
            return Err(RuleParseError::MissingDelimiter(text.to_owned()));
        };
        if groups.next().is_some() {
            return Err(RuleParseError::ExtraDelimiter(text.to_owned()));
        }

        let survival = parse_group(survival, RuleGroup::Survival)?;
        let birth = parse_group(birth, RuleGroup::Birth)?;
        Ok(Self::from_masks(survival, birth))
    }

    /// Conway's Life, `2,3/3`.
    pub fn life() -> Self {
        Self::from_masks(0b1100, 0b1000)
    }

    /// Resolve a preset name (`life`, `highlife`, `seeds`, `day-and-night`)
    /// or fall back to parsing `name` as a rule string.
    pub fn from_name_or_spec(name: &str) -> Result<Self, RuleParseError> {
        let lowered = name.trim().to_ascii_lowercase();
        match PRESETS.iter().find(|(preset, _)| *preset == lowered) {
            Some((_, text)) => Self::build(text),
            None => Self::build(name),
        }
    }

    fn from_masks(survival: u16, birth: u16) -> Self {
        let mut table = [0u8; RULE_SLOTS];
        for neighbors in 0..=MAX_NEIGHBORS {
            let n = neighbors as usize;
            table[n] = ((birth >> n) & 1) as u8;
            table[RULE_SLOTS / 2 + n] = ((survival >> n) & 1) as u8;
        }
        Self {
            survival,
            birth,
            table,
        }
    }

    /// Next state of a cell given its current state and live-neighbor count.
    #[inline(always)]
    pub fn next_state(&self, alive: bool, neighbors: u8) -> bool {
        if neighbors > MAX_NEIGHBORS {
            return false;
        }
        self.table[slot(alive, neighbors)] != 0
    }

    /// Flat encoding indexed by `state * 9 + neighbors`, as uploaded to devices.
    pub fn as_bytes(&self) -> &[u8; RULE_SLOTS] {
        &self.table
    }

    pub fn survival(&self) -> impl Iterator<Item = u8> + '_ {
        digits(self.survival)
    }

    pub fn birth(&self) -> impl Iterator<Item = u8> + '_ {
        digits(self.birth)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::life()
    }
}

impl FromStr for RuleTable {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::build(s)
    }
}

impl fmt::Display for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_group(f, self.survival)?;
        write!(f, "{GROUP_DELIMITER}")?;
        write_group(f, self.birth)
    }
}

/// Slot of `(alive, neighbors)` in the flat encoding.
#[inline(always)]
pub fn slot(alive: bool, neighbors: u8) -> usize {
    alive as usize * (RULE_SLOTS / 2) + neighbors as usize
}

fn parse_group(group: &str, kind: RuleGroup) -> Result<u16, RuleParseError> {
    let mut mask = 0u16;
    if group.is_empty() {
        return Ok(mask);
    }
    for token in group.split(DIGIT_DELIMITER) {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RuleParseError::InvalidToken {
                group: kind,
                token: token.to_owned(),
            });
        }
        if token.len() > 1 {
            return Err(RuleParseError::MultiDigit {
                group: kind,
                token: token.to_owned(),
            });
        }
        let digit = token.as_bytes()[0] - b'0';
        if digit > MAX_NEIGHBORS {
            return Err(RuleParseError::OutOfRange { group: kind, digit });
        }
        let bit = 1u16 << digit;
        if mask & bit != 0 {
            return Err(RuleParseError::Duplicate { group: kind, digit });
        }
        mask |= bit;
    }
    Ok(mask)
}

fn digits(mask: u16) -> impl Iterator<Item = u8> {
    (0..=MAX_NEIGHBORS).filter(move |d| (mask >> d) & 1 != 0)
}

fn write_group(f: &mut fmt::Formatter<'_>, mask: u16) -> fmt::Result {
    for (i, digit) in digits(mask).enumerate() {
        if i > 0 {
            write!(f, "{DIGIT_DELIMITER}")?;
        }
        write!(f, "{digit}")?;
    }
    Ok(())
}
