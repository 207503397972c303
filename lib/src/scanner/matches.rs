use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::re::thompson::Snapshot;

/// Represents a match of a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    /// Range within the scanned data where the match was found.
    pub(crate) range: Range<usize>,
    /// Ranges of the capturing groups. The item at index `i` corresponds to
    /// group `i + 1`, it is `None` if the group didn't participate.
    pub(crate) groups: Vec<Option<Range<usize>>>,
    /// Alternative of the indexed alternation that produced the match.
    pub(crate) alternative: Option<u16>,
    /// Last group that was closed while matching.
    pub(crate) last_group: Option<u16>,
}

impl Match {
    /// Offset where the match starts.
    #[inline]
    pub fn start(&self) -> usize {
        self.range.start
    }

    /// Offset where the match ends, exclusive.
    #[inline]
    pub fn end(&self) -> usize {
        self.range.end
    }

    /// Range of the match.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The `(start, end)` pair of the match.
    #[inline]
    pub fn span(&self) -> (usize, usize) {
        (self.range.start, self.range.end)
    }

    /// Returns true if the match is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Range of group `i`. Group 0 is the whole match.
    pub fn group(&self, i: usize) -> Option<Range<usize>> {
        match i {
            0 => Some(self.range()),
            i => self.groups.get(i - 1).cloned().flatten(),
        }
    }

    /// Ranges of the capturing groups, starting at group 1.
    pub fn groups(&self) -> &[Option<Range<usize>>] {
        self.groups.as_slice()
    }

    /// `(group, range)` pairs for the groups that participated in the
    /// match, including the whole match as group 0.
    pub fn captures(&self) -> Vec<(usize, Range<usize>)> {
        let mut captures = vec![(0, self.range())];
        for (i, group) in self.groups.iter().enumerate() {
            if let Some(range) = group {
                captures.push((i + 1, range.clone()));
            }
        }
        captures
    }

    /// Number of the last group closed while matching.
    ///
    /// Enclosing groups close after the groups they contain, so for
    /// `(a)(b(c))` this is 2, not 3.
    #[inline]
    pub fn last_index(&self) -> Option<usize> {
        self.last_group.map(|g| g as usize)
    }

    /// Alternative of the indexed alternation that produced the match, for
    /// programs compiled with `INDEXALT`.
    #[inline]
    pub fn alternative(&self) -> Option<usize> {
        self.alternative.map(|alt| alt as usize)
    }
}

/// Outcome of a single [`crate::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// A match was found.
    Matched(Match),
    /// There are no more matches.
    NoMatch,
    /// The step budget was exhausted. The snapshot is also stored in the
    /// cursor, calling `run` again resumes from it.
    Suspended(Snapshot),
}

impl MatchResult {
    /// Returns the match, if any.
    pub fn into_match(self) -> Option<Match> {
        match self {
            MatchResult::Matched(m) => Some(m),
            _ => None,
        }
    }

    /// Returns true if the result is [`MatchResult::Suspended`].
    pub fn is_suspended(&self) -> bool {
        matches!(self, MatchResult::Suspended(_))
    }
}
