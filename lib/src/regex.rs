use std::ops::Range;

#[cfg(feature = "logging")]
use log::*;
use rustc_hash::FxHashMap;

use crate::config::{ScanConfig, UnknownFlag};
use crate::errors::{Error, ScanError};
use crate::flags::{Flag, Flags};
use crate::re::canon::Canonicalizer;
use crate::re::parser::Parser;
use crate::re::thompson::{Compiler, Program};
use crate::re::unicode::{PropertyLookup, UnicodeTables};
use crate::scanner::{
    run_unchecked, Match, Mode, ScanCursor, Scanner, Sector,
};

/// Builds a [`Regex`].
///
/// # Example
///
/// ```rust
/// # use sectorex::{Flag, Flags, RegexBuilder};
/// let re = RegexBuilder::new(r"(?P<word>\w+)")
///     .flags(Flags::none().with(Flag::IgnoreCase))
///     .build()
///     .unwrap();
///
/// assert_eq!(re.group_index("word"), Some(1));
/// ```
pub struct RegexBuilder<'a> {
    pattern: &'a str,
    flags: Flags,
    sector: Sector,
    budget: Option<usize>,
    lookup: &'a dyn PropertyLookup,
}

impl<'a> RegexBuilder<'a> {
    /// Creates a builder for `pattern`, with no flags and a sector that
    /// tries every byte offset.
    pub fn new(pattern: &'a str) -> Self {
        Self {
            pattern,
            flags: Flags::none(),
            sector: Sector::new(1, 0),
            budget: None,
            lookup: &UnicodeTables,
        }
    }

    /// Takes the flags, the sector and the budget from `config`.
    ///
    /// Fails if the configuration names an unknown flag.
    pub fn config(self, config: &ScanConfig) -> Result<Self, UnknownFlag> {
        let sector = config.sector();
        Ok(self
            .flags(config.flags()?)
            .sector(sector.stride, sector.offset)
            .end_anchor(sector.end_anchor)
            .budget(config.budget))
    }

    /// Flags used for parsing, compiling and running the pattern.
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Stride and first offset used by [`Regex::find_iter`] when the
    /// `SECTOR` flag is set. Without that flag `offset` is where searches
    /// start.
    pub fn sector(mut self, stride: usize, offset: usize) -> Self {
        self.sector.stride = stride;
        self.sector.offset = offset;
        self
    }

    /// First offset that is not tried as an anchor in sector scans.
    pub fn end_anchor(mut self, end_anchor: Option<usize>) -> Self {
        self.sector.end_anchor = end_anchor;
        self
    }

    /// Maximum number of VM steps executed by each call to
    /// [`Scanner::advance`] in scanners returned by [`Regex::find_iter`].
    pub fn budget(mut self, budget: Option<usize>) -> Self {
        self.budget = budget;
        self
    }

    /// Uses `lookup` for resolving `\p{...}` properties.
    pub fn lookup(mut self, lookup: &'a dyn PropertyLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Parses, canonicalizes and compiles the pattern.
    pub fn build(self) -> Result<Regex, Error> {
        if self.sector.stride == 0 {
            return Err(ScanError::InvalidSector.into());
        }

        let root = Parser::new()
            .flags(self.flags)
            .lookup(self.lookup)
            .parse(self.pattern)?;

        let parse_dump =
            self.flags.contains(Flag::XDumpParse).then(|| root.dump());

        let (root, classes) =
            Canonicalizer::new().lookup(self.lookup).canonicalize(root);

        let program = Compiler::new().compile(root, classes)?;

        #[cfg(feature = "logging")]
        debug!(
            "regex {:?} compiled into program {:#018x}",
            self.pattern,
            program.id()
        );

        Ok(Regex {
            pattern: self.pattern.to_string(),
            program,
            sector: self.sector,
            budget: self.budget,
            parse_dump,
        })
    }
}

/// A compiled pattern.
///
/// Wraps a [`Program`] together with the source of the pattern and the
/// sector used for scanning.
#[derive(Clone, Debug)]
pub struct Regex {
    pattern: String,
    program: Program,
    sector: Sector,
    budget: Option<usize>,
    parse_dump: Option<String>,
}

impl Regex {
    /// Compiles `pattern` with the given flags.
    pub fn new(pattern: &str, flags: Flags) -> Result<Self, Error> {
        RegexBuilder::new(pattern).flags(flags).build()
    }

    /// Source of the pattern.
    #[inline]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Flags the pattern was compiled with.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.program.flags()
    }

    /// The compiled program.
    #[inline]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Finds the leftmost match in `input`.
    pub fn search(&self, input: &[u8]) -> Option<Match> {
        self.search_at(input, 0, input.len())
    }

    /// Finds the leftmost match that starts at or after `pos` and ends at
    /// or before `endpos`.
    ///
    /// The input before `pos` is still visible to assertions like `\b`
    /// and `^`, the input after `endpos` is not.
    pub fn search_at(
        &self,
        input: &[u8],
        pos: usize,
        endpos: usize,
    ) -> Option<Match> {
        let input = &input[..endpos.min(input.len())];
        let mut cursor = ScanCursor::for_search(&self.program, pos);
        run_unchecked(&self.program, &mut cursor, input, None)
            .result
            .into_match()
    }

    /// Returns the match that starts exactly at `pos`, if any.
    pub fn match_at(&self, input: &[u8], pos: usize) -> Option<Match> {
        let mut cursor = ScanCursor::anchored(&self.program, pos);
        run_unchecked(&self.program, &mut cursor, input, None)
            .result
            .into_match()
    }

    /// Returns true if the pattern matches somewhere in `input`.
    #[inline]
    pub fn is_match(&self, input: &[u8]) -> bool {
        self.search(input).is_some()
    }

    /// Returns an iterator over the matches in `input`.
    ///
    /// With `SECTOR` the iterator yields the anchored matches at every
    /// anchor of the sector, otherwise it yields non-overlapping matches.
    /// The scanner uses the budget set with [`RegexBuilder::budget`].
    pub fn find_iter<'a>(&'a self, input: &'a [u8]) -> Scanner<'a> {
        let cursor = if self.program.flags().contains(Flag::Sector) {
            ScanCursor::with_mode(
                &self.program,
                Mode::Sector(self.sector),
                self.sector.offset,
            )
        } else {
            ScanCursor::for_search(&self.program, self.sector.offset)
        };

        Scanner::from_cursor(&self.program, input, cursor).budget(self.budget)
    }

    /// Returns all the matches yielded by [`Regex::find_iter`].
    pub fn find_all(&self, input: &[u8]) -> Vec<Match> {
        self.find_iter(input).collect()
    }

    /// Names of the capturing groups, starting at group 1. Unnamed groups
    /// are `None`.
    pub fn capture_names(&self) -> impl Iterator<Item = Option<&str>> {
        self.program.group_names()
    }

    /// Number of capturing groups.
    #[inline]
    pub fn groups(&self) -> usize {
        self.program.groups()
    }

    /// Returns the number of the group with the given name.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.program.group_index(name)
    }

    /// Name of the last group closed by `m`, if that group has a name.
    pub fn last_group(&self, m: &Match) -> Option<&str> {
        self.program.group_names().nth(m.last_index()?.checked_sub(1)?)?
    }

    /// Ranges of the named groups in `m`, by name. Groups that didn't
    /// participate in the match are `None`.
    pub fn named_groups(
        &self,
        m: &Match,
    ) -> FxHashMap<&str, Option<Range<usize>>> {
        self.program
            .group_names()
            .enumerate()
            .filter_map(|(i, name)| Some((name?, m.group(i + 1))))
            .collect()
    }

    /// Source text of the alternative that produced `m`.
    ///
    /// Only available for patterns compiled with `INDEXALT` whose top
    /// level is an alternation.
    pub fn keypattern(&self, m: &Match) -> Option<&str> {
        let span: &Range<usize> = self.program.keys().get(m.alternative()?)?;
        self.pattern.get(span.clone())
    }

    /// Dump of the tree produced by the parser, before classes are
    /// canonicalized. Produced only with `XDUMPPARSE`.
    #[inline]
    pub fn parse_dump(&self) -> Option<&str> {
        self.parse_dump.as_deref()
    }

    /// Program listing, produced only with `XDUMPPROG`.
    #[inline]
    pub fn program_dump(&self) -> Option<&str> {
        self.program.dump()
    }
}
