/*! This module implements the scanner.

The scanner takes a [`Program`] produced by the compiler and looks for
matches in some input, driving the [`PikeVM`] from one candidate position to
the next. The whole state of a scan lives in a [`ScanCursor`], which makes
scans resumable: a scan can be suspended after some number of steps, the
cursor can be serialized, and the scan continued later, possibly in a
different process.
*/
use std::cmp;

#[cfg(feature = "logging")]
use log::*;

use crate::errors::{RuntimeError, ScanError};
use crate::flags::Flag;
use crate::re::thompson::{PikeVM, Program};

pub use crate::scanner::cursor::{Mode, ScanCursor, Sector};
pub use crate::scanner::matches::{Match, MatchResult};

mod cursor;
mod matches;

#[cfg(test)]
mod tests;

/// Result of a single [`run`].
#[derive(Debug)]
pub struct Run {
    /// The match found, or the reason why no match was produced.
    pub result: MatchResult,
    /// Number of VM steps executed.
    pub steps: usize,
    /// Non-fatal errors found while executing the program.
    pub diagnostics: Vec<RuntimeError>,
    /// Execution trace, produced only when the program was compiled with
    /// [`Flag::XTrace`] or [`Flag::XTraceVerbose`].
    pub trace: Option<String>,
}

/// Looks for the next match of `program` in `input`, starting at the state
/// stored in `cursor` and updating it.
///
/// If `budget` is `Some(n)` the VM executes at most `n` steps (at least one)
/// and returns [`MatchResult::Suspended`] if it couldn't reach a result
/// within that budget. Calling `run` again with the same cursor resumes
/// the execution where it stopped.
///
/// Returns [`ScanError::ProgramMismatch`] if the cursor was created for a
/// different program, and [`ScanError::CorruptedCursor`] if the state of
/// the suspended VM can't be executed by the program.
pub fn run(
    program: &Program,
    cursor: &mut ScanCursor,
    input: &[u8],
    budget: Option<usize>,
) -> Result<Run, ScanError> {
    check_program(program, cursor)?;
    Ok(run_unchecked(program, cursor, input, budget))
}

pub(crate) fn run_unchecked(
    program: &Program,
    cursor: &mut ScanCursor,
    input: &[u8],
    budget: Option<usize>,
) -> Run {
    let mut vm = PikeVM::new(program);
    let budget = budget.map(|b| cmp::max(b, 1));
    let result = cursor.advance(&mut vm, input, budget);

    Run {
        result,
        steps: vm.steps(),
        diagnostics: vm.take_diagnostics(),
        trace: vm.take_trace(),
    }
}

fn check_program(
    program: &Program,
    cursor: &ScanCursor,
) -> Result<(), ScanError> {
    if cursor.program_id() != program.id() {
        #[cfg(feature = "logging")]
        warn!(
            "cursor for program {:#018x} used with program {:#018x}",
            cursor.program_id(),
            program.id()
        );
        return Err(ScanError::ProgramMismatch {
            expected: program.id(),
            found: cursor.program_id(),
        });
    }
    if !cursor.fits(program) {
        #[cfg(feature = "logging")]
        warn!("corrupted cursor for program {:#018x}", program.id());
        return Err(ScanError::CorruptedCursor { program: program.id() });
    }
    Ok(())
}

/// Starts a scan of `input`.
///
/// If the program was compiled with [`Flag::Sector`], every position
/// `offset + k * stride` is tried as the start of a match. Otherwise the
/// scan is a search for non-overlapping matches that starts at `offset`,
/// and `stride` is only checked to be valid.
///
/// Returns [`ScanError::InvalidSector`] if `stride` is zero.
pub fn scan<'a>(
    program: &'a Program,
    input: &'a [u8],
    stride: usize,
    offset: usize,
) -> Result<Scanner<'a>, ScanError> {
    let cursor = if program.flags().contains(Flag::Sector) {
        ScanCursor::new(program, Sector::new(stride, offset))?
    } else if stride == 0 {
        return Err(ScanError::InvalidSector);
    } else {
        ScanCursor::for_search(program, offset)
    };

    Scanner::new(program, input, cursor)
}

/// Outcome of [`Scanner::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// A new match was found.
    Match(Match),
    /// The step budget was exhausted, call [`Scanner::advance`] again for
    /// continuing.
    Suspended,
    /// There are no more matches.
    Finished,
}

/// A lazy sequence of matches.
///
/// The scanner owns a [`ScanCursor`] and nothing else that depends on
/// the progress of the scan, so a scanner can be dropped at any point and
/// recreated later with [`Scanner::new`] from its cursor.
///
/// As an [`Iterator`], the scanner yields every remaining match and
/// continues transparently through suspensions.
pub struct Scanner<'a> {
    program: &'a Program,
    input: &'a [u8],
    cursor: ScanCursor,
    budget: Option<usize>,
    diagnostics: Vec<RuntimeError>,
    trace: Option<String>,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner that continues the scan described by `cursor`.
    pub fn new(
        program: &'a Program,
        input: &'a [u8],
        cursor: ScanCursor,
    ) -> Result<Self, ScanError> {
        check_program(program, &cursor)?;
        Ok(Self::from_cursor(program, input, cursor))
    }

    pub(crate) fn from_cursor(
        program: &'a Program,
        input: &'a [u8],
        cursor: ScanCursor,
    ) -> Self {
        Self {
            program,
            input,
            cursor,
            budget: None,
            diagnostics: Vec::new(),
            trace: None,
        }
    }

    /// Sets the maximum number of VM steps executed by each call to
    /// [`Scanner::advance`].
    pub fn budget(mut self, budget: Option<usize>) -> Self {
        self.budget = budget;
        self
    }

    /// Looks for the next match.
    pub fn advance(&mut self) -> ScanStep {
        let run = run_unchecked(
            self.program,
            &mut self.cursor,
            self.input,
            self.budget,
        );

        self.diagnostics.extend(run.diagnostics);

        if let Some(trace) = run.trace {
            self.trace.get_or_insert_with(String::new).push_str(&trace);
        }

        match run.result {
            MatchResult::Matched(m) => ScanStep::Match(m),
            MatchResult::Suspended(_) => ScanStep::Suspended,
            MatchResult::NoMatch => ScanStep::Finished,
        }
    }

    /// The cursor with the current state of the scan.
    #[inline]
    pub fn cursor(&self) -> &ScanCursor {
        &self.cursor
    }

    /// Consumes the scanner and returns its cursor.
    #[inline]
    pub fn into_cursor(self) -> ScanCursor {
        self.cursor
    }

    /// Non-fatal errors found so far.
    #[inline]
    pub fn diagnostics(&self) -> &[RuntimeError] {
        self.diagnostics.as_slice()
    }

    /// Execution trace accumulated so far, if tracing is enabled.
    #[inline]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

impl Iterator for Scanner<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.advance() {
                ScanStep::Match(m) => return Some(m),
                ScanStep::Suspended => continue,
                ScanStep::Finished => return None,
            }
        }
    }
}
