/*!
This module defines the instructions executed by the Pike VM, along with the
[`InstrSeq`] type that helps the compiler in building instruction sequences.

Instruction set
---------------

A program is a vector of [`Instr`] values. The address of an instruction is
its index in the vector. Instructions that transfer control to some other
place in the program carry an [`Offset`] relative to their own address, so
a sequence of instructions can be moved around without patching it.

Most instructions in a typical program are `MATCH_CLASS`, which consume one
input unit if it belongs to a character class and then continue at the next
instruction. Every other instruction is an epsilon transition: it is
executed while computing the epsilon closure of a thread and doesn't
consume any input.

For instance, `/a[bc]+/` is compiled into:

```text
00000: MATCH_CLASS #0
00001: MATCH_CLASS #1
00002: SPLIT 00001 00003
00003: ACCEPT
```

Counted repetitions
-------------------

Repetitions with large bounds are not unrolled. Instead, the body of the
repetition is followed by a `REPEAT` instruction that works with one of the
counters carried by each thread. When a thread executes `REPEAT` the counter
is incremented. The thread can leave the loop if the count reached the
lower bound, and can go back to the start of the body if the count is below
the upper bound. Leaving the loop resets the counter to zero, so the counter
is ready for the next time the loop is entered.
 */

use std::fmt::{Display, Formatter};

use crate::re::class::ClassId;

/// Offset for jump, split and repeat instructions. The offset is always
/// relative to the address of the instruction.
pub type Offset = i32;

/// Index of a repetition counter within a thread.
pub type Counter = u8;

/// Instructions supported by the Pike VM.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    /// Consumes one input unit if it belongs to the class.
    MatchClass(ClassId),

    /// Continues at every offset, in priority order. The first offset has
    /// the highest priority.
    Split(Vec<Offset>),

    /// Continues at the given offset.
    Jump(Offset),

    /// Closes one iteration of a counted repetition. `body` is the offset
    /// of the first instruction in the repetition body.
    Repeat {
        counter: Counter,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        body: Offset,
    },

    /// A match for the regexp has been found.
    Accept,

    /// Records the start of a capturing group.
    GroupOpen(u16),

    /// Records the end of a capturing group.
    GroupClose(u16),

    /// Matches at the start of the input, or after a line terminator if
    /// `multiline` is true.
    AnchorStart { multiline: bool },

    /// Matches at the end of the input, or before a line terminator if
    /// `multiline` is true.
    AnchorEnd { multiline: bool },

    /// Matches at a word boundary.
    WordBoundary,

    /// Matches anywhere except at a word boundary.
    WordBoundaryNeg,

    /// Records that the thread took the given alternative of the indexed
    /// alternation.
    MarkAlternative(u16),
}

impl Instr {
    /// Returns true if the instruction doesn't consume input.
    #[inline]
    pub fn is_epsilon(&self) -> bool {
        !matches!(self, Instr::MatchClass(_) | Instr::Accept)
    }
}

/// Returns the address that results from applying `offset` to `addr`.
#[inline]
pub(crate) fn apply_offset(addr: usize, offset: Offset) -> usize {
    (addr as isize + offset as isize) as usize
}

/// A sequence of instructions for the Pike VM.
///
/// Besides being a buffer for instructions, it provides functions for
/// getting the location where the next instruction will be added, and for
/// setting the offsets of jumps and splits once their targets are known.
#[derive(Debug, Default)]
pub(crate) struct InstrSeq {
    seq: Vec<Instr>,
}

impl InstrSeq {
    /// Creates a new empty sequence.
    pub fn new() -> Self {
        Self { seq: Vec::new() }
    }

    /// Consumes the [`InstrSeq`] and returns the instructions.
    pub fn into_inner(self) -> Vec<Instr> {
        self.seq
    }

    /// Returns the location where the next instruction will be put.
    #[inline]
    pub fn location(&self) -> usize {
        self.seq.len()
    }

    /// Adds an instruction at the end of the sequence and returns its
    /// location.
    pub fn emit_instr(&mut self, instr: Instr) -> usize {
        let location = self.location();
        self.seq.push(instr);
        location
    }

    /// Sets the target of the jump at `location`.
    ///
    /// # Panics
    ///
    /// If the instruction at `location` is not [`Instr::Jump`].
    pub fn patch_jump(&mut self, location: usize, target: usize) {
        match &mut self.seq[location] {
            Instr::Jump(offset) => *offset = relative(location, target),
            _ => unreachable!(),
        }
    }

    /// Sets the targets of the split at `location`, in priority order.
    ///
    /// # Panics
    ///
    /// If the instruction at `location` is not [`Instr::Split`].
    pub fn patch_split<I>(&mut self, location: usize, targets: I)
    where
        I: IntoIterator<Item = usize>,
    {
        match &mut self.seq[location] {
            Instr::Split(offsets) => {
                *offsets = targets
                    .into_iter()
                    .map(|target| relative(location, target))
                    .collect();
            }
            _ => unreachable!(),
        }
    }
}

pub(crate) fn relative(location: usize, target: usize) -> Offset {
    (target as isize - location as isize) as Offset
}

/// Renders a program one instruction per line. Targets are printed as
/// absolute addresses.
pub(crate) struct Listing<'a>(pub &'a [Instr]);

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;

        for (addr, instr) in self.0.iter().enumerate() {
            match instr {
                Instr::MatchClass(class) => {
                    writeln!(f, "{:05x}: MATCH_CLASS {}", addr, class)?;
                }
                Instr::Split(offsets) => {
                    write!(f, "{:05x}: SPLIT", addr)?;
                    for offset in offsets {
                        write!(f, " {:05x}", apply_offset(addr, *offset))?;
                    }
                    writeln!(f)?;
                }
                Instr::Jump(offset) => {
                    writeln!(
                        f,
                        "{:05x}: JUMP {:05x}",
                        addr,
                        apply_offset(addr, *offset)
                    )?;
                }
                Instr::Repeat { counter, min, max, greedy, body } => {
                    let max = match max {
                        Some(max) => max.to_string(),
                        None => "inf".to_string(),
                    };
                    writeln!(
                        f,
                        "{:05x}: {} c{} {}-{} {:05x}",
                        addr,
                        if *greedy { "REPEAT_GREEDY" } else { "REPEAT_LAZY" },
                        counter,
                        min,
                        max,
                        apply_offset(addr, *body)
                    )?;
                }
                Instr::Accept => {
                    writeln!(f, "{:05x}: ACCEPT", addr)?;
                }
                Instr::GroupOpen(group) => {
                    writeln!(f, "{:05x}: GROUP_OPEN {}", addr, group)?;
                }
                Instr::GroupClose(group) => {
                    writeln!(f, "{:05x}: GROUP_CLOSE {}", addr, group)?;
                }
                Instr::AnchorStart { multiline: false } => {
                    writeln!(f, "{:05x}: START", addr)?;
                }
                Instr::AnchorStart { multiline: true } => {
                    writeln!(f, "{:05x}: LINE_START", addr)?;
                }
                Instr::AnchorEnd { multiline: false } => {
                    writeln!(f, "{:05x}: END", addr)?;
                }
                Instr::AnchorEnd { multiline: true } => {
                    writeln!(f, "{:05x}: LINE_END", addr)?;
                }
                Instr::WordBoundary => {
                    writeln!(f, "{:05x}: WORD_BOUNDARY", addr)?;
                }
                Instr::WordBoundaryNeg => {
                    writeln!(f, "{:05x}: WORD_BOUNDARY_NEG", addr)?;
                }
                Instr::MarkAlternative(alt) => {
                    writeln!(f, "{:05x}: ALTERNATIVE {}", addr, alt)?;
                }
            }
        }

        Ok(())
    }
}
