/*! This module parses, canonicalizes, compiles and executes regular
expressions.

The pipeline has four stages:

* The [parser][`parser::Parser`] turns the text of a pattern into a tree of
  [`ast::Node`]s.
* The [canonicalizer][`canon::Canonicalizer`] resolves every character class
  in the tree into a set of code points and interns it in a
  [`class::CharClassTable`], so that classes that accept the same characters
  share a single id.
* The [compiler][`thompson::Compiler`] lowers the tree into a
  [`thompson::Program`] for a Pike VM, following the
  [Thompson's construction][1] algorithm. The number of distinct classes
  referenced by a program is capped at [`VM_MAX_STATE_SIZE`], which keeps
  the automaton bounded no matter how long the pattern is.
* The [Pike VM][`thompson::PikeVM`], described in
  [Regular Expression Matching: the Virtual Machine Approach][2], runs the
  program over the input in lock-step, one input unit at a time.

[1]: https://en.wikipedia.org/wiki/Thompson%27s_construction
[2]: https://swtch.com/~rsc/regexp/regexp2.html
*/

pub mod ast;
pub(crate) mod bitmapset;
pub mod canon;
pub mod class;
pub mod parser;
pub mod thompson;
pub mod unicode;

/// Maximum number of distinct character classes referenced by a program.
pub const VM_MAX_STATE_SIZE: usize = 16384;

/// Maximum number of instructions in a program.
pub const VM_MAX_PROGRAM_SIZE: usize = 524288;

/// Maximum number of nested counted repetitions.
pub const VM_MAX_COUNTERS: usize = 4;

/// Maximum number of capturing groups in a pattern.
pub const VM_MAX_GROUPS: usize = 32;

/// Repetition counts above this value are clamped.
pub const MAX_REPEAT: u32 = 65534;

/// Repetitions with bounds up to this value are unrolled, larger ones use
/// a counter.
pub const MAX_UNROLL: u32 = 64;

/// Maximum nesting level of groups and classes.
pub const MAX_NESTING: usize = 250;
