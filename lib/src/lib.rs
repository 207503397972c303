/*! A regular expression engine with bounded state, for scanning large
binary corpora.

Patterns go through four stages. The [`parse`] function turns the text of
a pattern into a tree of [`Node`]s. The [`canonicalize`] function resolves
every character class in the tree and interns it in a [`CharClassTable`],
so that all the places that accept the same characters share a single
[`ClassId`]. The [`compile`] function lowers the tree into a [`Program`]
whose number of distinct classes can't exceed [`VM_MAX_STATE_SIZE`]. Finally,
[`run`] and [`scan`] execute the program over some input.

Executions can be given a step budget. When the budget is exhausted the
execution is suspended and its whole state is left in a [`ScanCursor`] that
can be serialized, and later used for resuming the scan exactly where it
stopped.

For most uses the [`Regex`] type, which runs the whole pipeline at once, is
more convenient.

# Example

```rust
# use sectorex::{Flag, Flags, Regex};
let re = Regex::new(r"a[bc]+", Flags::none()).unwrap();
let m = re.search(b"abbc d").unwrap();

assert_eq!(m.span(), (0, 4));

// With the SECTOR flag matches are anchored at every `stride` bytes.
let re = sectorex::RegexBuilder::new("MZ")
    .flags(Flags::none().with(Flag::Sector))
    .sector(4, 0)
    .build()
    .unwrap();

let spans: Vec<_> =
    re.find_iter(b"MZ..xMZ.MZ..").map(|m| m.span()).collect();

assert_eq!(spans, vec![(0, 2), (8, 10)]);
```
*/

pub use config::load_config_from_file;
pub use config::ScanConfig;
pub use config::SectorConfig;
pub use config::UnknownFlag;

pub use errors::CompileError;
pub use errors::Error;
pub use errors::RuntimeError;
pub use errors::ScanError;
pub use errors::SerializationError;
pub use errors::SyntaxError;

pub use flags::Flag;
pub use flags::Flags;

pub use re::ast::Node;
pub use re::class::CharClass;
pub use re::class::CharClassTable;
pub use re::class::ClassId;
pub use re::thompson::Instr;
pub use re::thompson::Program;
pub use re::thompson::Snapshot;
pub use re::unicode::PropertyLookup;
pub use re::{
    MAX_REPEAT, MAX_UNROLL, VM_MAX_COUNTERS, VM_MAX_GROUPS,
    VM_MAX_PROGRAM_SIZE, VM_MAX_STATE_SIZE,
};

pub use regex::Regex;
pub use regex::RegexBuilder;

pub use scanner::run;
pub use scanner::scan;
pub use scanner::Match;
pub use scanner::MatchResult;
pub use scanner::Mode;
pub use scanner::Run;
pub use scanner::ScanCursor;
pub use scanner::ScanStep;
pub use scanner::Scanner;
pub use scanner::Sector;

mod config;
mod errors;
mod flags;
mod regex;
mod scanner;

pub mod re;

#[cfg(test)]
mod tests;

use re::canon::Canonicalizer;
use re::parser::Parser;
use re::thompson::Compiler;

/// Parses a pattern into a tree rooted at a [`Node::Root`].
///
/// Unicode properties are resolved with the built-in tables, use
/// [`re::parser::Parser`] for supplying different ones.
pub fn parse(pattern: &str, flags: Flags) -> Result<Node, SyntaxError> {
    Parser::new().flags(flags).parse(pattern)
}

/// Replaces every class in the tree with a reference into a
/// [`CharClassTable`], which is returned together with the new tree.
pub fn canonicalize(root: Node) -> (Node, CharClassTable) {
    Canonicalizer::new().canonicalize(root)
}

/// Compiles a canonicalized tree into a [`Program`].
///
/// Returns [`CompileError::StateOverflow`] if the program references more
/// than [`VM_MAX_STATE_SIZE`] distinct classes.
pub fn compile(
    root: Node,
    classes: CharClassTable,
) -> Result<Program, CompileError> {
    Compiler::new().compile(root, classes)
}
