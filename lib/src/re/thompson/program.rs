use std::ops::Range;

use crate::flags::Flags;
use crate::re::ast::Node;
use crate::re::class::{CharClass, CharClassTable, ClassId};
use crate::re::thompson::instr::{Instr, Listing};

/// Ids of the auxiliary classes used for evaluating assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AuxClasses {
    pub line: ClassId,
    pub word: ClassId,
}

/// A compiled regular expression.
///
/// Programs are immutable. The instructions, the class table and the flags
/// are fixed at compile time, so a single program can be shared by any
/// number of scanners, in any number of threads.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) code: Vec<Instr>,
    pub(crate) classes: CharClassTable,
    pub(crate) states: Vec<ClassId>,
    pub(crate) flags: Flags,
    pub(crate) group_names: Vec<Option<String>>,
    pub(crate) counters: usize,
    pub(crate) aux: Option<AuxClasses>,
    pub(crate) keys: Vec<Range<usize>>,
    pub(crate) tree: Node,
    pub(crate) id: u64,
    pub(crate) dump: Option<String>,
}

impl Program {
    /// Instructions in the program.
    #[inline]
    pub fn code(&self) -> &[Instr] {
        self.code.as_slice()
    }

    /// Table with the classes referenced by the program.
    #[inline]
    pub fn classes(&self) -> &CharClassTable {
        &self.classes
    }

    /// Returns the class with the given id.
    #[inline]
    pub fn class(&self, id: ClassId) -> &CharClass {
        self.classes.get(id)
    }

    /// Flags the program was compiled with.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// A 64-bit hash that identifies the program.
    ///
    /// The hash covers the instructions, the classes and every flag that
    /// affects matching. Two compilations of the same pattern with the same
    /// flags produce the same id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of states, which is the number of distinct classes referenced
    /// by `MATCH_CLASS` instructions.
    #[inline]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Returns the class assigned to a state slot.
    pub fn state_class(&self, state: usize) -> Option<ClassId> {
        self.states.get(state).copied()
    }

    /// Number of capturing groups, not including the whole match.
    #[inline]
    pub fn groups(&self) -> usize {
        self.group_names.len()
    }

    /// Names of the capturing groups, in group order.
    pub fn group_names(&self) -> impl Iterator<Item = Option<&str>> {
        self.group_names.iter().map(|name| name.as_deref())
    }

    /// Returns the number of the group with the given name.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.group_names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|i| i + 1)
    }

    /// Number of repetition counters used by each thread.
    #[inline]
    pub fn counters(&self) -> usize {
        self.counters
    }

    /// Source spans of the alternatives of the indexed alternation.
    #[inline]
    pub fn keys(&self) -> &[Range<usize>] {
        self.keys.as_slice()
    }

    /// The compiled tree, where every class is a [`Node::Compiled`].
    #[inline]
    pub fn tree(&self) -> &Node {
        &self.tree
    }

    /// Program listing, if the program was compiled with `XDUMPPROG`.
    pub fn dump(&self) -> Option<&str> {
        self.dump.as_deref()
    }

    /// Renders the program listing, regardless of flags.
    pub fn listing(&self) -> String {
        Listing(self.code.as_slice()).to_string()
    }

    #[inline]
    pub(crate) fn is_line_terminator(&self, unit: Option<u32>) -> bool {
        match (unit, self.aux) {
            (Some(unit), Some(aux)) => {
                self.classes.get(aux.line).contains(unit)
            }
            _ => false,
        }
    }

    #[inline]
    pub(crate) fn is_word(&self, unit: Option<u32>) -> bool {
        match (unit, self.aux) {
            (Some(unit), Some(aux)) => {
                self.classes.get(aux.word).contains(unit)
            }
            _ => false,
        }
    }
}
