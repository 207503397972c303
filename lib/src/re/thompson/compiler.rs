/*!
This module provides a compiler that takes a canonicalized tree and produces
a [`Program`] for the Pike VM.

Compilation happens in two passes. The first one replaces every class node
with a [`Node::Compiled`] node and assigns a state slot to each distinct
class, which is when the state budget is enforced. The second one walks the
tree and emits the instructions.
*/

use std::cmp;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

#[cfg(feature = "logging")]
use log::*;

use crate::errors::CompileError;
use crate::flags::{Flag, Flags};
use crate::re::ast::{Assertion, Capture, Node};
use crate::re::class::{CharClassTable, ClassId};
use crate::re::thompson::instr::{relative, Counter, Instr, InstrSeq, Listing};
use crate::re::thompson::program::{AuxClasses, Program};
use crate::re::{
    MAX_UNROLL, VM_MAX_COUNTERS, VM_MAX_PROGRAM_SIZE, VM_MAX_STATE_SIZE,
};

/// Compiles a canonicalized tree into a [`Program`].
pub struct Compiler {
    code: InstrSeq,
    /// Maps each class to its state slot.
    states: FxHashMap<ClassId, u32>,
    /// Classes in state order.
    state_classes: Vec<ClassId>,
    group_names: Vec<Option<String>>,
    flags: Flags,
    /// Number of counted repetitions enclosing the node being emitted.
    depth: usize,
    /// Maximum number of counters used at the same time.
    counters: usize,
    /// Maximum number of instructions.
    size_limit: usize,
    /// Maximum number of states.
    state_limit: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a new compiler.
    pub fn new() -> Self {
        Self {
            code: InstrSeq::new(),
            states: FxHashMap::default(),
            state_classes: Vec::new(),
            group_names: Vec::new(),
            flags: Flags::none(),
            depth: 0,
            counters: 0,
            size_limit: VM_MAX_PROGRAM_SIZE,
            state_limit: VM_MAX_STATE_SIZE,
        }
    }

    /// Maximum number of instructions in the program.
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = limit;
        self
    }

    /// Compiles the tree rooted at `root`, whose classes are in `classes`.
    ///
    /// Flags are taken from the root node. Fails if the tree contains class
    /// nodes that were not canonicalized, if it needs more than
    /// [`VM_MAX_STATE_SIZE`] states, or if the program is too large.
    pub fn compile(
        mut self,
        root: Node,
        classes: CharClassTable,
    ) -> Result<Program, CompileError> {
        let (children, flags, keys, aux) = match root {
            Node::Root { children, flags, keys, aux } => {
                (children, flags, keys, aux)
            }
            node => (vec![node], Flags::none(), Vec::new(), None),
        };

        self.flags = flags;

        let children = children
            .into_iter()
            .map(|node| self.lower(node, &classes))
            .collect::<Result<Vec<_>, _>>()?;

        if self.state_classes.len() > self.state_limit {
            return Err(CompileError::StateOverflow {
                count: self.state_classes.len(),
                limit: self.state_limit,
            });
        }

        let aux_classes = match aux.as_deref() {
            Some(Node::AuxChars(nodes)) => match nodes.as_slice() {
                [line, word] => Some(AuxClasses {
                    line: class_id(line, &classes)?,
                    word: class_id(word, &classes)?,
                }),
                _ => None,
            },
            _ => None,
        };

        let indexed = flags.contains(Flag::IndexAlt) && !keys.is_empty();

        self.emit_top(&children, indexed)?;
        self.emit(Instr::Accept)?;

        let code = self.code.into_inner();

        let mut hasher = FxHasher::default();
        code.hash(&mut hasher);
        classes.hash(&mut hasher);
        flags.semantic().hash(&mut hasher);
        let id = hasher.finish();

        let tree = Node::Root { children, flags, keys: keys.clone(), aux };

        #[cfg(feature = "logging")]
        debug!(
            "compiled program {:#018x}: {} instructions, {} states",
            id,
            code.len(),
            self.state_classes.len()
        );

        let dump = if flags.contains(Flag::XDumpProg) {
            Some(Listing(code.as_slice()).to_string())
        } else {
            None
        };

        Ok(Program {
            code,
            classes,
            states: self.state_classes,
            flags,
            group_names: self.group_names,
            counters: self.counters,
            aux: aux_classes,
            keys,
            tree,
            id,
            dump,
        })
    }
}

impl Compiler {
    /// Replaces class nodes with [`Node::Compiled`], assigning state slots
    /// in order of appearance.
    fn lower(
        &mut self,
        node: Node,
        classes: &CharClassTable,
    ) -> Result<Node, CompileError> {
        let node = match node {
            Node::Group { capture, children } => {
                if let Some(Capture { index, name }) = &capture {
                    let index = *index as usize;
                    if self.group_names.len() < index {
                        self.group_names.resize(index, None);
                    }
                    self.group_names[index - 1] = name.clone();
                }
                Node::Group {
                    capture,
                    children: children
                        .into_iter()
                        .map(|child| self.lower(child, classes))
                        .collect::<Result<_, _>>()?,
                }
            }
            Node::Alternation(alternatives) => Node::Alternation(
                alternatives
                    .into_iter()
                    .map(|alt| self.lower(alt, classes))
                    .collect::<Result<_, _>>()?,
            ),
            Node::Repeat { min, max, greedy, child } => Node::Repeat {
                min,
                max,
                greedy,
                child: Box::new(self.lower(*child, classes)?),
            },
            Node::CharClassAttachment { id, .. }
            | Node::ClassRef(id)
            | Node::Compiled { class: id, .. } => {
                if id.index() >= classes.len() {
                    return Err(CompileError::NotCanonical {
                        kind: "ClassRef",
                    });
                }
                Node::Compiled { class: id, state: self.state(id) }
            }
            Node::Assertion(assertion) => Node::Assertion(assertion),
            node => {
                return Err(CompileError::NotCanonical { kind: node.kind() })
            }
        };
        Ok(node)
    }

    fn state(&mut self, class: ClassId) -> u32 {
        if let Some(state) = self.states.get(&class) {
            return *state;
        }
        let state = self.state_classes.len() as u32;
        self.state_classes.push(class);
        self.states.insert(class, state);
        state
    }

    fn emit(&mut self, instr: Instr) -> Result<usize, CompileError> {
        if self.code.location() >= self.size_limit {
            return Err(CompileError::TooLarge {
                size: self.code.location() + 1,
                limit: self.size_limit,
            });
        }
        Ok(self.code.emit_instr(instr))
    }

    /// Emits the children of the root node. If `indexed` is true, the
    /// top-level alternation marks each of its alternatives.
    fn emit_top(
        &mut self,
        children: &[Node],
        indexed: bool,
    ) -> Result<(), CompileError> {
        match children {
            [Node::Alternation(alternatives)] if indexed => {
                self.emit_alternation(alternatives, true)
            }
            [Node::Group { capture, children }] if indexed => {
                if let Some(capture) = capture {
                    self.emit(Instr::GroupOpen(capture.index))?;
                }
                match children.as_slice() {
                    [Node::Alternation(alternatives)] => {
                        self.emit_alternation(alternatives, true)?
                    }
                    children => self.emit_seq(children)?,
                }
                if let Some(capture) = capture {
                    self.emit(Instr::GroupClose(capture.index))?;
                }
                Ok(())
            }
            children => self.emit_seq(children),
        }
    }

    fn emit_seq(&mut self, nodes: &[Node]) -> Result<(), CompileError> {
        for node in nodes {
            self.emit_node(node)?;
        }
        Ok(())
    }

    fn emit_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Group { capture: Some(capture), children } => {
                self.emit(Instr::GroupOpen(capture.index))?;
                self.emit_seq(children)?;
                self.emit(Instr::GroupClose(capture.index))?;
            }
            Node::Group { capture: None, children } => {
                self.emit_seq(children)?;
            }
            Node::Alternation(alternatives) => {
                self.emit_alternation(alternatives, false)?;
            }
            Node::Repeat { min, max, greedy, child } => {
                self.emit_repeat(*min, *max, *greedy, child)?;
            }
            Node::Compiled { class, .. } => {
                self.emit(Instr::MatchClass(*class))?;
            }
            Node::Assertion(assertion) => {
                let multiline = self.flags.contains(Flag::Multiline);
                self.emit(match assertion {
                    Assertion::LineStart => Instr::AnchorStart { multiline },
                    Assertion::LineEnd => Instr::AnchorEnd { multiline },
                    Assertion::TextStart => {
                        Instr::AnchorStart { multiline: false }
                    }
                    Assertion::TextEnd => {
                        Instr::AnchorEnd { multiline: false }
                    }
                    Assertion::WordBoundary => Instr::WordBoundary,
                    Assertion::NotWordBoundary => Instr::WordBoundaryNeg,
                })?;
            }
            // `lower` leaves no other kind of node in the tree.
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Emits:
    ///
    /// ```text
    ///       SPLIT L1 L2 .. Ln
    /// L1:   [ALTERNATIVE 0] alt1
    ///       JUMP end
    /// L2:   [ALTERNATIVE 1] alt2
    ///       JUMP end
    /// ...
    /// Ln:   [ALTERNATIVE n-1] altn
    /// end:
    /// ```
    fn emit_alternation(
        &mut self,
        alternatives: &[Node],
        indexed: bool,
    ) -> Result<(), CompileError> {
        let split = self.emit(Instr::Split(Vec::new()))?;

        let mut starts = Vec::with_capacity(alternatives.len());
        let mut jumps = Vec::with_capacity(alternatives.len());

        for (i, alt) in alternatives.iter().enumerate() {
            starts.push(self.code.location());
            if indexed {
                self.emit(Instr::MarkAlternative(i as u16))?;
            }
            self.emit_node(alt)?;
            if i < alternatives.len() - 1 {
                jumps.push(self.emit(Instr::Jump(0))?);
            }
        }

        let end = self.code.location();

        for jump in jumps {
            self.code.patch_jump(jump, end);
        }

        self.code.patch_split(split, starts);

        Ok(())
    }

    fn emit_repeat(
        &mut self,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        child: &Node,
    ) -> Result<(), CompileError> {
        match max {
            Some(0) => return Ok(()),
            Some(1) if min == 1 => return self.emit_node(child),
            _ => {}
        }

        let bound = max.unwrap_or(min);

        if bound <= MAX_UNROLL || self.depth >= VM_MAX_COUNTERS {
            self.emit_unrolled(min, max, greedy, child)
        } else {
            self.emit_counted(min, max, greedy, child)
        }
    }

    /// Emits a repetition by repeating the code of its body.
    ///
    /// `e{2,}` is emitted as:
    ///
    /// ```text
    ///       e
    /// L:    e
    ///       SPLIT L end
    /// end:
    /// ```
    ///
    /// `e{1,3}` is emitted as:
    ///
    /// ```text
    ///       e
    ///       SPLIT L1 end
    /// L1:   e
    ///       SPLIT L2 end
    /// L2:   e
    /// end:
    /// ```
    ///
    /// In non-greedy repetitions the split targets are swapped.
    fn emit_unrolled(
        &mut self,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        child: &Node,
    ) -> Result<(), CompileError> {
        match max {
            None if min == 0 => {
                let split = self.emit(Instr::Split(Vec::new()))?;
                self.emit_node(child)?;
                let jump = self.emit(Instr::Jump(0))?;
                self.code.patch_jump(jump, split);
                let end = self.code.location();
                self.code.patch_split(split, priority(greedy, split + 1, end));
            }
            None => {
                for _ in 1..min {
                    self.emit_node(child)?;
                }
                let body = self.code.location();
                self.emit_node(child)?;
                let split = self.emit(Instr::Split(Vec::new()))?;
                self.code
                    .patch_split(split, priority(greedy, body, split + 1));
            }
            Some(max) => {
                for _ in 0..min {
                    self.emit_node(child)?;
                }
                let mut splits = Vec::new();
                for _ in min..max {
                    splits.push(self.emit(Instr::Split(Vec::new()))?);
                    self.emit_node(child)?;
                }
                let end = self.code.location();
                for split in splits {
                    self.code
                        .patch_split(split, priority(greedy, split + 1, end));
                }
            }
        }
        Ok(())
    }

    /// Emits a repetition that uses a counter:
    ///
    /// ```text
    ///       SPLIT L end          (only if min is 0)
    /// L:    e
    ///       REPEAT c min-max L
    /// end:
    /// ```
    fn emit_counted(
        &mut self,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        child: &Node,
    ) -> Result<(), CompileError> {
        let counter = self.depth as Counter;

        let split = if min == 0 {
            Some(self.emit(Instr::Split(Vec::new()))?)
        } else {
            None
        };

        let body = self.code.location();

        self.depth += 1;
        self.counters = cmp::max(self.counters, self.depth);
        self.emit_node(child)?;
        self.depth -= 1;

        let repeat = self.code.location();

        self.emit(Instr::Repeat {
            counter,
            min,
            max,
            greedy,
            body: relative(repeat, body),
        })?;

        if let Some(split) = split {
            let end = self.code.location();
            self.code.patch_split(split, priority(greedy, body, end));
        }

        Ok(())
    }
}

/// Returns the targets of a split in priority order.
fn priority(greedy: bool, repeat: usize, skip: usize) -> [usize; 2] {
    if greedy {
        [repeat, skip]
    } else {
        [skip, repeat]
    }
}

/// Returns the class id held by an auxiliary class node.
fn class_id(
    node: &Node,
    classes: &CharClassTable,
) -> Result<ClassId, CompileError> {
    match node {
        Node::CharClassAttachment { id, .. }
        | Node::ClassRef(id)
        | Node::Compiled { class: id, .. }
            if id.index() < classes.len() =>
        {
            Ok(*id)
        }
        node => Err(CompileError::NotCanonical { kind: node.kind() }),
    }
}
