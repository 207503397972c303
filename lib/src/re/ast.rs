/*! Parse tree produced by the [parser][`crate::re::parser::Parser`].

The tree goes through three stages. The parser produces surface nodes
(`Char`, `Class`, `Dot`, `Property`, ...). The canonicalizer replaces every
class-like node with either a [`Node::CharClassAttachment`], the first
occurrence of a class, which owns the resolved [`CharClass`], or a
[`Node::ClassRef`] that only holds the id of a class attached elsewhere.
Finally the compiler turns both into [`Node::Compiled`] nodes that carry
the state slot assigned to the class.
*/

use std::fmt::{Display, Formatter};
use std::ops::Range;

use ::ascii_tree::Tree;
use ::ascii_tree::Tree::{Leaf, Node as Branch};
use itertools::Itertools;

use crate::flags::Flags;
use crate::re::class::{CharClass, ClassId};

/// Zero-width assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Assertion {
    /// `^`
    LineStart,
    /// `$`
    LineEnd,
    /// `\A`
    TextStart,
    /// `\z`
    TextEnd,
    /// `\b`
    WordBoundary,
    /// `\B`
    NotWordBoundary,
}

/// Set operations allowed between items of a bracketed class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationOp {
    /// `&&`
    Intersection,
    /// `--`
    Difference,
}

/// Capture information of a capturing group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Capture {
    /// Group number, starting at 1. Group 0 is the whole match.
    pub index: u16,
    /// Group name, for `(?P<name>...)` groups.
    pub name: Option<String>,
}

/// A node in the parse tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Root of the tree, a sequence of nodes.
    Root {
        children: Vec<Node>,
        /// Flags the pattern was parsed with.
        flags: Flags,
        /// Source spans of each alternative in the indexed top-level
        /// alternation, empty if there is none.
        keys: Vec<Range<usize>>,
        /// Auxiliary classes used by assertions, added by the canonicalizer.
        aux: Option<Box<Node>>,
    },
    /// A sequence of nodes, optionally capturing.
    Group { capture: Option<Capture>, children: Vec<Node> },
    /// Alternatives in declaration order. Each alternative is a
    /// non-capturing `Group`.
    Alternation(Vec<Node>),
    /// `child{min,max}`, `max` is `None` when unbounded.
    Repeat { min: u32, max: Option<u32>, greedy: bool, child: Box<Node> },
    /// Bracketed class.
    Class { negated: bool, items: Vec<Node> },
    /// Literal code point.
    Char(char),
    /// Byte-valued literal written as `\xHH`.
    HexChar(u8),
    /// Unicode property, `\p{name}` or its negation `\P{name}`.
    Property { name: String, negated: bool },
    /// `.`
    Dot,
    /// Set operation between two class items.
    Relation { op: RelationOp, lhs: Box<Node>, rhs: Box<Node> },
    /// Inclusive range of code points within a class.
    Range { first: u32, last: u32 },
    /// Inclusive range of raw bytes within a class, `[\x80-\xff]`.
    ByteRange { first: u8, last: u8 },
    /// Zero-width assertion.
    Assertion(Assertion),
    /// Reference to a class attached somewhere else in the tree.
    ClassRef(ClassId),
    /// First occurrence of a canonical class.
    CharClassAttachment { id: ClassId, class: CharClass },
    /// Class lowered to a VM state slot.
    Compiled { class: ClassId, state: u32 },
    /// Classes used internally by the VM for evaluating assertions.
    AuxChars(Vec<Node>),
}

impl Node {
    /// Returns an empty non-capturing sequence.
    pub fn empty() -> Self {
        Node::Group { capture: None, children: Vec::new() }
    }

    /// Name of the node kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Root { .. } => "Root",
            Node::Group { .. } => "Group",
            Node::Alternation(_) => "Alternation",
            Node::Repeat { .. } => "Repeat",
            Node::Class { .. } => "Class",
            Node::Char(_) => "Char",
            Node::HexChar(_) => "HexChar",
            Node::Property { .. } => "Property",
            Node::Dot => "Dot",
            Node::Relation { .. } => "Relation",
            Node::Range { .. } => "Range",
            Node::ByteRange { .. } => "ByteRange",
            Node::Assertion(_) => "Assertion",
            Node::ClassRef(_) => "ClassRef",
            Node::CharClassAttachment { .. } => "CharClassAttachment",
            Node::Compiled { .. } => "Compiled",
            Node::AuxChars(_) => "AuxChars",
        }
    }

    /// Returns the child nodes in order.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Root { children, aux, .. } => {
                children.iter().chain(aux.as_deref()).collect()
            }
            Node::Group { children, .. } => children.iter().collect(),
            Node::Alternation(alternatives) => alternatives.iter().collect(),
            Node::Repeat { child, .. } => vec![child.as_ref()],
            Node::Class { items, .. } => items.iter().collect(),
            Node::Relation { lhs, rhs, .. } => {
                vec![lhs.as_ref(), rhs.as_ref()]
            }
            Node::AuxChars(children) => children.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if this node is resolved to a single class by the
    /// canonicalizer.
    pub fn is_class_like(&self) -> bool {
        matches!(
            self,
            Node::Class { .. }
                | Node::Char(_)
                | Node::HexChar(_)
                | Node::Property { .. }
                | Node::Dot
        )
    }

    /// Total number of nodes in the tree rooted at this node.
    pub fn count_nodes(&self) -> usize {
        1 + self.children().iter().map(|c| c.count_nodes()).sum::<usize>()
    }

    /// Returns a printable ASCII tree representing this node.
    pub fn ascii_tree(&self) -> Tree {
        let children = self.children();
        if children.is_empty() {
            Leaf(vec![self.label()])
        } else {
            Branch(
                self.label(),
                children.into_iter().map(|c| c.ascii_tree()).collect(),
            )
        }
    }

    /// Renders the tree as text, one node per line.
    pub fn dump(&self) -> String {
        let mut buf = String::new();
        // Writing to a `String` can't fail.
        let _ = ::ascii_tree::write_tree(&mut buf, &self.ascii_tree());
        buf
    }

    fn label(&self) -> String {
        match self {
            Node::Root { keys, .. } if !keys.is_empty() => {
                format!(
                    "root (keys: {})",
                    keys.iter()
                        .map(|k| format!("{}..{}", k.start, k.end))
                        .join(", ")
                )
            }
            Node::Root { .. } => "root".to_string(),
            Node::Group { capture: None, children } if children.is_empty() => {
                "empty".to_string()
            }
            Node::Group { capture: None, .. } => "group".to_string(),
            Node::Group {
                capture: Some(Capture { index, name: None }), ..
            } => format!("group {}", index),
            Node::Group {
                capture: Some(Capture { index, name: Some(name) }),
                ..
            } => {
                format!("group {} <{}>", index, name)
            }
            Node::Alternation(_) => "alternation".to_string(),
            Node::Repeat { min, max, greedy, .. } => {
                let max = match max {
                    Some(max) => max.to_string(),
                    None => "inf".to_string(),
                };
                let lazy = if *greedy { "" } else { " lazy" };
                format!("repeat {{{},{}}}{}", min, max, lazy)
            }
            Node::Class { negated: true, .. } => "class ^".to_string(),
            Node::Class { negated: false, .. } => "class".to_string(),
            Node::Char(c) => format!("char {:?}", c),
            Node::HexChar(b) => format!("hex {:#04x}", b),
            Node::Property { name, negated: false } => {
                format!("property {}", name)
            }
            Node::Property { name, negated: true } => {
                format!("property ^{}", name)
            }
            Node::Dot => "dot".to_string(),
            Node::Relation { op: RelationOp::Intersection, .. } => {
                "relation &&".to_string()
            }
            Node::Relation { op: RelationOp::Difference, .. } => {
                "relation --".to_string()
            }
            Node::Range { first, last } => {
                format!("range {:#04x}-{:#04x}", first, last)
            }
            Node::ByteRange { first, last } => {
                format!("byte range {:#04x}-{:#04x}", first, last)
            }
            Node::Assertion(assertion) => format!("assert {:?}", assertion),
            Node::ClassRef(id) => format!("class ref {}", id),
            Node::CharClassAttachment { id, class } => {
                format!("class {} {}", id, class)
            }
            Node::Compiled { class, state } => {
                format!("compiled {} state {}", class, state)
            }
            Node::AuxChars(_) => "aux".to_string(),
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        ::ascii_tree::write_tree(f, &self.ascii_tree())
    }
}
