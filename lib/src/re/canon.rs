use regex_syntax::hir::{
    ClassBytes, ClassBytesRange, ClassUnicode, ClassUnicodeRange,
};
use rustc_hash::FxHashMap;

#[cfg(feature = "logging")]
use log::*;

use crate::flags::{Flag, Flags};
use crate::re::ast::{Assertion, Node, RelationOp};
use crate::re::class::{CharClass, CharClassTable, ClassId};
use crate::re::unicode::{
    any_char, line_terminators, PropertyLookup, UnicodeTables, WORD,
};

/// Replaces class-like nodes with references into a [`CharClassTable`].
///
/// Every `Class`, `Char`, `HexChar`, `Property` and `Dot` node is resolved
/// into the set of code points it accepts. Case folding (`IGNORECASE`) and
/// the meaning of `Dot` (`DOTALL`) are applied at this point, so the VM
/// never deals with them. `\xHH` escapes above `0x7f` stay byte-valued,
/// they end up as raw byte ranges of the class, and negating a class with
/// `\xHH` items also negates its bytes. The first node that resolves to a
/// given set becomes a [`Node::CharClassAttachment`], every later node
/// with the same set becomes a [`Node::ClassRef`] to it.
///
/// Running the canonicalizer over its own output produces the same tree and
/// the same table.
pub struct Canonicalizer<'a> {
    lookup: &'a dyn PropertyLookup,
}

impl Default for Canonicalizer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Canonicalizer<'a> {
    /// Creates a canonicalizer that resolves properties with
    /// [`UnicodeTables`].
    pub fn new() -> Self {
        Self { lookup: &UnicodeTables }
    }

    /// Uses `lookup` for resolving `\p{...}` properties.
    pub fn lookup(mut self, lookup: &'a dyn PropertyLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Canonicalizes the tree rooted at `root`.
    ///
    /// Flags are taken from the root node. Interning never fails, the
    /// state budget is enforced later by the compiler.
    pub fn canonicalize(&self, root: Node) -> (Node, CharClassTable) {
        let flags = match &root {
            Node::Root { flags, .. } => *flags,
            _ => Flags::none(),
        };

        let mut state = State {
            table: CharClassTable::new(),
            flags,
            lookup: self.lookup,
            remap: FxHashMap::default(),
            uses_aux: false,
        };

        let root = match root {
            Node::Root { children, flags, keys, .. } => {
                let children = state.visit_all(children);
                let aux = state.aux_chars().map(Box::new);
                Node::Root { children, flags, keys, aux }
            }
            node => state.visit(node),
        };

        #[cfg(feature = "logging")]
        debug!("{} distinct character classes", state.table.len());

        (root, state.table)
    }
}

struct State<'a> {
    table: CharClassTable,
    flags: Flags,
    lookup: &'a dyn PropertyLookup,
    /// Maps ids found in attachments of an already canonical tree to the
    /// ids in the new table.
    remap: FxHashMap<ClassId, ClassId>,
    /// True if some assertion needs the auxiliary classes.
    uses_aux: bool,
}

impl State<'_> {
    fn visit_all(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        nodes.into_iter().map(|node| self.visit(node)).collect()
    }

    fn visit(&mut self, node: Node) -> Node {
        match node {
            Node::Root { children, flags, keys, .. } => {
                let children = self.visit_all(children);
                Node::Root { children, flags, keys, aux: None }
            }
            Node::Group { capture, children } => {
                Node::Group { capture, children: self.visit_all(children) }
            }
            Node::Alternation(alternatives) => {
                Node::Alternation(self.visit_all(alternatives))
            }
            Node::Repeat { min, max, greedy, child } => Node::Repeat {
                min,
                max,
                greedy,
                child: Box::new(self.visit(*child)),
            },
            Node::Assertion(assertion) => {
                if !matches!(
                    assertion,
                    Assertion::TextStart | Assertion::TextEnd
                ) {
                    self.uses_aux = true;
                }
                Node::Assertion(assertion)
            }
            Node::CharClassAttachment { id, class } => {
                let (new_id, node) = self.attach(class);
                self.remap.insert(id, new_id);
                node
            }
            Node::ClassRef(id) => {
                Node::ClassRef(self.remap.get(&id).copied().unwrap_or(id))
            }
            // Auxiliary classes are rebuilt from scratch.
            Node::AuxChars(_) => Node::AuxChars(Vec::new()),
            node if node.is_class_like() => {
                let resolved = self.resolve(&node);
                self.attach(resolved.into_class()).1
            }
            node => node,
        }
    }

    fn attach(&mut self, class: CharClass) -> (ClassId, Node) {
        match self.table.intern(class.clone()) {
            (id, true) => (id, Node::CharClassAttachment { id, class }),
            (id, false) => (id, Node::ClassRef(id)),
        }
    }

    /// Returns the auxiliary classes, line terminators first and word
    /// characters second, if any assertion needs them.
    fn aux_chars(&mut self) -> Option<Node> {
        if !self.uses_aux {
            return None;
        }
        let line = self.attach(CharClass::from(&line_terminators())).1;
        let word = self.attach(CharClass::from(&self.word_chars())).1;
        Some(Node::AuxChars(vec![line, word]))
    }

    fn word_chars(&self) -> ClassUnicode {
        self.lookup.lookup(WORD).unwrap_or_else(ClassUnicode::empty)
    }

    /// Case-folds `class` if `IGNORECASE` is set.
    fn fold(&self, mut class: ClassUnicode) -> ClassUnicode {
        if self.flags.contains(Flag::IgnoreCase) {
            class.case_fold_simple();
        }
        class
    }

    /// Computes the set of code points and raw bytes accepted by a
    /// class-like node.
    fn resolve(&self, node: &Node) -> Resolved {
        match node {
            Node::Char(c) => self.fold(single(*c)).into(),
            Node::HexChar(b) if b.is_ascii() => Resolved {
                chars: self.fold(single(char::from(*b))),
                bytes: Some(ClassBytes::empty()),
            },
            Node::HexChar(b) => Resolved::bytes(*b, *b),
            Node::ByteRange { first, last } => {
                let mut resolved = Resolved::bytes(*first, *last);
                if first.is_ascii() {
                    let last = char::from((*last).min(0x7f));
                    resolved.chars = self.fold(ClassUnicode::new([
                        ClassUnicodeRange::new(char::from(*first), last),
                    ]));
                }
                resolved
            }
            Node::Range { first, last } => {
                match (char::from_u32(*first), char::from_u32(*last)) {
                    (Some(first), Some(last)) => self
                        .fold(ClassUnicode::new([ClassUnicodeRange::new(
                            first, last,
                        )]))
                        .into(),
                    _ => ClassUnicode::empty().into(),
                }
            }
            Node::Property { name, negated } => {
                let mut class = self.fold(
                    self.lookup
                        .lookup(name)
                        .unwrap_or_else(ClassUnicode::empty),
                );
                if *negated {
                    class.negate();
                }
                class.into()
            }
            Node::Dot => {
                let mut class = any_char();
                if !self.flags.contains(Flag::DotAll) {
                    class.difference(&line_terminators());
                }
                class.into()
            }
            Node::Class { negated, items } => {
                let mut class = Resolved::from(ClassUnicode::empty());
                for item in items {
                    class.union(self.resolve(item));
                }
                if *negated {
                    class.negate();
                }
                class
            }
            Node::Relation { op, lhs, rhs } => {
                let mut class = self.resolve(lhs);
                let rhs = self.resolve(rhs);
                match op {
                    RelationOp::Intersection => class.intersect(rhs),
                    RelationOp::Difference => class.difference(rhs),
                }
                class
            }
            _ => ClassUnicode::empty().into(),
        }
    }
}

/// Code points and raw bytes accepted by a class-like node.
///
/// `bytes` is `None` when the node has no `\xHH` items at all, in that
/// case negating the class doesn't make it accept raw bytes.
struct Resolved {
    chars: ClassUnicode,
    bytes: Option<ClassBytes>,
}

impl From<ClassUnicode> for Resolved {
    fn from(chars: ClassUnicode) -> Self {
        Self { chars, bytes: None }
    }
}

impl Resolved {
    /// Raw bytes from `first` to `last`, only the ones above `0x7f`.
    fn bytes(first: u8, last: u8) -> Self {
        let mut bytes = ClassBytes::empty();
        if last >= 0x80 {
            bytes.push(ClassBytesRange::new(first.max(0x80), last));
        }
        Self { chars: ClassUnicode::empty(), bytes: Some(bytes) }
    }

    fn union(&mut self, other: Resolved) {
        self.chars.union(&other.chars);
        self.bytes = match (self.bytes.take(), other.bytes) {
            (Some(mut a), Some(b)) => {
                a.union(&b);
                Some(a)
            }
            (a, b) => a.or(b),
        };
    }

    fn intersect(&mut self, other: Resolved) {
        self.chars.intersect(&other.chars);
        self.bytes = match (self.bytes.take(), other.bytes) {
            (Some(mut a), Some(b)) => {
                a.intersect(&b);
                Some(a)
            }
            (None, None) => None,
            _ => Some(ClassBytes::empty()),
        };
    }

    fn difference(&mut self, other: Resolved) {
        self.chars.difference(&other.chars);
        self.bytes = match (self.bytes.take(), other.bytes) {
            (Some(mut a), Some(b)) => {
                a.difference(&b);
                Some(a)
            }
            (Some(a), None) => Some(a),
            (None, Some(_)) => Some(ClassBytes::empty()),
            (None, None) => None,
        };
    }

    /// Negates the code points over the whole Unicode range, and the raw
    /// bytes over `0x80-0xff`.
    fn negate(&mut self) {
        self.chars.negate();
        if let Some(bytes) = self.bytes.as_mut() {
            bytes.negate();
            bytes.intersect(&ClassBytes::new([ClassBytesRange::new(
                0x80, 0xff,
            )]));
        }
    }

    fn into_class(self) -> CharClass {
        let class = CharClass::from(&self.chars);
        match self.bytes {
            Some(bytes) => class
                .with_bytes(bytes.iter().map(|r| (r.start(), r.end()))),
            None => class,
        }
    }
}

fn single(c: char) -> ClassUnicode {
    ClassUnicode::new([ClassUnicodeRange::new(c, c)])
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Canonicalizer;
    use crate::flags::{Flag, Flags};
    use crate::re::ast::Node;
    use crate::re::class::ClassId;
    use crate::re::parser::Parser;

    fn canonicalize(pattern: &str, flags: Flags) -> (Node, usize) {
        let root = Parser::new().flags(flags).parse(pattern).unwrap();
        let (root, table) = Canonicalizer::new().canonicalize(root);
        (root, table.len())
    }

    fn children(root: &Node) -> &[Node] {
        match root {
            Node::Root { children, .. } => children.as_slice(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn equivalent_classes_are_merged() {
        let (root, len) = canonicalize("[a-c][abc][cba]x[x]", Flags::none());
        assert_eq!(len, 2);

        let children = children(&root);
        assert!(matches!(children[0], Node::CharClassAttachment { .. }));
        assert_eq!(children[1], Node::ClassRef(ClassId::default()));
        assert_eq!(children[2], Node::ClassRef(ClassId::default()));
        assert!(matches!(children[3], Node::CharClassAttachment { .. }));
        assert!(matches!(children[4], Node::ClassRef(_)));
    }

    #[test]
    fn case_folding() {
        let (_, len) = canonicalize("[a-c][ABC]", Flags::none());
        assert_eq!(len, 2);

        let (_, len) =
            canonicalize("[a-c][ABC]", Flags::none().with(Flag::IgnoreCase));
        assert_eq!(len, 1);

        // Negation applies after folding.
        let (root, _) =
            canonicalize("[^a]", Flags::none().with(Flag::IgnoreCase));
        match &children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert!(!class.contains('a' as u32));
                assert!(!class.contains('A' as u32));
                assert!(class.contains('b' as u32));
            }
            node => panic!("unexpected node {:?}", node),
        }
    }

    #[test]
    fn dot() {
        let (root, _) = canonicalize(".", Flags::none());
        match &children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert!(!class.contains('\n' as u32));
                assert!(class.contains('a' as u32));
            }
            node => panic!("unexpected node {:?}", node),
        }

        let (root, _) = canonicalize(".", Flags::none().with(Flag::DotAll));
        match &children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert!(class.contains('\n' as u32));
            }
            node => panic!("unexpected node {:?}", node),
        }
    }

    #[test]
    fn relations() {
        let (root, _) = canonicalize("[a-z&&[^aeiou]]", Flags::none());
        match &children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert!(class.contains('b' as u32));
                assert!(!class.contains('a' as u32));
                assert!(!class.contains('B' as u32));
            }
            node => panic!("unexpected node {:?}", node),
        }
    }

    #[test]
    fn aux_chars() {
        let (root, len) = canonicalize(r"\bfoo$", Flags::none());
        // f, o, line terminators and word characters.
        assert_eq!(len, 4);
        match root {
            Node::Root { aux: Some(aux), .. } => {
                assert!(matches!(*aux, Node::AuxChars(ref v) if v.len() == 2))
            }
            node => panic!("unexpected node {:?}", node),
        }
    }

    #[test]
    fn hex_escapes_are_bytes() {
        let (root, len) =
            canonicalize(r"\x41\x90[\x80-\x8f\x90]", Flags::none());
        assert_eq!(len, 3);

        let children = children(&root);
        match &children[1] {
            Node::CharClassAttachment { class, .. } => {
                assert!(class.contains_byte(0x90));
                assert!(!class.contains(0x90));
            }
            node => panic!("unexpected node {:?}", node),
        }
        match &children[2] {
            Node::CharClassAttachment { class, .. } => {
                assert_eq!(class.bytes(), &[(0x80, 0x90)]);
                assert!(class.ranges().is_empty());
            }
            node => panic!("unexpected node {:?}", node),
        }

        // Negated byte classes keep ASCII as code points.
        let (root, _) = canonicalize(r"[^\x00\x90]", Flags::none());
        match &self::children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert!(!class.contains(0));
                assert!(class.contains('a' as u32));
                assert!(!class.contains_byte(0x90));
                assert!(class.contains_byte(0x91));
            }
            node => panic!("unexpected node {:?}", node),
        }

        let (root, _) = canonicalize(r"[^\x00]", Flags::none());
        match &self::children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert_eq!(class.bytes(), &[(0x80, 0xff)]);
            }
            node => panic!("unexpected node {:?}", node),
        }

        // Classes without byte items never accept raw bytes.
        let (root, _) = canonicalize("[^a]", Flags::none());
        match &self::children(&root)[0] {
            Node::CharClassAttachment { class, .. } => {
                assert!(class.bytes().is_empty());
            }
            node => panic!("unexpected node {:?}", node),
        }
    }

    #[test]
    fn idempotence() {
        for pattern in [
            "a[bc]+",
            r"(\w+)@[a-z]+\.(com|org)",
            "x[a-c]y[abc]z.",
            r"^\bq[\xf0-\xff]",
        ] {
            let root = Parser::new()
                .flags(Flags::none().with(Flag::IgnoreCase))
                .parse(pattern)
                .unwrap();

            let (once, table_once) = Canonicalizer::new().canonicalize(root);
            let (twice, table_twice) =
                Canonicalizer::new().canonicalize(once.clone());

            assert_eq!(once, twice);
            assert_eq!(table_once, table_twice);
        }
    }
}
