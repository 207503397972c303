use std::mem;
use std::ops::Range;

#[cfg(feature = "logging")]
use log::*;

use crate::errors::SyntaxError;
use crate::flags::{Flag, Flags};
use crate::re::ast::{Assertion, Capture, Node, RelationOp};
use crate::re::unicode::{PropertyLookup, UnicodeTables, DIGIT, SPACE, WORD};
use crate::re::{MAX_NESTING, MAX_REPEAT, VM_MAX_GROUPS};

/// A regular expression parser.
///
/// Takes the text of a pattern and produces a [`Node::Root`] tree. Escapes,
/// classes, groups, alternation and repetition are resolved into tagged
/// nodes, character classes are left unresolved for the canonicalizer.
pub struct Parser<'a> {
    flags: Flags,
    lookup: &'a dyn PropertyLookup,
}

impl Default for Parser<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Parser<'a> {
    /// Creates a parser with no flags that resolves properties with
    /// [`UnicodeTables`].
    pub fn new() -> Self {
        Self { flags: Flags::none(), lookup: &UnicodeTables }
    }

    /// Flags the pattern is parsed with. Only `VERBOSE` changes how the
    /// text is read, but every flag is recorded in the root node.
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Uses `lookup` for validating `\p{...}` property names.
    pub fn lookup(mut self, lookup: &'a dyn PropertyLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Parses a pattern.
    pub fn parse(&self, pattern: &str) -> Result<Node, SyntaxError> {
        let chars = if self.flags.contains(Flag::Verbose) {
            strip_verbose(pattern)
        } else {
            pattern.char_indices().collect()
        };

        if chars.is_empty() {
            return Err(SyntaxError::new(0, "empty pattern"));
        }

        let mut parser = ParserImpl {
            chars,
            pos: 0,
            end: pattern.len(),
            lookup: self.lookup,
            groups: 0,
            names: Vec::new(),
            depth: 0,
            leading_group_spans: Vec::new(),
        };

        let (top, spans) = parser.parse_alternation()?;

        if let Some(c) = parser.peek() {
            // The only way of leaving `parse_alternation` before the end of
            // the pattern is finding a `)` without its `(`.
            debug_assert_eq!(c, ')');
            return Err(SyntaxError::new(
                parser.offset(),
                "unbalanced parenthesis",
            ));
        }

        let keys = if self.flags.contains(Flag::IndexAlt) {
            indexed_alternatives(&top, spans, parser.leading_group_spans)
        } else {
            Vec::new()
        };

        let children = match top {
            Node::Group { capture: None, children } => children,
            node => vec![node],
        };

        let root = Node::Root { children, flags: self.flags, keys, aux: None };

        #[cfg(feature = "logging")]
        debug!("parsed pattern into {} nodes", root.count_nodes());

        Ok(root)
    }
}

/// Returns the spans of the alternatives in the top-level alternation.
///
/// The top-level alternation is either the alternation at the root of the
/// pattern (`foo|bar`) or the one directly inside a group that encloses the
/// whole pattern (`(foo|bar)`). `group_spans` are the spans of the
/// alternatives inside the group that starts the pattern, if any.
fn indexed_alternatives(
    top: &Node,
    spans: Vec<Range<usize>>,
    group_spans: Vec<Range<usize>>,
) -> Vec<Range<usize>> {
    match top {
        Node::Alternation(_) => spans,
        Node::Group { capture: None, children } => match children.as_slice() {
            [Node::Group { children, .. }]
                if matches!(children.as_slice(), [Node::Alternation(_)]) =>
            {
                group_spans
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Removes unescaped whitespace and `#` comments, except inside brackets.
///
/// Returns the remaining characters together with their offsets in the
/// original pattern, so errors still point to the right place.
fn strip_verbose(pattern: &str) -> Vec<(usize, char)> {
    let mut result = Vec::with_capacity(pattern.len());
    let mut iter = pattern.char_indices();
    // Nesting level of brackets.
    let mut class_depth = 0_usize;
    // Characters seen since the last opening bracket.
    let mut class_len = 0_usize;
    let mut class_negated = false;

    while let Some((i, c)) = iter.next() {
        if c == '\\' {
            result.push((i, c));
            if let Some(escaped) = iter.next() {
                result.push(escaped);
            }
            class_len += 1;
            continue;
        }

        if class_depth > 0 {
            match c {
                ']' if class_len > 0 && !(class_len == 1 && class_negated) => {
                    class_depth -= 1;
                }
                '[' => {
                    class_depth += 1;
                    class_len = 0;
                    class_negated = false;
                    result.push((i, c));
                    continue;
                }
                '^' if class_len == 0 => class_negated = true,
                _ => {}
            }
            class_len += 1;
            result.push((i, c));
            continue;
        }

        if c.is_whitespace() {
            continue;
        }

        if c == '#' {
            for (_, c) in iter.by_ref() {
                if c == '\n' {
                    break;
                }
            }
            continue;
        }

        if c == '[' {
            class_depth = 1;
            class_len = 0;
            class_negated = false;
        }

        result.push((i, c));
    }

    result
}

struct ParserImpl<'a> {
    chars: Vec<(usize, char)>,
    pos: usize,
    /// Length of the pattern, used as the offset of the end.
    end: usize,
    lookup: &'a dyn PropertyLookup,
    groups: u16,
    names: Vec<String>,
    depth: usize,
    /// Spans of the alternatives inside a group that starts at the very
    /// beginning of the pattern.
    leading_group_spans: Vec<Range<usize>>,
}

impl ParserImpl<'_> {
    #[inline]
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    #[inline]
    fn peek_nth(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|(_, c)| *c)
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    #[inline]
    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Offset within the pattern of the next character.
    #[inline]
    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(i, _)| *i).unwrap_or(self.end)
    }

    fn enter(&mut self, offset: usize) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(SyntaxError::new(offset, "pattern nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parses alternatives separated by `|` until the end of the pattern
    /// or an unmatched `)`.
    ///
    /// Returns the resulting node and the source span of each alternative.
    fn parse_alternation(
        &mut self,
    ) -> Result<(Node, Vec<Range<usize>>), SyntaxError> {
        let mut alternatives = Vec::new();
        let mut spans = Vec::new();

        loop {
            let start = self.offset();
            let children = self.parse_sequence()?;
            spans.push(start..self.offset());
            alternatives.push(Node::Group { capture: None, children });

            if !self.eat('|') {
                break;
            }
        }

        if alternatives.len() == 1 {
            // `alternatives` has exactly one item.
            let node = alternatives.pop().unwrap_or_else(Node::empty);
            Ok((node, spans))
        } else {
            Ok((Node::Alternation(alternatives), spans))
        }
    }

    /// Parses a sequence of quantified atoms.
    fn parse_sequence(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let mut nodes = Vec::new();

        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }

            let atom_offset = self.offset();

            let atom = match self.parse_atom()? {
                Some(atom) => atom,
                // Comments produce no node.
                None => continue,
            };

            let node = self.parse_quantifiers(atom, atom_offset)?;
            nodes.push(node);
        }

        Ok(nodes)
    }

    /// Parses a single atom. Returns `None` for `(?#...)` comments.
    fn parse_atom(&mut self) -> Result<Option<Node>, SyntaxError> {
        let offset = self.offset();

        let c = match self.bump() {
            Some(c) => c,
            None => return Err(SyntaxError::new(offset, "unexpected end")),
        };

        let node = match c {
            '(' => return self.parse_group(offset),
            '[' => self.parse_class(offset)?,
            '.' => Node::Dot,
            '^' => Node::Assertion(Assertion::LineStart),
            '$' => Node::Assertion(Assertion::LineEnd),
            '\\' => self.parse_escape(offset, false)?,
            '*' | '+' | '?' => {
                return Err(SyntaxError::new(offset, "nothing to repeat"));
            }
            '{' => {
                self.pos -= 1;
                if self.parse_bounds()?.is_some() {
                    return Err(SyntaxError::new(offset, "nothing to repeat"));
                }
                self.pos += 1;
                Node::Char('{')
            }
            c => Node::Char(c),
        };

        Ok(Some(node))
    }

    /// Parses the part of a group that follows the opening parenthesis.
    fn parse_group(
        &mut self,
        open_offset: usize,
    ) -> Result<Option<Node>, SyntaxError> {
        let mut capture = true;
        let mut name = None;

        if self.eat('?') {
            let ext_offset = self.offset();
            match self.bump() {
                Some(':') => capture = false,
                Some('#') => {
                    loop {
                        match self.bump() {
                            Some(')') => return Ok(None),
                            Some(_) => {}
                            None => {
                                return Err(SyntaxError::new(
                                    open_offset,
                                    "missing ), unterminated comment",
                                ))
                            }
                        }
                    }
                }
                Some('P') if self.peek() == Some('<') => {
                    self.pos += 1;
                    name = Some(self.parse_group_name(ext_offset)?);
                }
                Some('P') if self.peek() == Some('=') => {
                    return Err(SyntaxError::new(
                        open_offset,
                        "backreferences are not supported",
                    ));
                }
                Some('<') if !matches!(self.peek(), Some('=') | Some('!')) => {
                    name = Some(self.parse_group_name(ext_offset)?);
                }
                Some('=') | Some('!') | Some('<') => {
                    return Err(SyntaxError::new(
                        open_offset,
                        "lookaround assertions are not supported",
                    ));
                }
                _ => {
                    return Err(SyntaxError::new(
                        ext_offset,
                        "unknown extension",
                    ));
                }
            }
        }

        let capture = if capture {
            if self.groups as usize >= VM_MAX_GROUPS {
                return Err(SyntaxError::new(open_offset, "too many groups"));
            }
            self.groups += 1;
            Some(Capture { index: self.groups, name })
        } else {
            None
        };

        self.enter(open_offset)?;
        let (inner, spans) = self.parse_alternation()?;
        self.leave();

        if self.chars.first().map(|(i, _)| *i) == Some(open_offset) {
            self.leading_group_spans = spans;
        }

        if !self.eat(')') {
            return Err(SyntaxError::new(
                open_offset,
                "missing ), unterminated subpattern",
            ));
        }

        let children = match inner {
            Node::Group { capture: None, children } => children,
            node => vec![node],
        };

        Ok(Some(Node::Group { capture, children }))
    }

    /// Parses `name>` in a named group.
    fn parse_group_name(
        &mut self,
        offset: usize,
    ) -> Result<String, SyntaxError> {
        let mut name = String::new();

        loop {
            match self.bump() {
                Some('>') => break,
                Some(c) if c == '_' || c.is_alphanumeric() => name.push(c),
                Some(_) => {
                    return Err(SyntaxError::new(
                        offset,
                        "bad character in group name",
                    ));
                }
                None => {
                    return Err(SyntaxError::new(
                        offset,
                        "missing >, unterminated name",
                    ));
                }
            }
        }

        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(SyntaxError::new(
                offset,
                format!("bad group name '{}'", name),
            ));
        }

        if self.names.contains(&name) {
            return Err(SyntaxError::new(
                offset,
                format!("redefinition of group name '{}'", name),
            ));
        }

        self.names.push(name.clone());

        Ok(name)
    }

    /// Parses any number of quantifiers following an atom.
    fn parse_quantifiers(
        &mut self,
        mut atom: Node,
        atom_offset: usize,
    ) -> Result<Node, SyntaxError> {
        let mut quantified = false;

        loop {
            let offset = self.offset();

            let (min, max) = match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    (0, None)
                }
                Some('+') => {
                    self.pos += 1;
                    (1, None)
                }
                Some('?') => {
                    self.pos += 1;
                    (0, Some(1))
                }
                Some('{') => match self.parse_bounds()? {
                    Some(bounds) => bounds,
                    None => return Ok(atom),
                },
                _ => return Ok(atom),
            };

            if quantified {
                return Err(SyntaxError::new(offset, "multiple repeat"));
            }

            if matches!(atom, Node::Assertion(_)) {
                return Err(SyntaxError::new(atom_offset, "nothing to repeat"));
            }

            let greedy = !self.eat('?');

            atom = Node::Repeat { min, max, greedy, child: Box::new(atom) };
            quantified = true;
        }
    }

    /// Tries to parse `{m}`, `{m,}`, `{,n}` or `{m,n}` at the current
    /// position.
    ///
    /// If the text at the current position is not a valid bound the
    /// position is left untouched and `None` is returned, the `{` is then
    /// a literal.
    fn parse_bounds(
        &mut self,
    ) -> Result<Option<(u32, Option<u32>)>, SyntaxError> {
        let start = self.pos;
        let offset = self.offset();

        if !self.eat('{') {
            return Ok(None);
        }

        let min = self.parse_count();
        let has_comma = self.eat(',');
        let max = if has_comma { self.parse_count() } else { min };

        if !self.eat('}') || (min.is_none() && max.is_none()) {
            self.pos = start;
            return Ok(None);
        }

        let min = clamp_count(min.unwrap_or(0));
        let max = max.map(clamp_count);

        if let Some(max) = max {
            if min > max {
                return Err(SyntaxError::new(
                    offset,
                    "min repeat greater than max repeat",
                ));
            }
        }

        Ok(Some((min, max)))
    }

    fn parse_count(&mut self) -> Option<u64> {
        let mut count: Option<u64> = None;
        while let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
            self.pos += 1;
            count = Some(
                count
                    .unwrap_or(0)
                    .saturating_mul(10)
                    .saturating_add(digit as u64),
            );
        }
        count
    }

    /// Parses a bracketed class, the opening `[` was already consumed.
    fn parse_class(
        &mut self,
        open_offset: usize,
    ) -> Result<Node, SyntaxError> {
        self.enter(open_offset)?;

        let negated = self.eat('^');
        let mut items: Vec<Node> = Vec::new();
        let mut relation: Option<(RelationOp, Node)> = None;
        let mut first = true;

        loop {
            let offset = self.offset();

            let c = match self.peek() {
                Some(c) => c,
                None => {
                    return Err(SyntaxError::new(
                        open_offset,
                        "unterminated character set",
                    ))
                }
            };

            let op = match (c, self.peek_nth(1)) {
                ('&', Some('&')) => Some(RelationOp::Intersection),
                ('-', Some('-'))
                    if !first && self.peek_nth(2) != Some(']') =>
                {
                    Some(RelationOp::Difference)
                }
                _ => None,
            };

            if let Some(op) = op {
                self.pos += 2;
                let operand = self.relation_operand(&mut items, offset)?;
                let lhs = match relation.take() {
                    Some((prev_op, lhs)) => Node::Relation {
                        op: prev_op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(operand),
                    },
                    None => operand,
                };
                relation = Some((op, lhs));
                first = false;
                continue;
            }

            if c == ']' && !first {
                self.pos += 1;
                break;
            }

            first = false;

            let item = if c == '[' {
                self.pos += 1;
                self.parse_class(offset)?
            } else {
                self.parse_class_item()?
            };

            // A `-` between two single characters makes a range, unless it
            // is the last character in the class.
            let is_range = self.peek() == Some('-')
                && !matches!(self.peek_nth(1), Some(']') | Some('-') | None);

            if is_range {
                self.pos += 1;
                let last_offset = self.offset();
                let last = self.parse_class_item()?;
                items.push(range(item, last, offset, last_offset)?);
            } else {
                items.push(item);
            }
        }

        if let Some((op, lhs)) = relation {
            let rhs = self.relation_operand(&mut items, self.offset())?;
            items.push(Node::Relation {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        self.leave();

        Ok(Node::Class { negated, items })
    }

    fn relation_operand(
        &self,
        items: &mut Vec<Node>,
        offset: usize,
    ) -> Result<Node, SyntaxError> {
        if items.is_empty() {
            return Err(SyntaxError::new(offset, "missing operand in class"));
        }
        Ok(Node::Class { negated: false, items: mem::take(items) })
    }

    /// Parses a single item inside a bracketed class.
    fn parse_class_item(&mut self) -> Result<Node, SyntaxError> {
        let offset = self.offset();
        match self.bump() {
            Some('\\') => self.parse_escape(offset, true),
            Some(c) => Ok(Node::Char(c)),
            None => {
                Err(SyntaxError::new(offset, "unterminated character set"))
            }
        }
    }

    /// Parses an escape sequence, the `\` was already consumed.
    fn parse_escape(
        &mut self,
        offset: usize,
        in_class: bool,
    ) -> Result<Node, SyntaxError> {
        let c = match self.bump() {
            Some(c) => c,
            None => {
                return Err(SyntaxError::new(offset, "unterminated escape"))
            }
        };

        let node = match c {
            'a' => Node::Char('\x07'),
            'f' => Node::Char('\x0c'),
            'n' => Node::Char('\n'),
            'r' => Node::Char('\r'),
            't' => Node::Char('\t'),
            'v' => Node::Char('\x0b'),
            'e' => Node::Char('\x1b'),
            '0' => Node::Char('\0'),
            '1'..='9' => {
                return Err(SyntaxError::new(
                    offset,
                    "backreferences are not supported",
                ))
            }
            'x' if self.eat('{') => {
                let digits = self.take_hex_until('}', offset)?;
                Node::Char(code_point(&digits, offset)?)
            }
            'x' => {
                let digits = self.take_hex(2, offset)?;
                // Two hex digits always fit in a byte.
                Node::HexChar(u8::from_str_radix(&digits, 16).unwrap_or(0))
            }
            'u' => {
                let digits = self.take_hex(4, offset)?;
                Node::Char(code_point(&digits, offset)?)
            }
            'U' => {
                let digits = self.take_hex(8, offset)?;
                Node::Char(code_point(&digits, offset)?)
            }
            'd' | 'D' => Node::Property {
                name: DIGIT.to_string(),
                negated: c == 'D',
            },
            's' | 'S' => Node::Property {
                name: SPACE.to_string(),
                negated: c == 'S',
            },
            'w' | 'W' => Node::Property {
                name: WORD.to_string(),
                negated: c == 'W',
            },
            'p' | 'P' => {
                let name = if self.eat('{') {
                    let mut name = String::new();
                    loop {
                        match self.bump() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(SyntaxError::new(
                                    offset,
                                    "unterminated property name",
                                ))
                            }
                        }
                    }
                    name
                } else {
                    match self.bump() {
                        Some(c) if c.is_ascii_alphabetic() => c.to_string(),
                        _ => {
                            return Err(SyntaxError::new(
                                offset,
                                "missing property name",
                            ))
                        }
                    }
                };
                if self.lookup.lookup(&name).is_none() {
                    return Err(SyntaxError::new(
                        offset,
                        format!("unknown property name '{}'", name),
                    ));
                }
                Node::Property { name, negated: c == 'P' }
            }
            'b' if in_class => Node::Char('\x08'),
            'A' | 'z' | 'b' | 'B' if in_class => {
                return Err(SyntaxError::new(
                    offset,
                    format!("bad escape \\{} in character set", c),
                ))
            }
            'A' => Node::Assertion(Assertion::TextStart),
            'z' => Node::Assertion(Assertion::TextEnd),
            'b' => Node::Assertion(Assertion::WordBoundary),
            'B' => Node::Assertion(Assertion::NotWordBoundary),
            c if c.is_ascii_alphanumeric() => {
                return Err(SyntaxError::new(
                    offset,
                    format!("bad escape \\{}", c),
                ))
            }
            c => Node::Char(c),
        };

        Ok(node)
    }

    fn take_hex(
        &mut self,
        n: usize,
        offset: usize,
    ) -> Result<String, SyntaxError> {
        let mut digits = String::with_capacity(n);
        for _ in 0..n {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.pos += 1;
                    digits.push(c);
                }
                _ => {
                    return Err(SyntaxError::new(offset, "incomplete escape"))
                }
            }
        }
        Ok(digits)
    }

    fn take_hex_until(
        &mut self,
        close: char,
        offset: usize,
    ) -> Result<String, SyntaxError> {
        let mut digits = String::new();
        loop {
            match self.bump() {
                Some(c) if c == close && !digits.is_empty() => break,
                Some(c) if c.is_ascii_hexdigit() && digits.len() < 8 => {
                    digits.push(c)
                }
                _ => return Err(SyntaxError::new(offset, "incomplete escape")),
            }
        }
        Ok(digits)
    }
}

fn code_point(digits: &str, offset: usize) -> Result<char, SyntaxError> {
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| SyntaxError::new(offset, "invalid code point"))
}

fn clamp_count(count: u64) -> u32 {
    if count > MAX_REPEAT as u64 {
        #[cfg(feature = "logging")]
        warn!("repeat count {} clamped to {}", count, MAX_REPEAT);
        MAX_REPEAT
    } else {
        count as u32
    }
}

/// Builds a range node from two class items.
fn range(
    first: Node,
    last: Node,
    offset: usize,
    last_offset: usize,
) -> Result<Node, SyntaxError> {
    let (first, last) = match (first, last) {
        (Node::Char(a), Node::Char(b)) => (a as u32, b as u32),
        (Node::HexChar(a), Node::HexChar(b)) => {
            if a > b {
                return Err(SyntaxError::new(offset, "bad character range"));
            }
            return Ok(Node::ByteRange { first: a, last: b });
        }
        (Node::Char(_), Node::HexChar(_))
        | (Node::HexChar(_), Node::Char(_)) => {
            return Err(SyntaxError::new(
                offset,
                "range endpoints must be of the same kind",
            ))
        }
        (Node::Char(_), _) | (Node::HexChar(_), _) => {
            return Err(SyntaxError::new(last_offset, "bad character range"))
        }
        _ => return Err(SyntaxError::new(offset, "bad character range")),
    };

    if first > last {
        return Err(SyntaxError::new(offset, "bad character range"));
    }

    Ok(Node::Range { first, last })
}
