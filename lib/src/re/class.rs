use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use regex_syntax::hir::ClassUnicode;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};

/// Identifies a [`CharClass`] within a [`CharClassTable`].
///
/// Ids are dense indexes assigned in interning order, the first class
/// interned gets id 0.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct ClassId(u32);

impl ClassId {
    /// Returns the id as an index into the table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<ClassId> for usize {
    fn from(value: ClassId) -> Self {
        value.index()
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fully resolved character predicate.
///
/// A class is a sorted list of disjoint, non-adjacent inclusive ranges of
/// code points. Negations, properties, set relations and case folding are
/// all resolved before the class is built, so two classes that accept the
/// same code points are equal no matter how they were written.
///
/// A class can also hold raw byte ranges, written as `\xHH` escapes. Those
/// are tested against the input byte at the current position whatever the
/// encoding of the input, and consume that single byte. Only bytes above
/// `0x7f` are kept as raw bytes, ASCII bytes are ordinary code points.
///
/// In byte-stepping mode the VM tests byte values against the class, a byte
/// `b` matches if the code point `b` or the raw byte `b` is in the class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharClass {
    ranges: Vec<(u32, u32)>,
    bytes: Vec<(u8, u8)>,
}

impl CharClass {
    /// Creates a class from possibly unsorted and overlapping ranges.
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut ranges: Vec<(u32, u32)> = ranges
            .into_iter()
            .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
            .collect();

        ranges.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());

        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(end);
                }
                _ => merged.push((start, end)),
            }
        }

        Self { ranges: merged, bytes: Vec::new() }
    }

    /// Adds raw byte ranges to the class. Bytes below `0x80` are added as
    /// code points instead.
    pub fn with_bytes<I>(mut self, bytes: I) -> Self
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        let mut ascii = Vec::new();
        let mut raw = std::mem::take(&mut self.bytes);

        for (a, b) in bytes {
            let (a, b) = if a <= b { (a, b) } else { (b, a) };
            if a < 0x80 {
                ascii.push((a as u32, b.min(0x7f) as u32));
            }
            if b >= 0x80 {
                raw.push((a.max(0x80), b));
            }
        }

        if !ascii.is_empty() {
            ascii.extend_from_slice(&self.ranges);
            self.ranges = Self::from_ranges(ascii).ranges;
        }

        raw.sort_unstable();

        let mut merged: Vec<(u8, u8)> = Vec::with_capacity(raw.len());

        for (start, end) in raw {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(end);
                }
                _ => merged.push((start, end)),
            }
        }

        self.bytes = merged;
        self
    }

    /// Returns the ranges in this class, sorted by starting code point.
    #[inline]
    pub fn ranges(&self) -> &[(u32, u32)] {
        self.ranges.as_slice()
    }

    /// Returns the raw byte ranges in this class, sorted.
    #[inline]
    pub fn bytes(&self) -> &[(u8, u8)] {
        self.bytes.as_slice()
    }

    /// Returns true if the class accepts no code point and no byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.bytes.is_empty()
    }

    /// Returns true if the code point (or byte value) is in the class.
    #[inline]
    pub fn contains(&self, c: u32) -> bool {
        self.ranges
            .binary_search_by(|(start, end)| {
                if c < *start {
                    std::cmp::Ordering::Greater
                } else if c > *end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Returns true if the raw byte is in the class.
    #[inline]
    pub fn contains_byte(&self, b: u8) -> bool {
        self.bytes.iter().any(|(start, end)| *start <= b && b <= *end)
    }

    /// A 64-bit hash of the class content.
    ///
    /// Equal classes always have equal fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.ranges.hash(&mut hasher);
        self.bytes.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<&ClassUnicode> for CharClass {
    fn from(class: &ClassUnicode) -> Self {
        // Ranges in a `ClassUnicode` are already canonical.
        Self {
            ranges: class
                .iter()
                .map(|r| (r.start() as u32, r.end() as u32))
                .collect(),
            bytes: Vec::new(),
        }
    }
}

impl Display for CharClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if start == end {
                write!(f, "{:#04x}", start)?;
            } else {
                write!(f, "{:#04x}-{:#04x}", start, end)?;
            }
        }
        for (i, (start, end)) in self.bytes.iter().enumerate() {
            if i > 0 || !self.ranges.is_empty() {
                write!(f, " ")?;
            }
            if start == end {
                write!(f, "\\x{:02x}", start)?;
            } else {
                write!(f, "\\x{:02x}-\\x{:02x}", start, end)?;
            }
        }
        write!(f, "]")
    }
}

/// Arena of canonical character classes.
///
/// Every distinct class is stored exactly once, nodes and instructions
/// refer to classes by [`ClassId`]. Once a program is compiled the table is
/// frozen and can be shared freely between scanners.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharClassTable {
    classes: Vec<CharClass>,
    #[serde(skip)]
    index: FxHashMap<CharClass, ClassId>,
}

impl CharClassTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class to the table, returning its id and a flag that tells
    /// whether the class was new.
    ///
    /// If an identical class already exists its id is returned and the
    /// table is left untouched.
    pub fn intern(&mut self, class: CharClass) -> (ClassId, bool) {
        if let Some(id) = self.index.get(&class) {
            return (*id, false);
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(class.clone());
        self.index.insert(class, id);
        (id, true)
    }

    /// Returns the id of a class if it is already in the table.
    pub fn find(&self, class: &CharClass) -> Option<ClassId> {
        self.index.get(class).copied()
    }

    /// Returns the class with the given id.
    ///
    /// # Panics
    ///
    /// If the id doesn't belong to this table.
    #[inline]
    pub fn get(&self, id: ClassId) -> &CharClass {
        &self.classes[id.index()]
    }

    /// Number of distinct classes in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if the table has no classes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterates over the classes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &CharClass)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, class)| (ClassId(i as u32), class))
    }
}

impl Hash for CharClassTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.classes.hash(state);
    }
}
