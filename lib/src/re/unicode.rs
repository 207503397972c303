use regex_syntax::hir::{Class, ClassUnicode, ClassUnicodeRange, HirKind};
use regex_syntax::ParserBuilder;

/// Read-only source of Unicode property data.
///
/// The parser consults it for validating `\p{...}` names and the
/// canonicalizer for resolving them into code point sets. Lookups must be
/// deterministic, the same name always yields the same set.
pub trait PropertyLookup {
    /// Returns the set of code points that have the given property, or
    /// `None` if the property is unknown.
    fn lookup(&self, name: &str) -> Option<ClassUnicode>;
}

/// [`PropertyLookup`] backed by the Unicode tables in `regex-syntax`.
///
/// Accepts general categories (`L`, `Letter`, `Nd`), scripts (`Greek`,
/// `Script=Greek`), binary properties (`White_Space`) plus the special name
/// `word`, which is the set matched by `\w`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeTables;

impl PropertyLookup for UnicodeTables {
    fn lookup(&self, name: &str) -> Option<ClassUnicode> {
        if name.is_empty() || !name.chars().all(is_property_name_char) {
            return None;
        }

        let pattern = match name {
            WORD => r"\w".to_string(),
            name => format!(r"\p{{{}}}", name),
        };

        let hir = ParserBuilder::new().build().parse(&pattern).ok()?;

        match hir.kind() {
            HirKind::Class(Class::Unicode(class)) => Some(class.clone()),
            _ => None,
        }
    }
}

/// Name under which [`UnicodeTables`] exposes the `\w` set.
pub(crate) const WORD: &str = "word";

/// Name used for `\d`.
pub(crate) const DIGIT: &str = "Decimal_Number";

/// Name used for `\s`.
pub(crate) const SPACE: &str = "White_Space";

/// Code points that end a line.
pub(crate) const LINE_TERMINATORS: &[char] =
    &['\n', '\x0b', '\x0c', '\r', '\u{85}', '\u{2028}', '\u{2029}'];

fn is_property_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' ' | '=' | ':' | '.')
}

/// Returns the class that contains only line terminators.
pub(crate) fn line_terminators() -> ClassUnicode {
    ClassUnicode::new(
        LINE_TERMINATORS.iter().map(|c| ClassUnicodeRange::new(*c, *c)),
    )
}

/// Returns the class that contains every code point.
pub(crate) fn any_char() -> ClassUnicode {
    ClassUnicode::new([ClassUnicodeRange::new('\0', char::MAX)])
}
