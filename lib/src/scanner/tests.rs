use pretty_assertions::assert_eq;

use crate::errors::{RuntimeError, ScanError, SerializationError};
use crate::flags::{Flag, Flags};
use crate::re::canon::Canonicalizer;
use crate::re::parser::Parser;
use crate::re::thompson::{Compiler, Program};
use crate::scanner::{
    run, scan, Match, MatchResult, ScanCursor, ScanStep, Scanner, Sector,
};

fn compile(pattern: &str, flags: Flags) -> Program {
    let root = Parser::new().flags(flags).parse(pattern).unwrap();
    let (root, classes) = Canonicalizer::new().canonicalize(root);
    Compiler::new().compile(root, classes).unwrap()
}

fn spans<I: IntoIterator<Item = Match>>(matches: I) -> Vec<(usize, usize)> {
    matches.into_iter().map(|m| m.span()).collect()
}

fn search(pattern: &str, input: &str) -> Vec<(usize, usize)> {
    let program = compile(pattern, Flags::none());
    spans(scan(&program, input.as_bytes(), 1, 0).unwrap())
}

fn sector(
    pattern: &str,
    input: &str,
    stride: usize,
    offset: usize,
) -> Vec<(usize, usize)> {
    let program = compile(pattern, Flags::none().with(Flag::Sector));
    spans(scan(&program, input.as_bytes(), stride, offset).unwrap())
}

#[test]
fn search_mode() {
    assert_eq!(search("a+", "aa b aaa"), vec![(0, 2), (5, 8)]);
    assert_eq!(search("a[bc]+", "abbc d"), vec![(0, 4)]);
    assert_eq!(search("x", "abc"), vec![]);
    assert_eq!(search("a*", "ba"), vec![(0, 0), (1, 2), (2, 2)]);
    assert_eq!(search("a*", ""), vec![(0, 0)]);
    // Empty matches advance by one character, not one byte.
    assert_eq!(search("x*", "é"), vec![(0, 0), (2, 2)]);
}

#[test]
fn search_from_offset() {
    let program = compile("ab", Flags::none());
    let scanner = scan(&program, b"abxab", 1, 1).unwrap();
    assert_eq!(spans(scanner), vec![(3, 5)]);

    let scanner = scan(&program, b"abxab", 1, 10).unwrap();
    assert_eq!(spans(scanner), vec![]);
}

#[test]
fn sector_mode() {
    assert_eq!(sector("ab", "abxabyab", 1, 0), vec![(0, 2), (3, 5), (6, 8)]);
    assert_eq!(sector("ab", "abxabyab", 3, 0), vec![(0, 2), (3, 5), (6, 8)]);
    assert_eq!(sector("ab", "abxabyab", 2, 0), vec![(0, 2), (6, 8)]);
    assert_eq!(sector("ab", "abxabyab", 3, 1), vec![]);
    // Matches in sector mode may overlap.
    assert_eq!(sector("a+", "aaa", 1, 0), vec![(0, 3), (1, 3), (2, 3)]);
    assert_eq!(sector("a*", "ba", 1, 0), vec![(0, 0), (1, 2), (2, 2)]);
}

#[test]
fn sector_end_anchor() {
    let program = compile("ab", Flags::none().with(Flag::Sector));
    let cursor =
        ScanCursor::new(&program, Sector::new(1, 0).end_anchor(Some(4)))
            .unwrap();

    let scanner = Scanner::new(&program, b"abxabyab", cursor).unwrap();
    assert_eq!(spans(scanner), vec![(0, 2), (3, 5)]);
}

#[test]
fn sector_equivalence() {
    let input = "abcabcabcabc";

    for pattern in ["abc", "b|ca", "[a-c]{2}", "c?a"] {
        let expected = sector(pattern, input, 1, 0);

        for stride in [2, 3, 4, 6] {
            let mut union: Vec<(usize, usize)> = (0..stride)
                .flat_map(|offset| sector(pattern, input, stride, offset))
                .collect();

            union.sort();
            union.dedup();

            assert_eq!(
                union, expected,
                "pattern {} stride {}",
                pattern, stride
            );
        }
    }
}

#[test]
fn invalid_sector() {
    let program = compile("a", Flags::none().with(Flag::Sector));

    assert!(matches!(
        scan(&program, b"aaa", 0, 0),
        Err(ScanError::InvalidSector)
    ));

    assert!(matches!(
        ScanCursor::new(&program, Sector::new(0, 0)),
        Err(ScanError::InvalidSector)
    ));

    let program = compile("a", Flags::none());

    assert!(matches!(
        scan(&program, b"aaa", 0, 0),
        Err(ScanError::InvalidSector)
    ));
}

#[test]
fn anchored_cursor() {
    let program = compile("ab", Flags::none());

    let mut cursor = ScanCursor::anchored(&program, 1);
    let result = run(&program, &mut cursor, b"xab", None).unwrap().result;
    assert_eq!(result.into_match().map(|m| m.span()), Some((1, 3)));
    assert!(cursor.is_finished());

    let mut cursor = ScanCursor::anchored(&program, 0);
    let result = run(&program, &mut cursor, b"xab", None).unwrap().result;
    assert_eq!(result, MatchResult::NoMatch);
}

#[test]
fn run_advances_cursor() {
    let program = compile("ab", Flags::none());
    let mut cursor = ScanCursor::for_search(&program, 0);

    let run_1 = run(&program, &mut cursor, b"xabxab", None).unwrap();
    assert_eq!(run_1.result.into_match().map(|m| m.span()), Some((1, 3)));
    assert_eq!(cursor.position(), 3);
    assert!(run_1.steps > 0);
    assert_eq!(run_1.trace, None);

    let run_2 = run(&program, &mut cursor, b"xabxab", None).unwrap();
    assert_eq!(run_2.result.into_match().map(|m| m.span()), Some((4, 6)));

    let run_3 = run(&program, &mut cursor, b"xabxab", None).unwrap();
    assert_eq!(run_3.result, MatchResult::NoMatch);
    assert!(cursor.is_finished());

    // A finished cursor keeps returning `NoMatch`.
    let run_4 = run(&program, &mut cursor, b"xabxab", None).unwrap();
    assert_eq!(run_4.result, MatchResult::NoMatch);
}

#[test]
fn program_mismatch() {
    let program_a = compile("a", Flags::none());
    let program_b = compile("b", Flags::none());

    let mut cursor = ScanCursor::for_search(&program_a, 0);

    match run(&program_b, &mut cursor, b"ab", None) {
        Err(ScanError::ProgramMismatch { expected, found }) => {
            assert_eq!(expected, program_b.id());
            assert_eq!(found, program_a.id());
        }
        other => panic!("unexpected result {:?}", other),
    }

    assert!(matches!(
        Scanner::new(&program_b, b"ab", cursor),
        Err(ScanError::ProgramMismatch { .. })
    ));
}

#[test]
fn suspend_and_resume() {
    let program = compile("ab", Flags::none());
    let mut cursor = ScanCursor::for_search(&program, 0);

    let result = run(&program, &mut cursor, b"xxab", Some(1)).unwrap();
    assert!(result.result.is_suspended());
    assert_eq!(result.steps, 1);
    assert_eq!(cursor.position(), 1);
    assert!(cursor.snapshot().is_some());

    // A zero budget still makes progress.
    let result = run(&program, &mut cursor, b"xxab", Some(0)).unwrap();
    assert!(result.result.is_suspended());
    assert_eq!(cursor.position(), 2);

    let result = run(&program, &mut cursor, b"xxab", None).unwrap();
    assert_eq!(result.result.into_match().map(|m| m.span()), Some((2, 4)));
    assert!(cursor.snapshot().is_none());
}

#[test]
fn suspend_resume_equivalence() {
    let input = b"foo bar foobar barfoo foofoo";

    for (pattern, flags) in [
        ("foo|bar", Flags::none()),
        ("(fo+)(bar)?", Flags::none()),
        ("o{1,100}", Flags::none()),
        ("ba?r|o", Flags::none().with(Flag::Sector)),
    ] {
        let program = compile(pattern, flags);
        let expected = spans(scan(&program, input, 1, 0).unwrap());

        for budget in [1, 2, 3, 7, 100] {
            let mut scanner =
                scan(&program, input, 1, 0).unwrap().budget(Some(budget));

            let mut matches = Vec::new();
            let mut suspensions = 0;

            loop {
                match scanner.advance() {
                    ScanStep::Match(m) => matches.push(m.span()),
                    ScanStep::Suspended => suspensions += 1,
                    ScanStep::Finished => break,
                }
            }

            assert_eq!(
                matches, expected,
                "{} with budget {}",
                pattern, budget
            );

            if budget == 1 {
                assert!(suspensions > 0);
            }
        }
    }
}

#[test]
fn cursor_serialization() {
    let program = compile("ab", Flags::none());
    let input = b"xxabxxab";

    let mut scanner = scan(&program, input, 1, 0).unwrap().budget(Some(1));
    assert_eq!(scanner.advance(), ScanStep::Suspended);

    let cursor = scanner.into_cursor();
    let bytes = cursor.serialize().unwrap();
    let restored = ScanCursor::deserialize(&bytes).unwrap();

    assert_eq!(restored, cursor);
    assert_eq!(restored.position(), 1);

    let scanner =
        Scanner::new(&program, input, restored).unwrap().budget(Some(1));
    assert_eq!(spans(scanner), vec![(2, 4), (6, 8)]);

    let mut buf = Vec::new();
    cursor.serialize_into(&mut buf).unwrap();
    assert_eq!(
        ScanCursor::deserialize_from(buf.as_slice()).unwrap(),
        cursor
    );

    assert!(matches!(
        ScanCursor::deserialize(b"not a cursor"),
        Err(SerializationError::InvalidFormat)
    ));

    assert!(matches!(
        ScanCursor::deserialize(b"SECTOREX"),
        Err(SerializationError::InvalidEncoding(_))
    ));
}

#[test]
fn tampered_cursors() {
    let program = compile("(a)(b+)", Flags::none());
    let input = b"xxabbbxab";

    let mut scanner = scan(&program, input, 1, 0).unwrap().budget(Some(4));
    assert_eq!(scanner.advance(), ScanStep::Suspended);

    let cursor = scanner.into_cursor();
    assert!(!cursor.snapshot().unwrap().threads().is_empty());

    let bytes = cursor.serialize().unwrap();

    // Truncated cursors are rejected.
    for len in 0..bytes.len() {
        assert!(ScanCursor::deserialize(&bytes[..len]).is_err());
    }

    // Cursors with a flipped byte are either rejected, or produce some
    // result when used, never a panic.
    let mut rejected = 0;

    for i in b"SECTOREX".len()..bytes.len() {
        for mask in [0x01, 0x80, 0xff] {
            let mut tampered = bytes.clone();
            tampered[i] ^= mask;

            let mut cursor = match ScanCursor::deserialize(&tampered) {
                Ok(cursor) => cursor,
                Err(_) => continue,
            };

            match run(&program, &mut cursor, input, Some(100)) {
                Err(ScanError::CorruptedCursor { program: id }) => {
                    assert_eq!(id, program.id());
                    rejected += 1;
                }
                Err(ScanError::ProgramMismatch { .. }) | Ok(_) => {}
                Err(err) => panic!("unexpected error {:?}", err),
            }
        }
    }

    assert!(rejected > 0);
}

#[test]
fn invalid_utf8_diagnostics() {
    let program = compile("b", Flags::none());
    let mut scanner = scan(&program, b"a\xffb", 1, 0).unwrap();

    assert_eq!(scanner.next().map(|m| m.span()), Some((2, 3)));
    assert_eq!(scanner.next(), None);
    assert_eq!(
        scanner.diagnostics(),
        &[RuntimeError::InvalidBoundary { offset: 1 }]
    );
}

#[test]
fn scanner_trace() {
    let program = compile("b", Flags::none().with(Flag::XTrace));
    let mut scanner = scan(&program, b"ab", 1, 0).unwrap();

    assert_eq!(scanner.next().map(|m| m.span()), Some((1, 2)));
    assert_eq!(
        scanner.trace(),
        Some(concat!(
            "00000: 'a' threads=1\n",
            "00001: 'b' threads=1\n",
            "00002: end threads=2\n",
        ))
    );

    // The second run starts where the match ended.
    assert_eq!(scanner.next(), None);
    assert_eq!(
        scanner.trace().map(|trace| trace.lines().count()),
        Some(4)
    );
}
