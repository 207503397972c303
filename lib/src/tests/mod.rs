/*! End-to-end tests. */
use pretty_assertions::assert_eq;

use crate::{
    CompileError, Error, Flag, Flags, MatchResult, Regex, RegexBuilder,
    ScanConfig, ScanCursor, ScanError, ScanStep, SectorConfig, UnknownFlag,
    VM_MAX_STATE_SIZE,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

macro_rules! matches_re {
    ($re:expr, $flags:expr, $input:expr, $expected:expr) => {{
        init();
        let re = Regex::new($re, $flags).unwrap();
        let spans: Vec<(usize, usize)> =
            re.find_all($input).iter().map(|m| m.span()).collect();
        assert_eq!(spans, $expected, "\n\npattern `{}`", $re);
    }};
    ($re:expr, $input:expr, $expected:expr) => {{
        matches_re!($re, Flags::none(), $input, $expected)
    }};
}

macro_rules! no_match {
    ($re:expr, $flags:expr, $input:expr) => {{
        matches_re!($re, $flags, $input, Vec::<(usize, usize)>::new())
    }};
    ($re:expr, $input:expr) => {{
        no_match!($re, Flags::none(), $input)
    }};
}

fn distinct_chars(n: usize) -> String {
    (0..n as u32).filter_map(|i| char::from_u32(0x4e00 + i)).collect()
}

#[test]
fn scenario_a() {
    matches_re!("a[bc]+", b"abbc d", vec![(0, 4)]);
}

#[test]
fn scenario_b() {
    let multiline = Flags::none().with(Flag::Multiline);
    matches_re!("^x", multiline, b"y\nx\n", vec![(2, 3)]);
    no_match!("^x", b"y\nx\n");
}

#[test]
fn scenario_c() {
    no_match!("a.b", b"a\nb");
    matches_re!(
        "a.b",
        Flags::none().with(Flag::DotAll),
        b"a\nb",
        vec![(0, 3)]
    );
}

#[test]
fn scenario_d() {
    init();
    let re = Regex::new("(a|ab)", Flags::none().with(Flag::IndexAlt)).unwrap();
    let m = re.search(b"ab").unwrap();

    assert_eq!(m.span(), (0, 1));
    assert_eq!(m.group(1), Some(0..1));
    assert_eq!(m.alternative(), Some(0));
    assert_eq!(re.keypattern(&m), Some("a"));
}

#[test]
fn indexed_alternatives() {
    init();
    let re =
        Regex::new("foo|bar|baz", Flags::none().with(Flag::IndexAlt)).unwrap();

    let matches = re.find_all(b"xxbazfoo");

    assert_eq!(
        matches.iter().map(|m| m.span()).collect::<Vec<_>>(),
        vec![(2, 5), (5, 8)]
    );
    assert_eq!(
        matches.iter().map(|m| m.alternative()).collect::<Vec<_>>(),
        vec![Some(2), Some(0)]
    );
    assert_eq!(
        matches.iter().map(|m| re.keypattern(m)).collect::<Vec<_>>(),
        vec![Some("baz"), Some("foo")]
    );

    let re = Regex::new("foo|bar|baz", Flags::none()).unwrap();
    let m = re.search(b"xxbazfoo").unwrap();

    assert_eq!(m.alternative(), None);
    assert_eq!(re.keypattern(&m), None);
}

#[test]
fn leftmost_first() {
    matches_re!("a|ab", b"ab", vec![(0, 1)]);
    matches_re!("ab|a", b"ab", vec![(0, 2)]);
    matches_re!("a+?", b"aaa", vec![(0, 1), (1, 2), (2, 3)]);
    matches_re!("a??b", b"ab", vec![(0, 2)]);
    matches_re!("x*", b"ab", vec![(0, 0), (1, 1), (2, 2)]);
}

#[test]
fn state_budget_boundary() {
    init();

    let root =
        crate::parse(&distinct_chars(VM_MAX_STATE_SIZE), Flags::none())
            .unwrap();
    let (root, classes) = crate::canonicalize(root);
    let program = crate::compile(root, classes).unwrap();

    assert_eq!(program.state_count(), VM_MAX_STATE_SIZE);

    let root =
        crate::parse(&distinct_chars(VM_MAX_STATE_SIZE + 1), Flags::none())
            .unwrap();
    let (root, classes) = crate::canonicalize(root);

    assert_eq!(
        crate::compile(root, classes).err(),
        Some(CompileError::StateOverflow {
            count: VM_MAX_STATE_SIZE + 1,
            limit: VM_MAX_STATE_SIZE
        })
    );

    assert_eq!(
        Regex::new(&distinct_chars(VM_MAX_STATE_SIZE + 1), Flags::none())
            .err(),
        Some(Error::CompileError(CompileError::StateOverflow {
            count: VM_MAX_STATE_SIZE + 1,
            limit: VM_MAX_STATE_SIZE
        }))
    );
}

#[test]
fn shared_classes() {
    init();

    // Repeated classes are interned once, regardless of how many times
    // they appear or how large the repetition is.
    let re = Regex::new("[a-z]{100}[a-z]+[a-z]", Flags::none()).unwrap();
    assert_eq!(re.program().state_count(), 1);

    let re = Regex::new("(?:[a-z]|[0-9]){70}[abc-z]", Flags::none()).unwrap();
    assert_eq!(re.program().state_count(), 2);
}

#[test]
fn flag_independence() {
    init();

    let inputs: [&[u8]; 3] =
        [b"foo bar\nfoobar baz", b"aaaa bbbb abab", b"\xff\xfeab\n"];

    for (pattern, flags) in [
        (r"\bfoo\w*", Flags::none()),
        ("(a|b){2,80}", Flags::none()),
        ("^[a-z]+$", Flags::none().with(Flag::Multiline)),
        ("ab|ba", Flags::none().with(Flag::Sector)),
        ("a.", Flags::none().with(Flag::DotAll).with(Flag::IndexAlt)),
    ] {
        let plain = Regex::new(pattern, flags).unwrap();

        for debug_flag in [
            Flag::XTrace,
            Flag::XTraceVerbose,
            Flag::XDumpProg,
            Flag::XDumpParse,
        ] {
            let debug = Regex::new(pattern, flags.with(debug_flag)).unwrap();

            assert_eq!(debug.program().id(), plain.program().id());

            for input in inputs {
                assert_eq!(
                    debug.find_all(input),
                    plain.find_all(input),
                    "pattern `{}`",
                    pattern
                );
            }
        }
    }
}

#[test]
fn sector_equivalence() {
    init();

    let input = b"MZ\x90\x00MZ\x90\x00PE\x00\x00MZPE\x00\x00";

    for pattern in ["MZ", r"PE\x00{2}", "Z.|P", r"\x00+"] {
        let build = |stride, offset| {
            RegexBuilder::new(pattern)
                .flags(Flags::none().with(Flag::Sector))
                .sector(stride, offset)
                .build()
                .unwrap()
        };

        let expected = build(1, 0).find_all(input);

        for stride in [2, 4, 8] {
            let mut union: Vec<_> = (0..stride)
                .flat_map(|offset| build(stride, offset).find_all(input))
                .collect();

            union.sort_by_key(|m| m.span());
            union.dedup();

            assert_eq!(union, expected, "pattern `{}`", pattern);
        }
    }
}

#[test]
fn sector_end_anchor() {
    init();

    let re = RegexBuilder::new("MZ")
        .flags(Flags::none().with(Flag::Sector))
        .sector(4, 0)
        .end_anchor(Some(8))
        .build()
        .unwrap();

    let spans: Vec<_> = re
        .find_iter(b"MZ..MZ..MZ..")
        .map(|m| m.span())
        .collect();

    assert_eq!(spans, vec![(0, 2), (4, 6)]);
}

#[test]
fn resume_across_serialization() {
    init();

    let re = Regex::new(r"(\w+)@(\w+)\.com", Flags::none()).unwrap();
    let input = b"write to joe@example.com or ann@test.com today";

    let expected = re.find_all(input);
    assert_eq!(expected.len(), 2);

    let program = re.program();

    for budget in [1, 5, 17] {
        let mut cursor = ScanCursor::for_search(program, 0);
        let mut matches = Vec::new();

        loop {
            let run = crate::run(program, &mut cursor, input, Some(budget))
                .unwrap();

            match run.result {
                MatchResult::Matched(m) => matches.push(m),
                MatchResult::NoMatch => break,
                MatchResult::Suspended(_) => {}
            }

            let bytes = cursor.serialize().unwrap();
            cursor = ScanCursor::deserialize(bytes).unwrap();
        }

        assert_eq!(matches, expected, "budget {}", budget);
    }
}

#[test]
fn cursor_of_another_program() {
    init();

    let re_1 = Regex::new("abc", Flags::none()).unwrap();
    let re_2 = Regex::new("abd", Flags::none()).unwrap();

    let bytes = ScanCursor::for_search(re_1.program(), 0).serialize().unwrap();
    let mut cursor = ScanCursor::deserialize(bytes).unwrap();

    assert!(matches!(
        crate::run(re_2.program(), &mut cursor, b"abd", None),
        Err(ScanError::ProgramMismatch { .. })
    ));

    assert!(crate::run(re_1.program(), &mut cursor, b"abd", None).is_ok());
}

#[test]
fn search_bounds() {
    init();

    let re = Regex::new("b+", Flags::none()).unwrap();
    let input = b"abbbc";

    assert_eq!(re.search_at(input, 2, 4).map(|m| m.span()), Some((2, 4)));
    assert_eq!(re.search_at(input, 0, 2).map(|m| m.span()), Some((1, 2)));
    assert_eq!(re.search_at(input, 4, 5).map(|m| m.span()), None);

    // Text before `pos` is visible to assertions.
    let re = Regex::new(r"\bfoo", Flags::none()).unwrap();
    assert_eq!(re.search_at(b"xfoo", 1, 4).map(|m| m.span()), None);
    assert_eq!(re.search_at(b" foo", 1, 4).map(|m| m.span()), Some((1, 4)));

    // Text after `endpos` is not.
    let re = Regex::new("a$", Flags::none()).unwrap();
    assert_eq!(re.search_at(b"abc", 0, 1).map(|m| m.span()), Some((0, 1)));
    assert!(!re.is_match(b"abc"));

    let re = Regex::new("foo", Flags::none()).unwrap();
    assert_eq!(re.match_at(b"xfoo", 1).map(|m| m.span()), Some((1, 4)));
    assert_eq!(re.match_at(b"xfoo", 0), None);
    assert_eq!(re.match_at(b"xfoo", 10), None);
}

#[test]
fn captures() {
    init();

    let re = Regex::new(
        r"(?P<year>\d{4})-(?P<month>\d{2})(-(\d{2}))?",
        Flags::none(),
    )
    .unwrap();

    assert_eq!(
        re.capture_names().collect::<Vec<_>>(),
        vec![Some("year"), Some("month"), None, None]
    );
    assert_eq!(re.groups(), 4);
    assert_eq!(re.group_index("month"), Some(2));
    assert_eq!(re.group_index("day"), None);

    let m = re.search(b"on 2024-05 ok").unwrap();

    assert_eq!(m.span(), (3, 10));
    assert_eq!(m.group(0), Some(3..10));
    assert_eq!(m.group(1), Some(3..7));
    assert_eq!(m.group(2), Some(8..10));
    assert_eq!(m.group(3), None);
    assert_eq!(m.group(4), None);
    assert_eq!(m.last_index(), Some(2));

    let m = re.search(b"2024-05-17").unwrap();

    assert_eq!(m.group(3), Some(7..10));
    assert_eq!(m.group(4), Some(8..10));
    assert_eq!(m.last_index(), Some(3));
    assert_eq!(re.last_group(&m), None);

    let groups = re.named_groups(&m);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups["year"], Some(0..4));
    assert_eq!(groups["month"], Some(5..7));
}

#[test]
fn last_closed_group() {
    init();

    let re = Regex::new("(a)(b(c))", Flags::none()).unwrap();
    let m = re.search(b"abc").unwrap();
    assert_eq!(m.last_index(), Some(2));

    let re = Regex::new("(?P<x>a)(?P<y>b)?", Flags::none()).unwrap();

    let m = re.search(b"ab").unwrap();
    assert_eq!(re.last_group(&m), Some("y"));

    let m = re.search(b"ac").unwrap();
    assert_eq!(m.last_index(), Some(1));
    assert_eq!(re.last_group(&m), Some("x"));
    assert_eq!(re.named_groups(&m)["y"], None);

    let re = Regex::new("a|b", Flags::none()).unwrap();
    let m = re.search(b"b").unwrap();
    assert_eq!(m.last_index(), None);
    assert_eq!(re.last_group(&m), None);
}

#[test]
fn case_insensitive() {
    let ignore_case = Flags::none().with(Flag::IgnoreCase);
    matches_re!("hello", ignore_case, b"HeLLo", vec![(0, 5)]);
    matches_re!("É", ignore_case, "café".as_bytes(), vec![(3, 5)]);
    matches_re!("[a-c]+", ignore_case, b"xAbCd", vec![(1, 4)]);
    no_match!("hello", b"HeLLo");
}

#[test]
fn verbose() {
    let verbose = Flags::none().with(Flag::Verbose);
    matches_re!("a b # comment\n c", verbose, b"abc", vec![(0, 3)]);
    matches_re!(r"a\ b", verbose, b"a b", vec![(0, 3)]);
}

#[test]
fn counted_repetitions() {
    let a150 = "a".repeat(150);
    let a99 = "a".repeat(99);
    let ab1000 = "ab".repeat(1000);

    matches_re!("a{100,200}", a150.as_bytes(), vec![(0, 150)]);
    no_match!("a{100,200}", a99.as_bytes());
    matches_re!("a{100,200}?", a150.as_bytes(), vec![(0, 100)]);
    matches_re!("(?:ab){1000}", ab1000.as_bytes(), vec![(0, 2000)]);

    let input = format!("x{}y", ab1000);
    matches_re!("x(?:ab){70,}y", input.as_bytes(), vec![(0, 2002)]);
}

#[test]
fn asynchronous() {
    let asynchronous = Flags::none().with(Flag::XAsynchronous);
    matches_re!(r"\xe9", asynchronous, b"caf\xe9", vec![(3, 4)]);
    matches_re!(r"caf.", asynchronous, b"caf\xe9", vec![(0, 4)]);
    no_match!(r"caf.", b"caf\xe9");
}

#[test]
fn hex_escapes_match_raw_bytes() {
    matches_re!(r"\xe9", b"caf\xe9", vec![(3, 4)]);
    matches_re!(r"MZ\x90\x00", b"..MZ\x90\x00..", vec![(2, 6)]);
    no_match!(r"MZ\x90", b"MZ\xc2\x90");
    no_match!(r"\xe9", "café".as_bytes());

    // Raw bytes inside a valid character.
    matches_re!(r"\xc3\xa9", "café".as_bytes(), vec![(3, 5)]);
    matches_re!(r"f\xc3", "café".as_bytes(), vec![(2, 4)]);

    // Byte classes and characters in the same pattern.
    matches_re!(r"[\x80-\xff]+é", "\u{e9}é".as_bytes(), vec![(0, 4)]);
    matches_re!(
        r"[\x80-\xff]{2}",
        b"a\xff\xfeb\x90",
        vec![(1, 3)]
    );
    matches_re!(r"[^\x00]+", b"\x00a\x90\x00", vec![(1, 3)]);

    // Characters still match as a whole.
    matches_re!(r"caf.", "café".as_bytes(), vec![(0, 5)]);
    matches_re!(r"\x{e9}", "café".as_bytes(), vec![(3, 5)]);
}

#[test]
fn errors() {
    init();

    assert!(matches!(
        Regex::new("(ab", Flags::none()),
        Err(Error::SyntaxError(_))
    ));

    assert!(matches!(
        Regex::new("a{3,2}", Flags::none()),
        Err(Error::SyntaxError(_))
    ));

    match Regex::new("", Flags::none()) {
        Err(Error::SyntaxError(err)) => assert_eq!(err.offset, 0),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }

    assert!(matches!(
        RegexBuilder::new("a").sector(0, 0).build(),
        Err(Error::ScanError(ScanError::InvalidSector))
    ));
}

#[test]
fn dumps() {
    init();

    let re = Regex::new("a+b", Flags::none()).unwrap();
    assert_eq!(re.program_dump(), None);
    assert_eq!(re.parse_dump(), None);

    let re = Regex::new(
        "a+b",
        Flags::none().with(Flag::XDumpProg).with(Flag::XDumpParse),
    )
    .unwrap();

    assert_eq!(re.program_dump(), Some(re.program().listing().as_str()));

    let dump = re.parse_dump().unwrap();
    assert!(dump.contains("repeat {1,inf}"));
    assert!(dump.contains("char 'a'"));
    assert!(dump.contains("char 'b'"));
    assert!(!dump.contains("compiled"));
    assert!(!dump.contains("class"));
}

#[test]
fn builder_from_config() {
    init();

    let config = ScanConfig {
        flags: vec!["sector".to_string()],
        sector: SectorConfig { stride: 4, offset: 0, end_anchor: None },
        budget: Some(1),
    };

    let re = RegexBuilder::new("MZ").config(&config).unwrap().build().unwrap();
    let input = b"MZ..xMZ.MZ..";

    let mut scanner = re.find_iter(input);
    assert_eq!(scanner.advance(), ScanStep::Suspended);
    assert_eq!(
        scanner.map(|m| m.span()).collect::<Vec<_>>(),
        vec![(0, 2), (8, 10)]
    );

    let config = ScanConfig { flags: vec!["bogus".to_string()], ..config };

    assert_eq!(
        RegexBuilder::new("MZ").config(&config).err(),
        Some(UnknownFlag("bogus".to_string()))
    );
}
