use bitmask::bitmask;
use serde::{Deserialize, Serialize};

bitmask! {
    /// Flags that control how a pattern is parsed, compiled and executed.
    ///
    /// Flags are fixed once a [`crate::Program`] is compiled, the program
    /// keeps a copy of them and every later stage reads them from there.
    /// The `X*` flags are debugging aids: they produce dumps and traces as
    /// side values but never change what matches.
    ///
    /// * `IgnoreCase`: case-fold character classes during canonicalization.
    /// * `Multiline`: `^` and `$` also match at line terminators.
    /// * `DotAll`: `.` also matches line terminators.
    /// * `Verbose`: strip unescaped whitespace and `#` comments first.
    /// * `IndexAlt`: report which top-level alternative matched.
    /// * `Sector`: try anchored matches at `offset + k * stride` only.
    /// * `XTrace`, `XTraceVerbose`: produce an execution trace.
    /// * `XDumpProg`, `XDumpParse`: produce program and parse tree dumps.
    /// * `XAsynchronous`: step one raw byte at a time instead of one
    ///   UTF-8 character.
    #[derive(Debug, Hash, Serialize, Deserialize)]
    pub mask Flags: u16 where flags Flag {
        IgnoreCase     = 0x0001,
        Multiline      = 0x0002,
        DotAll         = 0x0004,
        Verbose        = 0x0008,
        IndexAlt       = 0x0010,
        Sector         = 0x0020,
        XTrace         = 0x0040,
        XTraceVerbose  = 0x0080,
        XDumpProg      = 0x0100,
        XDumpParse     = 0x0200,
        XAsynchronous  = 0x0400,
    }
}

impl Flags {
    /// Returns a copy of this set with `flag` added.
    pub fn with(mut self, flag: Flag) -> Self {
        self.set(flag);
        self
    }

    /// Returns a copy of this set without `flag`.
    pub fn without(mut self, flag: Flag) -> Self {
        self.unset(flag);
        self
    }

    /// The subset of flags that can change the compiled program.
    ///
    /// Debug flags are removed, so two programs compiled from the same
    /// pattern with and without tracing have the same identity.
    pub fn semantic(self) -> Self {
        self.without(Flag::XTrace)
            .without(Flag::XTraceVerbose)
            .without(Flag::XDumpProg)
            .without(Flag::XDumpParse)
    }

    /// Returns true if execution steps one byte at a time.
    #[inline]
    pub fn is_asynchronous(&self) -> bool {
        self.contains(Flag::XAsynchronous)
    }

    /// Returns true if any of the tracing flags is set.
    #[inline]
    pub fn tracing(&self) -> bool {
        self.contains(Flag::XTrace) || self.contains(Flag::XTraceVerbose)
    }
}

impl Flag {
    /// Looks up a flag by its name, ignoring case.
    ///
    /// Accepts the names used in configuration files, like `"ignorecase"`,
    /// `"dotall"` or `"xdumpprog"`.
    pub fn from_name(name: &str) -> Option<Flag> {
        let flag = match name.to_ascii_lowercase().as_str() {
            "ignorecase" | "i" => Flag::IgnoreCase,
            "multiline" | "m" => Flag::Multiline,
            "dotall" | "s" => Flag::DotAll,
            "verbose" | "x" => Flag::Verbose,
            "indexalt" => Flag::IndexAlt,
            "sector" => Flag::Sector,
            "xtrace" => Flag::XTrace,
            "xtrace_verbose" | "xtraceverbose" => Flag::XTraceVerbose,
            "xdumpprog" => Flag::XDumpProg,
            "xdumpparse" => Flag::XDumpParse,
            "xasynchronous" => Flag::XAsynchronous,
            _ => return None,
        };
        Some(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::{Flag, Flags};

    #[test]
    fn semantic_flags() {
        let flags = Flags::none()
            .with(Flag::IgnoreCase)
            .with(Flag::XTrace)
            .with(Flag::XDumpProg);

        assert!(flags.tracing());
        assert!(!flags.semantic().tracing());
        assert!(flags.semantic().contains(Flag::IgnoreCase));
        assert!(!flags.semantic().contains(Flag::XDumpProg));
    }

    #[test]
    fn flag_names() {
        assert!(matches!(Flag::from_name("DOTALL"), Some(Flag::DotAll)));
        assert!(matches!(Flag::from_name("i"), Some(Flag::IgnoreCase)));
        assert!(Flag::from_name("bogus").is_none());
    }
}
