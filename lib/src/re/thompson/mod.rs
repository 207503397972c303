/*! A regexp compiler based on the [Thompson's construction][1] algorithm that
produces code for the Pike VM described in Russ Cox's article
[Regular Expression Matching: the Virtual Machine Approach][2].

The main difference with the algorithms described in the cited articles is
the way in which repetitions are handled. In the original algorithm a
repetition like `abc{3}` is implemented by repeating the pattern three
times, as in `abcabcabc`, and `abc{2,4}` is expressed like
`abcabc(abc)?(abc)?`.

This approach is simple, but the size of the code is proportional to the
number of repetitions. Here only repetitions with small bounds are
expanded, the rest use the `REPEAT` instruction together with a counter
that is part of each thread. The instruction pointer and the counters are
the thread's state, and threads are deduplicated on both.

The number of distinct character classes used by a program is bounded by
[`crate::VM_MAX_STATE_SIZE`], classes are shared between all the places in
the pattern where they appear.

[1]: https://en.wikipedia.org/wiki/Thompson%27s_construction
[2]: https://swtch.com/~rsc/regexp/regexp2.html
*/

pub use compiler::Compiler;
pub use instr::Instr;
pub(crate) use pikevm::Outcome;
pub use pikevm::{PikeVM, Snapshot, Thread};
pub use program::Program;

mod compiler;
mod instr;
mod pikevm;
mod program;
