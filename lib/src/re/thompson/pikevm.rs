use std::cmp;
use std::fmt::Write;
use std::mem;

use bstr::{decode_last_utf8, decode_utf8};
use serde::{Deserialize, Serialize};

use super::instr::{apply_offset, Instr};
use super::program::Program;
use crate::errors::RuntimeError;
use crate::flags::Flag;
use crate::re::bitmapset::BitmapSet;
use crate::re::VM_MAX_COUNTERS;
use crate::scanner::Match;

/// Repetition counters carried by each thread.
pub(crate) type Counters = [u32; VM_MAX_COUNTERS];

/// A thread of the Pike VM.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Thread {
    ip: usize,
    /// Position of the next input unit read by this thread. It is ahead of
    /// the VM position while the thread waits for the end of a multi-byte
    /// character.
    at: usize,
    counters: Counters,
    /// Capture slots. Slots `2*g` and `2*g+1` are the start and end of
    /// group `g`, group 0 is the whole match.
    slots: Vec<Option<usize>>,
    alt: Option<u16>,
    /// Last group closed by this thread.
    last_group: Option<u16>,
}

impl Thread {
    pub(crate) fn new(program: &Program, pos: usize) -> Self {
        let mut slots = vec![None; 2 * (program.groups() + 1)];
        slots[0] = Some(pos);
        Self {
            ip: 0,
            at: pos,
            counters: Counters::default(),
            slots,
            alt: None,
            last_group: None,
        }
    }

    /// Instruction pointer.
    #[inline]
    pub fn ip(&self) -> usize {
        self.ip
    }

    fn into_match(self, end: usize) -> Match {
        let start = self.slots[0].unwrap_or(end);
        let groups = self.slots[2..]
            .chunks(2)
            .map(|slot| match slot {
                [Some(s), Some(e)] if s <= e => Some(*s..*e),
                _ => None,
            })
            .collect();
        Match {
            range: start..end,
            groups,
            alternative: self.alt,
            last_group: self.last_group,
        }
    }

    /// Moves past the current instruction, reading the next unit at `at`.
    fn advance(mut self, at: usize) -> Self {
        self.ip += 1;
        self.at = at;
        self
    }
}

/// Execution state of the Pike VM between two steps.
///
/// Holds everything needed for resuming an execution: the position, the
/// live threads in priority order and the best match found so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    start: usize,
    pos: usize,
    /// Start of the next input unit, where new threads can be started.
    boundary: usize,
    anchored: bool,
    threads: Vec<Thread>,
    best: Option<Match>,
}

impl Snapshot {
    /// Creates the state for an execution that starts at `start`. If
    /// `anchored` is true, matches must start exactly at `start`.
    pub(crate) fn new(start: usize, anchored: bool) -> Self {
        Self {
            start,
            pos: start,
            boundary: start,
            anchored,
            threads: Vec::new(),
            best: None,
        }
    }

    /// Position where the execution started.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Position of the next input unit to be read.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Live threads, in priority order.
    #[inline]
    pub fn threads(&self) -> &[Thread] {
        self.threads.as_slice()
    }

    /// Checks the parts of the snapshot that don't depend on the program.
    pub(crate) fn is_well_formed(&self) -> bool {
        let slots = self.threads.first().map_or(2, |t| t.slots.len());
        self.start <= self.pos
            && slots >= 2
            && slots % 2 == 0
            && self.threads.iter().all(|t| t.slots.len() == slots)
    }

    /// Returns true if every thread in the snapshot can be executed by
    /// `program`.
    pub(crate) fn fits(&self, program: &Program) -> bool {
        let slots = 2 * (program.groups() + 1);
        self.threads
            .iter()
            .all(|t| t.ip < program.code.len() && t.slots.len() == slots)
    }
}

/// Outcome of [`PikeVM::execute`].
#[derive(Debug)]
pub(crate) enum Outcome {
    Matched(Match),
    NoMatch,
    Suspended,
}

/// An input unit.
#[derive(Clone, Copy, Debug)]
enum Unit {
    /// A character and its length in bytes.
    Char(u32, usize),
    /// A single byte. In asynchronous mode every unit is a byte, otherwise
    /// only bytes that don't start a valid UTF-8 character are.
    Byte(u8),
    End,
}

impl Unit {
    fn len(self) -> usize {
        match self {
            Unit::Char(_, len) => len,
            Unit::Byte(_) => 1,
            Unit::End => 0,
        }
    }
}

/// Input around the position where an epsilon closure is computed.
pub(crate) struct Context {
    pub pos: usize,
    pub prev: Option<u32>,
    pub curr: Option<u32>,
    pub at_end: bool,
}

/// Represents a [Pike's VM](https://swtch.com/~rsc/regexp/regexp2.html) that
/// executes a [`Program`].
pub struct PikeVM<'r> {
    program: &'r Program,
    /// Step one byte at a time instead of one character.
    asynchronous: bool,
    /// Stack used by [`epsilon_closure`].
    stack: Vec<Thread>,
    /// Number of steps executed so far.
    steps: usize,
    diagnostics: Vec<RuntimeError>,
    trace: Option<String>,
    verbose: bool,
}

impl<'r> PikeVM<'r> {
    /// Creates a new [`PikeVM`] for the given program.
    pub fn new(program: &'r Program) -> Self {
        let flags = program.flags();
        Self {
            program,
            asynchronous: flags.is_asynchronous(),
            stack: Vec::new(),
            steps: 0,
            diagnostics: Vec::new(),
            trace: flags.tracing().then(String::new),
            verbose: flags.contains(Flag::XTraceVerbose),
        }
    }

    /// Number of steps executed so far.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// True if the VM steps one byte at a time.
    #[inline]
    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    /// Returns the diagnostics collected so far.
    pub fn take_diagnostics(&mut self) -> Vec<RuntimeError> {
        mem::take(&mut self.diagnostics)
    }

    /// Returns the execution trace, if tracing is enabled.
    pub fn take_trace(&mut self) -> Option<String> {
        self.trace.take()
    }

    /// Runs the program over `input`, continuing from `snapshot`.
    ///
    /// Each step expands the threads that reached the current position and
    /// lets them consume the input there. Before that, a new thread is
    /// started if the position is the start of an input unit, unless the
    /// execution is anchored or a match was already found. New threads have
    /// the lowest priority, so the leftmost match is always preferred.
    ///
    /// A class consumes a whole character when the character is in the
    /// class, and a single byte when that raw byte is in the class. A
    /// thread that consumed a character waits until the VM reaches the end
    /// of it, so threads stay in priority order whatever they consumed.
    ///
    /// If `budget` is `Some(n)` the execution stops once the VM executed
    /// `n` steps since it was created, returning [`Outcome::Suspended`] and
    /// leaving in `snapshot` the state needed for resuming.
    pub(crate) fn execute(
        &mut self,
        input: &[u8],
        snapshot: &mut Snapshot,
        budget: Option<usize>,
    ) -> Outcome {
        let program = self.program;

        let mut pos = snapshot.pos;
        let mut boundary = snapshot.boundary;
        let mut best = snapshot.best.take();
        let mut threads = mem::take(&mut snapshot.threads);
        let mut active = Vec::new();
        let mut next_threads = Vec::new();
        let mut visited = BitmapSet::new();

        loop {
            let at_boundary = pos >= boundary;
            let seed = at_boundary
                && best.is_none()
                && (!snapshot.anchored || pos == snapshot.start);

            if threads.is_empty() && !seed {
                break;
            }

            if let Some(budget) = budget {
                if self.steps >= budget {
                    snapshot.pos = pos;
                    snapshot.boundary = boundary;
                    snapshot.threads = threads;
                    snapshot.best = best;
                    return Outcome::Suspended;
                }
            }

            self.steps += 1;

            let unit = self.unit_at(input, pos);
            let ctx = self.context(input, pos, unit);

            if at_boundary {
                boundary = pos + unit.len();
            }

            for thread in threads.drain(..) {
                if thread.at > pos {
                    active.push(thread);
                } else {
                    epsilon_closure(
                        program,
                        thread,
                        &ctx,
                        &mut self.stack,
                        &mut visited,
                        &mut active,
                    );
                }
            }

            if seed {
                epsilon_closure(
                    program,
                    Thread::new(program, pos),
                    &ctx,
                    &mut self.stack,
                    &mut visited,
                    &mut active,
                );
            }

            visited.clear();

            if self.trace.is_some() {
                self.trace_step(pos, unit, &active);
            }

            let mut invalid = false;

            for thread in active.drain(..) {
                if thread.at > pos {
                    next_threads.push(thread);
                    continue;
                }
                match &program.code[thread.ip] {
                    Instr::Accept => {
                        // Lower priority threads are discarded.
                        best = Some(thread.into_match(pos));
                        break;
                    }
                    Instr::MatchClass(class) => {
                        let class = program.class(*class);
                        match unit {
                            Unit::Char(c, len) => {
                                let raw = len > 1
                                    && class.contains_byte(input[pos]);
                                if class.contains(c) {
                                    if raw {
                                        next_threads.push(
                                            thread.clone().advance(pos + len),
                                        );
                                    } else {
                                        next_threads
                                            .push(thread.advance(pos + len));
                                        continue;
                                    }
                                }
                                if raw {
                                    next_threads.push(thread.advance(pos + 1));
                                }
                            }
                            Unit::Byte(b) => {
                                if class.contains_byte(b)
                                    || (self.asynchronous
                                        && class.contains(b as u32))
                                {
                                    next_threads.push(thread.advance(pos + 1));
                                } else if !self.asynchronous {
                                    invalid = true;
                                }
                            }
                            Unit::End => {}
                        }
                    }
                    _ => unreachable!(),
                }
            }

            if invalid {
                self.diagnostics
                    .push(RuntimeError::InvalidBoundary { offset: pos });
            }

            if matches!(unit, Unit::End) {
                break;
            }

            // The next position is the nearest one where some thread reads
            // its input, or the next boundary while threads can be started.
            let mut next = next_threads.iter().map(|t| t.at).min();

            if best.is_none() && !snapshot.anchored {
                next = Some(next.map_or(boundary, |n| cmp::min(n, boundary)));
            }

            mem::swap(&mut threads, &mut next_threads);

            match next {
                Some(next) => pos = next,
                None => break,
            }
        }

        threads.clear();
        snapshot.pos = pos;
        snapshot.boundary = boundary;

        match best {
            Some(m) => Outcome::Matched(m),
            None => Outcome::NoMatch,
        }
    }

    fn unit_at(&self, input: &[u8], pos: usize) -> Unit {
        let rest = match input.get(pos..) {
            Some(rest) if !rest.is_empty() => rest,
            _ => return Unit::End,
        };
        if self.asynchronous {
            return Unit::Byte(rest[0]);
        }
        match decode_utf8(rest) {
            (Some(c), len) => Unit::Char(c as u32, len),
            (None, _) => Unit::Byte(rest[0]),
        }
    }

    fn context(&self, input: &[u8], pos: usize, unit: Unit) -> Context {
        let prev = match pos.checked_sub(1).and_then(|p| input.get(p)) {
            None => None,
            Some(byte) if self.asynchronous => Some(*byte as u32),
            Some(_) => decode_last_utf8(&input[..pos]).0.map(|c| c as u32),
        };
        let curr = match unit {
            Unit::Char(c, _) => Some(c),
            Unit::Byte(b) if self.asynchronous => Some(b as u32),
            _ => None,
        };
        Context { pos, prev, curr, at_end: matches!(unit, Unit::End) }
    }

    fn trace_step(&mut self, pos: usize, unit: Unit, threads: &[Thread]) {
        let verbose = self.verbose;
        let trace = match self.trace.as_mut() {
            Some(trace) => trace,
            None => return,
        };
        let unit = match unit {
            Unit::Char(c, _) => match char::from_u32(c) {
                Some(c) => format!("{:?}", c),
                None => format!("{:#x}", c),
            },
            Unit::Byte(b) => format!("{:#04x}", b),
            Unit::End => "end".to_string(),
        };
        // Threads waiting for a later position are not shown.
        let threads: Vec<&Thread> =
            threads.iter().filter(|t| t.at <= pos).collect();
        // Writing to a `String` can't fail.
        let _ =
            write!(trace, "{:05x}: {} threads={}", pos, unit, threads.len());
        if verbose {
            let _ = write!(trace, " ips=[");
            for (i, thread) in threads.iter().enumerate() {
                if i > 0 {
                    let _ = write!(trace, " ");
                }
                let _ = write!(trace, "{:05x}", thread.ip);
            }
            let _ = write!(trace, "]");
        }
        let _ = writeln!(trace);
    }
}

/// Computes the epsilon closure of `start` and adds the resulting threads
/// to `closure`.
///
/// The closure of a thread is the set of threads reached by following every
/// instruction that doesn't consume input (splits, jumps, repetitions,
/// assertions, group marks) until an instruction that does consume input,
/// or an `ACCEPT`, is found. Threads are added to `closure` in priority
/// order. A thread is not added if another thread with the same instruction
/// pointer and counters was already visited, the one that was found first
/// has higher priority.
///
/// `stack` is scratch space, it is empty when the function returns.
pub(crate) fn epsilon_closure(
    program: &Program,
    start: Thread,
    ctx: &Context,
    stack: &mut Vec<Thread>,
    visited: &mut BitmapSet<Counters>,
    closure: &mut Vec<Thread>,
) {
    stack.push(start);

    while let Some(mut thread) = stack.pop() {
        if !visited.insert(thread.ip, thread.counters) {
            continue;
        }

        let ip = thread.ip;

        match &program.code[ip] {
            Instr::MatchClass(_) | Instr::Accept => {
                closure.push(thread);
            }
            Instr::Jump(offset) => {
                thread.ip = apply_offset(ip, *offset);
                stack.push(thread);
            }
            Instr::Split(offsets) => {
                // Pushed in reverse order, the first offset is popped first.
                for offset in offsets.iter().rev() {
                    let mut t = thread.clone();
                    t.ip = apply_offset(ip, *offset);
                    stack.push(t);
                }
            }
            Instr::Repeat { counter, min, max, greedy, body } => {
                let counter = *counter as usize;
                let lower = cmp::max(*min, 1);
                let count = thread.counters[counter].saturating_add(1);

                let exit = (count >= lower).then(|| {
                    let mut t = thread.clone();
                    t.counters[counter] = 0;
                    t.ip = ip + 1;
                    t
                });

                let again = max.map_or(true, |max| count < max).then(|| {
                    let mut t = thread.clone();
                    t.counters[counter] = if max.is_none() {
                        cmp::min(count, lower)
                    } else {
                        count
                    };
                    t.ip = apply_offset(ip, *body);
                    t
                });

                let (first, second) =
                    if *greedy { (again, exit) } else { (exit, again) };

                if let Some(t) = second {
                    stack.push(t);
                }
                if let Some(t) = first {
                    stack.push(t);
                }
            }
            Instr::GroupOpen(group) => {
                if let Some(slot) = thread.slots.get_mut(2 * *group as usize) {
                    *slot = Some(ctx.pos);
                }
                thread.ip += 1;
                stack.push(thread);
            }
            Instr::GroupClose(group) => {
                if let Some(slot) =
                    thread.slots.get_mut(2 * *group as usize + 1)
                {
                    *slot = Some(ctx.pos);
                }
                thread.last_group = Some(*group);
                thread.ip += 1;
                stack.push(thread);
            }
            Instr::MarkAlternative(alt) => {
                thread.alt = Some(*alt);
                thread.ip += 1;
                stack.push(thread);
            }
            Instr::AnchorStart { multiline } => {
                if ctx.pos == 0
                    || (*multiline && program.is_line_terminator(ctx.prev))
                {
                    thread.ip += 1;
                    stack.push(thread);
                }
            }
            Instr::AnchorEnd { multiline } => {
                if ctx.at_end
                    || (*multiline && program.is_line_terminator(ctx.curr))
                {
                    thread.ip += 1;
                    stack.push(thread);
                }
            }
            Instr::WordBoundary | Instr::WordBoundaryNeg => {
                let mut is_match =
                    program.is_word(ctx.prev) != program.is_word(ctx.curr);

                if matches!(program.code[ip], Instr::WordBoundaryNeg) {
                    is_match = !is_match;
                }

                if is_match {
                    thread.ip += 1;
                    stack.push(thread);
                }
            }
        }
    }
}
