use std::io::{BufWriter, Read, Write};

use bincode::Options;
use bstr::decode_utf8;
#[cfg(feature = "logging")]
use log::*;
use serde::{Deserialize, Serialize};

use crate::errors::{ScanError, SerializationError};
use crate::re::thompson::{Outcome, PikeVM, Program, Snapshot};
use crate::scanner::MatchResult;

/// Header of serialized cursors.
const MAGIC: &[u8] = b"SECTOREX";

/// Describes which positions of the input are tried as match anchors
/// during a sector scan.
///
/// Anchors are `offset`, `offset + stride`, `offset + 2 * stride`, and so
/// on, up to the end of the input or up to `end_anchor`, whichever comes
/// first. `end_anchor` itself is not tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sector {
    pub stride: usize,
    pub offset: usize,
    pub end_anchor: Option<usize>,
}

impl Sector {
    /// Creates a sector without end anchor.
    pub fn new(stride: usize, offset: usize) -> Self {
        Self { stride, offset, end_anchor: None }
    }

    /// Sets the end anchor.
    pub fn end_anchor(mut self, end_anchor: Option<usize>) -> Self {
        self.end_anchor = end_anchor;
        self
    }

    /// Returns true if `pos` is an anchor that must be tried in an input of
    /// length `len`.
    fn is_candidate(&self, pos: usize, len: usize) -> bool {
        pos <= len && self.end_anchor.map_or(true, |end| pos < end)
    }
}

/// The way in which a cursor looks for matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Non-overlapping matches, anywhere from the current position.
    Search,
    /// A single match that starts exactly at the current position.
    Anchored,
    /// Matches starting exactly at each anchor of the sector.
    Sector(Sector),
}

/// Position and state of a scan.
///
/// A cursor contains everything needed for continuing a scan, including
/// the state of a suspended VM. It can be serialized, and later restored
/// for resuming the scan in another process, as long as the same program
/// is used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    program_id: u64,
    mode: Mode,
    /// Position where the next match attempt starts.
    pos: usize,
    /// State of a suspended VM.
    vm: Option<Snapshot>,
    finished: bool,
}

impl ScanCursor {
    /// Creates a cursor for a sector scan.
    ///
    /// Returns [`ScanError::InvalidSector`] if the stride is zero.
    pub fn new(program: &Program, sector: Sector) -> Result<Self, ScanError> {
        if sector.stride == 0 {
            return Err(ScanError::InvalidSector);
        }

        #[cfg(feature = "logging")]
        debug!(
            "sector scan of program {:#018x}: stride {}, offset {}",
            program.id(),
            sector.stride,
            sector.offset
        );

        Ok(Self::with_mode(program, Mode::Sector(sector), sector.offset))
    }

    /// Creates a cursor that searches for non-overlapping matches starting
    /// at `pos`.
    pub fn for_search(program: &Program, pos: usize) -> Self {
        Self::with_mode(program, Mode::Search, pos)
    }

    /// Creates a cursor that looks for a single match starting exactly at
    /// `pos`.
    pub fn anchored(program: &Program, pos: usize) -> Self {
        Self::with_mode(program, Mode::Anchored, pos)
    }

    pub(crate) fn with_mode(
        program: &Program,
        mode: Mode,
        pos: usize,
    ) -> Self {
        Self {
            program_id: program.id(),
            mode,
            pos,
            vm: None,
            finished: false,
        }
    }

    /// Id of the program this cursor belongs to.
    #[inline]
    pub fn program_id(&self) -> u64 {
        self.program_id
    }

    /// The way in which this cursor looks for matches.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current offset within the input. If the scan is suspended this is
    /// where the VM stopped, otherwise it is where the next match attempt
    /// starts.
    pub fn position(&self) -> usize {
        match &self.vm {
            Some(snapshot) => snapshot.position(),
            None => self.pos,
        }
    }

    /// State of the suspended VM, if any.
    #[inline]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.vm.as_ref()
    }

    /// Returns true once the scan has produced every match.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Serializes the cursor into a sequence of bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializationError> {
        let mut bytes = Vec::new();
        self.serialize_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Deserializes a cursor from a sequence of bytes produced by
    /// [`ScanCursor::serialize`].
    ///
    /// Returns [`SerializationError::InvalidFormat`] if the bytes don't
    /// start with the expected header or the VM state they contain is
    /// inconsistent. Whether the state fits the program is checked later,
    /// when the cursor is used.
    pub fn deserialize<B>(bytes: B) -> Result<Self, SerializationError>
    where
        B: AsRef<[u8]>,
    {
        let bytes = bytes.as_ref();

        if bytes.len() < MAGIC.len() || &bytes[0..MAGIC.len()] != MAGIC {
            return Err(SerializationError::InvalidFormat);
        }

        let cursor: Self = bincode::DefaultOptions::new()
            .with_varint_encoding()
            .deserialize(&bytes[MAGIC.len()..])?;

        if let Mode::Sector(Sector { stride: 0, .. }) = cursor.mode {
            return Err(SerializationError::InvalidFormat);
        }

        if let Some(snapshot) = &cursor.vm {
            if !snapshot.is_well_formed() || snapshot.start() != cursor.pos {
                return Err(SerializationError::InvalidFormat);
            }
        }

        Ok(cursor)
    }

    /// Returns true if the state of a suspended VM, if any, can be executed
    /// by `program`.
    pub(crate) fn fits(&self, program: &Program) -> bool {
        self.vm.as_ref().map_or(true, |snapshot| snapshot.fits(program))
    }

    /// Serializes the cursor into a `writer`.
    pub fn serialize_into<W>(
        &self,
        writer: W,
    ) -> Result<(), SerializationError>
    where
        W: Write,
    {
        let mut writer = BufWriter::new(writer);

        writer.write_all(MAGIC)?;

        bincode::DefaultOptions::new()
            .with_varint_encoding()
            .serialize_into(&mut writer, self)?;

        writer.flush()?;
        Ok(())
    }

    /// Deserializes a cursor from a `reader`.
    pub fn deserialize_from<R>(
        mut reader: R,
    ) -> Result<Self, SerializationError>
    where
        R: Read,
    {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes)?;
        Self::deserialize(bytes)
    }

    /// Looks for the next match, continuing from the current state.
    pub(crate) fn advance(
        &mut self,
        vm: &mut PikeVM,
        input: &[u8],
        budget: Option<usize>,
    ) -> MatchResult {
        loop {
            if self.finished {
                return MatchResult::NoMatch;
            }

            let anchored = match self.mode {
                Mode::Search => false,
                Mode::Anchored => true,
                Mode::Sector(sector) => {
                    if !sector.is_candidate(self.pos, input.len()) {
                        #[cfg(feature = "logging")]
                        debug!("sector scan finished at offset {}", self.pos);
                        self.finished = true;
                        return MatchResult::NoMatch;
                    }
                    true
                }
            };

            if self.pos > input.len() {
                self.finished = true;
                return MatchResult::NoMatch;
            }

            let start = self.pos;

            let mut snapshot = self
                .vm
                .take()
                .unwrap_or_else(|| Snapshot::new(start, anchored));

            match vm.execute(input, &mut snapshot, budget) {
                Outcome::Suspended => {
                    self.vm = Some(snapshot.clone());
                    return MatchResult::Suspended(snapshot);
                }
                Outcome::Matched(m) => {
                    match self.mode {
                        Mode::Search if m.is_empty() => {
                            if m.end() >= input.len() {
                                self.finished = true;
                            } else {
                                self.pos = m.end()
                                    + unit_len(
                                        input,
                                        m.end(),
                                        vm.is_asynchronous(),
                                    );
                            }
                        }
                        Mode::Search => self.pos = m.end(),
                        Mode::Anchored => self.finished = true,
                        // Runs are anchored, so matches from different
                        // anchors never have the same span.
                        Mode::Sector(sector) => {
                            self.pos = start.saturating_add(sector.stride);
                        }
                    }
                    return MatchResult::Matched(m);
                }
                Outcome::NoMatch => match self.mode {
                    Mode::Search | Mode::Anchored => {
                        self.finished = true;
                        return MatchResult::NoMatch;
                    }
                    Mode::Sector(sector) => {
                        self.pos = start.saturating_add(sector.stride);
                    }
                },
            }
        }
    }
}

/// Length of the input unit at `pos`.
fn unit_len(input: &[u8], pos: usize, asynchronous: bool) -> usize {
    if asynchronous {
        1
    } else {
        decode_utf8(&input[pos..]).1.max(1)
    }
}
