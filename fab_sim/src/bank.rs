//! In-memory register bank.
//!
//! One fixed-size block of words standing in for the equipment's register
//! memory. Both regions live in the same block; the region argument only
//! selects which fault counter a read consumes. Handles are cheap clones
//! sharing the block, so a simulator, a poller and an actuator can all talk
//! to the same bank.
//!
//! Multi-span transfers hold the block lock for the whole transfer, so a
//! batch read never observes half of a batch write.

use std::sync::Arc;

use fab_common::layout::Region;
use fab_common::layout::RegisterSpan;
use fab_common::transport::{RegisterTransport, TransferError, TransportError};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct PendingFaults {
    process: u32,
    bit: u32,
}

impl PendingFaults {
    fn counter(&mut self, region: Region) -> &mut u32 {
        match region {
            Region::Process => &mut self.process,
            Region::Bit => &mut self.bit,
        }
    }

    /// Consume one pending fault for `region`, if any.
    fn take(&mut self, region: Region, address: u16) -> Result<(), TransportError> {
        let pending = self.counter(region);
        if *pending > 0 {
            *pending -= 1;
            return Err(TransportError::Timeout { address });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Shared {
    words: Mutex<Vec<u16>>,
    faults: Mutex<PendingFaults>,
}

/// Owner of a register block.
#[derive(Debug, Clone)]
pub struct RegisterBank {
    shared: Arc<Shared>,
}

/// Transport view of a [`RegisterBank`].
#[derive(Debug, Clone)]
pub struct BankHandle {
    shared: Arc<Shared>,
}

impl RegisterBank {
    /// Zeroed bank of `size` words.
    pub fn new(size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                words: Mutex::new(vec![0; size]),
                faults: Mutex::new(PendingFaults::default()),
            }),
        }
    }

    /// Transport handle onto this bank.
    pub fn handle(&self) -> BankHandle {
        BankHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of words.
    pub fn size(&self) -> usize {
        self.shared.words.lock().len()
    }

    /// Copy of the whole block.
    pub fn contents(&self) -> Vec<u16> {
        self.shared.words.lock().clone()
    }

    /// Make the next `count` reads of `region` fail with a timeout.
    pub fn fail_next_reads(&self, region: Region, count: u32) {
        *self.shared.faults.lock().counter(region) = count;
    }
}

fn bounds(
    start: u16,
    count: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, TransportError> {
    let begin = start as usize;
    let end = begin + count;
    if end > size {
        return Err(TransportError::OutOfBounds { start, count, size });
    }
    Ok(begin..end)
}

impl RegisterTransport for BankHandle {
    fn read(
        &mut self,
        region: Region,
        start: u16,
        count: usize,
    ) -> Result<Vec<u16>, TransportError> {
        self.shared.faults.lock().take(region, start)?;
        let words = self.shared.words.lock();
        let range = bounds(start, count, words.len())?;
        Ok(words[range].to_vec())
    }

    fn write(
        &mut self,
        _region: Region,
        start: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let mut words = self.shared.words.lock();
        let range = bounds(start, values.len(), words.len())?;
        words[range].copy_from_slice(values);
        Ok(())
    }

    fn read_regions(
        &mut self,
        spans: &[(Region, RegisterSpan)],
    ) -> Result<Vec<Vec<u16>>, TransferError> {
        let words = self.shared.words.lock();
        let mut blocks = Vec::with_capacity(spans.len());
        for &(region, span) in spans {
            let range = self
                .shared
                .faults
                .lock()
                .take(region, span.start)
                .and_then(|()| bounds(span.start, span.count, words.len()))
                .map_err(|e| TransferError::new(region, e))?;
            blocks.push(words[range].to_vec());
        }
        Ok(blocks)
    }

    /// All blocks are bounds-checked before any word changes.
    fn write_regions(&mut self, blocks: &[(Region, u16, &[u16])]) -> Result<(), TransferError> {
        let mut words = self.shared.words.lock();
        let ranges = blocks
            .iter()
            .map(|&(region, start, values)| {
                bounds(start, values.len(), words.len())
                    .map_err(|e| TransferError::new(region, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (range, &(_, _, values)) in ranges.into_iter().zip(blocks) {
            words[range].copy_from_slice(values);
        }
        Ok(())
    }
}
