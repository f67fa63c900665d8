//! Register transport seam.
//!
//! Anything that can read and write blocks of 16-bit words (an industrial
//! protocol client, an in-memory bank, a test double) implements
//! [`RegisterTransport`]. Framing, CRC and transaction matching live behind
//! the trait.
//!
//! [`RegisterTransport::read_regions`] and [`RegisterTransport::write_regions`]
//! move several spans in one call. The default implementations issue one
//! request per span, so other writers can land between them; transports that
//! can lock or frame a multi-span transfer override them to make it atomic.

use thiserror::Error;

use crate::layout::{Region, RegisterSpan};

/// Transport failure. Always abandons the current poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is unreachable or the connection dropped.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// No response within the transport's deadline.
    #[error("timeout reading address {address}")]
    Timeout {
        /// First address of the request.
        address: u16,
    },

    /// Request outside the peer's register memory.
    #[error("request {start}+{count} outside {size} registers")]
    OutOfBounds {
        /// First address of the request.
        start: u16,
        /// Requested word count.
        count: usize,
        /// Size of the peer's register memory.
        size: usize,
    },

    /// Malformed or unexpected response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Fewer words returned than requested.
    #[error("short read: expected {expected} words, got {actual}")]
    ShortRead {
        /// Requested word count.
        expected: usize,
        /// Returned word count.
        actual: usize,
    },
}

/// Transport failure tagged with the region whose transfer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{region} region: {source}")]
pub struct TransferError {
    /// Region of the failing span.
    pub region: Region,
    /// Underlying failure.
    #[source]
    pub source: TransportError,
}

impl TransferError {
    /// Tag `source` with `region`.
    pub fn new(region: Region, source: TransportError) -> Self {
        Self { region, source }
    }
}

/// Block read/write access to an equipment's registers.
pub trait RegisterTransport: Send {
    /// Read `count` words of `region` starting at `start`.
    fn read(
        &mut self,
        region: Region,
        start: u16,
        count: usize,
    ) -> Result<Vec<u16>, TransportError>;

    /// Write `values` to consecutive words of `region` starting at `start`.
    fn write(
        &mut self,
        region: Region,
        start: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;

    /// Read a whole span, rejecting short replies.
    fn read_span(
        &mut self,
        region: Region,
        span: RegisterSpan,
    ) -> Result<Vec<u16>, TransportError> {
        let words = self.read(region, span.start, span.count)?;
        if words.len() != span.count {
            return Err(TransportError::ShortRead {
                expected: span.count,
                actual: words.len(),
            });
        }
        Ok(words)
    }

    /// Read several spans, in order, returning one block per span.
    fn read_regions(
        &mut self,
        spans: &[(Region, RegisterSpan)],
    ) -> Result<Vec<Vec<u16>>, TransferError> {
        spans
            .iter()
            .map(|&(region, span)| {
                self.read_span(region, span)
                    .map_err(|e| TransferError::new(region, e))
            })
            .collect()
    }

    /// Write several `(region, start, values)` blocks, in order.
    fn write_regions(&mut self, blocks: &[(Region, u16, &[u16])]) -> Result<(), TransferError> {
        for &(region, start, values) in blocks {
            self.write(region, start, values)
                .map_err(|e| TransferError::new(region, e))?;
        }
        Ok(())
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn read(
        &mut self,
        region: Region,
        start: u16,
        count: usize,
    ) -> Result<Vec<u16>, TransportError> {
        (**self).read(region, start, count)
    }

    fn write(
        &mut self,
        region: Region,
        start: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        (**self).write(region, start, values)
    }

    fn read_regions(
        &mut self,
        spans: &[(Region, RegisterSpan)],
    ) -> Result<Vec<Vec<u16>>, TransferError> {
        (**self).read_regions(spans)
    }

    fn write_regions(&mut self, blocks: &[(Region, u16, &[u16])]) -> Result<(), TransferError> {
        (**self).write_regions(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Truncating;

    impl RegisterTransport for Truncating {
        fn read(&mut self, _: Region, _: u16, count: usize) -> Result<Vec<u16>, TransportError> {
            Ok(vec![0; count.saturating_sub(1)])
        }

        fn write(&mut self, _: Region, _: u16, _: &[u16]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn read_span_rejects_short_reply() {
        let mut transport: Box<dyn RegisterTransport> = Box::new(Truncating);
        let err = transport
            .read_span(Region::Bit, RegisterSpan { start: 100, count: 18 })
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::ShortRead {
                expected: 18,
                actual: 17
            }
        );
    }

    #[test]
    fn batch_read_tags_failing_region() {
        let mut transport = Truncating;
        let err = transport
            .read_regions(&[
                (Region::Process, RegisterSpan { start: 0, count: 0 }),
                (Region::Bit, RegisterSpan { start: 100, count: 4 }),
            ])
            .unwrap_err();
        assert_eq!(err.region, Region::Bit);
        assert_eq!(
            err.source,
            TransportError::ShortRead {
                expected: 4,
                actual: 3
            }
        );
    }
}
