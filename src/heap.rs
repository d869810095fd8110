use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::address::Address;
use crate::error::{Error, Result};

/// A single fixed-stride segment: `count` records of `stride` bytes each,
/// packed back to back in `data`.
#[derive(Debug, Clone)]
pub struct Segment {
    stride: usize,
    count: u16,
    data: Vec<u8>,
}

impl Segment {
    pub fn new(stride: usize, count: u16, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), stride * count as usize);
        Segment { stride, count, data }
    }

    pub fn count(&self) -> u16 {
        self.count
    }
}

/// A heap of fixed-stride record segments, addressable by `Address`.
///
/// `heap_name` is carried purely for error messages (`"element"`,
/// `"attribute"`, `"name"`, `"value"`).
#[derive(Debug, Clone)]
pub struct SegmentedHeap {
    heap_name: &'static str,
    stride: usize,
    segments: Vec<Segment>,
    reads: Arc<AtomicUsize>,
}

impl SegmentedHeap {
    pub fn new(heap_name: &'static str, stride: usize, segments: Vec<Segment>) -> Self {
        SegmentedHeap {
            heap_name,
            stride,
            segments,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of records read via [`SegmentedHeap::reader_at`] so far.
    /// Exposed for tests that need to verify a read happened exactly
    /// once despite concurrent/memoized callers.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// A cursor positioned at the first byte of the record at `address`.
    ///
    /// Fails with `OutOfBounds` if either index is out of range.
    pub fn reader_at(&self, address: Address) -> Result<Cursor<'_>> {
        let segment = self
            .segments
            .get(address.segment_index as usize)
            .ok_or(Error::OutOfBounds {
                address,
                heap: self.heap_name,
            })?;
        if address.element_index >= segment.count {
            return Err(Error::OutOfBounds {
                address,
                heap: self.heap_name,
            });
        }
        let start = address.element_index as usize * segment.stride;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(Cursor {
            bytes: &segment.data[start..start + segment.stride],
            pos: 0,
        })
    }
}

/// Little-endian cursor over a single record's bytes.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn read_u16(&mut self) -> u16 {
        let v = u16::from_le_bytes(self.bytes[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }

    pub fn read_u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    pub fn read_address(&mut self) -> Address {
        let segment_index = self.read_u16();
        let element_index = self.read_u16();
        Address::new(segment_index, element_index)
    }

    /// Move the cursor back `n` bytes, for re-reading a just-consumed
    /// 4-byte primitive as an `Address` instead.
    pub fn rewind(&mut self, n: usize) {
        self.pos -= n;
    }
}
