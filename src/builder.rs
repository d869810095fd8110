use std::collections::HashMap;

use crate::address::Address;
use crate::center::{DataCenter, DataCenterTables};
use crate::extensions::{ExtensionDescriptor, ExtensionTable};
use crate::heap::{Segment, SegmentedHeap};
use crate::names::NameTable;
use crate::values::ValueTable;

const ELEMENT_STRIDE: usize = 16;
const ATTRIBUTE_STRIDE: usize = 8;

/// An attribute value as given to [`DataCenterBuilder::push_attribute`],
/// encoded into the on-disk `(type_word, primitive)` pair the same way a
/// writer would.
pub enum AttrValue {
    Int32(i32),
    Boolean(bool),
    Single(f32),
    StringAt(Address),
    /// Escape hatch for fixtures that need to construct a deliberately
    /// invalid `(type_code, ext_code)` pair, e.g. for structural-error tests.
    Raw { type_code: u16, ext_code: u16, primitive: u32 },
}

impl AttrValue {
    fn encode(self) -> (u16, u32) {
        match self {
            AttrValue::Int32(v) => (1, v as u32),
            AttrValue::Boolean(v) => (1 | (1 << 2), v as u32),
            AttrValue::Single(v) => (2, v.to_bits()),
            AttrValue::StringAt(addr) => (3, u32::from_le_bytes(addr.to_le_bytes())),
            AttrValue::Raw { type_code, ext_code, primitive } => {
                (type_code | (ext_code << 2), primitive)
            }
        }
    }
}

/// In-memory builder for the loader-supplied heaps and side tables
/// (§6). Used by this crate's own tests, and available to any embedder
/// assembling those tables programmatically instead of from a raw,
/// decompressed byte image.
#[derive(Default)]
pub struct DataCenterBuilder {
    element_segments: Vec<Vec<u8>>,
    attribute_segments: Vec<Vec<u8>>,
    names: Vec<String>,
    values: HashMap<Address, String>,
    extension_count: usize,
}

impl DataCenterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning its on-disk `name_index_plus_one`.
    pub fn add_name(&mut self, name: impl Into<String>) -> u16 {
        self.names.push(name.into());
        self.names.len() as u16
    }

    /// Reserve one more slot in the extension table, returning its index.
    pub fn add_extension(&mut self) -> u16 {
        let index = self.extension_count;
        self.extension_count += 1;
        index as u16
    }

    pub fn add_value(&mut self, address: Address, value: impl Into<String>) {
        self.values.insert(address, value.into());
    }

    fn segment_mut(segments: &mut Vec<Vec<u8>>, segment: usize) -> &mut Vec<u8> {
        if segments.len() <= segment {
            segments.resize_with(segment + 1, Vec::new);
        }
        &mut segments[segment]
    }

    /// Append a 16-byte element record to `segment`, returning its address.
    #[allow(clippy::too_many_arguments)]
    pub fn push_element(
        &mut self,
        segment: usize,
        name_index_plus_one: u16,
        extension_word: u16,
        attribute_count: u16,
        child_count: u16,
        attribute_base: Address,
        child_base: Address,
    ) -> Address {
        let buf = Self::segment_mut(&mut self.element_segments, segment);
        let element_index = (buf.len() / ELEMENT_STRIDE) as u16;
        buf.extend_from_slice(&name_index_plus_one.to_le_bytes());
        buf.extend_from_slice(&extension_word.to_le_bytes());
        buf.extend_from_slice(&attribute_count.to_le_bytes());
        buf.extend_from_slice(&child_count.to_le_bytes());
        buf.extend_from_slice(&attribute_base.to_le_bytes());
        buf.extend_from_slice(&child_base.to_le_bytes());
        Address::new(segment as u16, element_index)
    }

    /// Append a placeholder (never-surfaced) element record.
    pub fn push_placeholder(&mut self, segment: usize) -> Address {
        self.push_element(segment, 0, 0, 0, 0, Address::ZERO, Address::ZERO)
    }

    /// Append an 8-byte attribute record to `segment`, returning its address.
    pub fn push_attribute(&mut self, segment: usize, name_index_plus_one: u16, value: AttrValue) -> Address {
        let (type_word, primitive) = value.encode();
        let buf = Self::segment_mut(&mut self.attribute_segments, segment);
        let element_index = (buf.len() / ATTRIBUTE_STRIDE) as u16;
        buf.extend_from_slice(&name_index_plus_one.to_le_bytes());
        buf.extend_from_slice(&type_word.to_le_bytes());
        buf.extend_from_slice(&primitive.to_le_bytes());
        Address::new(segment as u16, element_index)
    }

    fn into_heap(segments: Vec<Vec<u8>>, stride: usize, heap_name: &'static str) -> SegmentedHeap {
        let built = segments
            .into_iter()
            .map(|data| Segment::new(stride, (data.len() / stride) as u16, data))
            .collect();
        SegmentedHeap::new(heap_name, stride, built)
    }

    pub fn build(self) -> DataCenter {
        let tables = DataCenterTables {
            element_heap: Self::into_heap(self.element_segments, ELEMENT_STRIDE, "element"),
            attribute_heap: Self::into_heap(self.attribute_segments, ATTRIBUTE_STRIDE, "attribute"),
            names: NameTable::new(self.names),
            values: ValueTable::new(self.values),
            extensions: ExtensionTable::new(vec![ExtensionDescriptor; self.extension_count]),
        };
        DataCenter::open(tables)
    }
}
