pub mod address;
pub mod builder;
pub mod center;
pub mod element;
pub mod error;
pub mod extensions;
pub mod heap;
pub mod names;
mod once_cell;
pub mod values;

pub use address::Address;
pub use builder::{AttrValue, DataCenterBuilder};
pub use center::{DataCenter, DataCenterTables};
pub use element::{Element, TypedValue};
pub use error::{Error, Result};
pub use extensions::{ExtensionDescriptor, ExtensionTable};
pub use heap::{Segment, SegmentedHeap};
pub use names::NameTable;
pub use values::ValueTable;
