use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::address::{self as codec, Address};
use crate::center::DataCenterInner;
use crate::error::{Error, Result};
use crate::once_cell::LazyCell;

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int32(i32),
    /// Bit-preserved `f32`; NaNs are never canonicalized.
    Single(f32),
    Boolean(bool),
    String(String),
    /// Sentinel returned by [`Element::attr`] when the attribute is absent.
    Null,
}

/// The weak up-reference an `Element` holds to whatever encloses it: its
/// parent `Element`, or the `DataCenter` boundary for the root.
#[derive(Clone)]
pub(crate) enum Parent {
    Root(Weak<DataCenterInner>),
    Node(Weak<ElementData>),
}

pub(crate) struct ElementData {
    center: Weak<DataCenterInner>,
    parent: Parent,
    #[allow(dead_code)]
    address: Address,
    name: Option<String>,
    is_dummy: bool,
    attribute_count: u16,
    child_count: u16,
    attribute_base: Address,
    child_base: Address,
    attributes: LazyCell<Arc<HashMap<String, TypedValue>>, Error>,
    children: LazyCell<Arc<Vec<Element>>, Error>,
}

/// A named node in a data center: attributes plus children, realized
/// on demand from the underlying segmented heaps.
///
/// `Element` is a cheap, clonable handle (an `Arc` under the hood); two
/// clones referring to the same underlying record compare equal under
/// [`Element::is_same_as`].
#[derive(Clone)]
pub struct Element(pub(crate) Arc<ElementData>);

impl Element {
    fn center(&self) -> Result<Arc<DataCenterInner>> {
        let center = self.0.center.upgrade().ok_or(Error::UseAfterDispose)?;
        if center.is_closed() {
            return Err(Error::UseAfterDispose);
        }
        Ok(center)
    }

    pub fn is_same_as(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The element's name, or `None` for a placeholder.
    ///
    /// Surfaced elements (those reachable via [`DataCenter::root`] or
    /// [`Element::children`]) always have `Some` name: placeholders are
    /// filtered out by the children realizer.
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Parse the 16-byte element record at `address` and build the
    /// (unrealized) `Element` view over it. Attributes and children are
    /// not read yet; only the header.
    pub(crate) fn materialize(
        center: Weak<DataCenterInner>,
        address: Address,
        parent: Parent,
    ) -> Result<Element> {
        let center_arc = center.upgrade().ok_or(Error::UseAfterDispose)?;
        if center_arc.is_closed() {
            return Err(Error::UseAfterDispose);
        }

        let is_root_call = matches!(parent, Parent::Root(_));
        if is_root_call && address.is_zero() && center_arc.names.is_empty() {
            return Ok(Element(Arc::new(ElementData {
                center,
                parent,
                address,
                name: Some("__root__".to_string()),
                is_dummy: true,
                attribute_count: 0,
                child_count: 0,
                attribute_base: Address::ZERO,
                child_base: Address::ZERO,
                attributes: LazyCell::new(),
                children: LazyCell::new(),
            })));
        }

        let guard = center_arc.lock.read();
        let mut cursor = center_arc.element_heap.reader_at(address)?;
        let name_index_plus_one = cursor.read_u16();

        if name_index_plus_one == 0 {
            drop(guard);
            return Ok(Element(Arc::new(ElementData {
                center,
                parent,
                address,
                name: None,
                is_dummy: false,
                attribute_count: 0,
                child_count: 0,
                attribute_base: Address::ZERO,
                child_base: Address::ZERO,
                attributes: LazyCell::new(),
                children: LazyCell::new(),
            })));
        }

        let name_index = (name_index_plus_one - 1) as usize;
        let name = center_arc
            .names
            .get(name_index)
            .ok_or_else(|| {
                Error::structural(format!(
                    "element at {address} references name index {name_index}, but the name table has {} entries",
                    center_arc.names.len()
                ))
            })?
            .to_string();

        let extension_word = cursor.read_u16();
        let (flags, ext_index) = codec::decode_extension_word(extension_word);
        if flags != 0 {
            return Err(Error::structural(format!(
                "element {name:?} at {address} has non-zero extension flags {flags}"
            )));
        }
        if !center_arc.extensions.contains(ext_index) {
            return Err(Error::structural(format!(
                "element {name:?} at {address} references extension index {ext_index}, but the extension table has {} entries",
                center_arc.extensions.len()
            )));
        }

        let attribute_count = cursor.read_u16();
        let child_count = cursor.read_u16();
        let attribute_base = cursor.read_address();
        let child_base = cursor.read_address();
        drop(guard);

        debug!(%address, name = %name, attribute_count, child_count, "materialized element header");

        Ok(Element(Arc::new(ElementData {
            center,
            parent,
            address,
            name: Some(name),
            is_dummy: false,
            attribute_count,
            child_count,
            attribute_base,
            child_base,
            attributes: LazyCell::new(),
            children: LazyCell::new(),
        })))
    }

    /// This element's attributes, realized and memoized on first access.
    pub fn attributes(&self) -> Result<Arc<HashMap<String, TypedValue>>> {
        let data = &self.0;
        data.attributes.get_or_try_init(|| {
            if data.is_dummy {
                return Ok(Arc::new(HashMap::new()));
            }
            let center = self.center()?;
            if data.attribute_count == 0 {
                return Ok(Arc::new(HashMap::new()));
            }
            let guard = center.lock.read();
            let mut out = HashMap::with_capacity(data.attribute_count as usize);
            for i in 0..data.attribute_count {
                let addr = data.attribute_base.offset(i);
                let mut cursor = center.attribute_heap.reader_at(addr)?;
                let name_index_plus_one = cursor.read_u16();
                if name_index_plus_one == 0 {
                    return Err(Error::structural(format!(
                        "attribute record at {addr} has a zero name index"
                    )));
                }
                let name_index = (name_index_plus_one - 1) as usize;
                let name = center.names.get(name_index).ok_or_else(|| {
                    Error::structural(format!(
                        "attribute at {addr} references name index {name_index}, but the name table has {} entries",
                        center.names.len()
                    ))
                })?;
                let type_word = cursor.read_u16();
                let (type_code, ext_code) = codec::decode_type_word(type_word);
                let primitive = cursor.read_u32();
                let value = match (type_code, ext_code) {
                    (1, 0) => TypedValue::Int32(primitive as i32),
                    (1, 1) => TypedValue::Boolean(primitive != 0),
                    (2, 0) => TypedValue::Single(f32::from_bits(primitive)),
                    (3, _) => {
                        cursor.rewind(4);
                        let value_addr = cursor.read_address();
                        let s = center.values.get(value_addr).ok_or_else(|| {
                            Error::structural(format!(
                                "string attribute {name:?} at {addr} references value address {value_addr}, which is not in the value table"
                            ))
                        })?;
                        TypedValue::String(s.to_string())
                    }
                    (tc, ec) => {
                        return Err(Error::structural(format!(
                            "attribute {name:?} at {addr} has unknown type/ext code ({tc}, {ec})"
                        )));
                    }
                };
                if out.insert(name.to_string(), value).is_some() {
                    return Err(Error::structural(format!(
                        "duplicate attribute name {name:?} on element {:?}",
                        data.name
                    )));
                }
            }
            drop(guard);
            Ok(Arc::new(out))
        })
    }

    /// Look up a single attribute by name, or `TypedValue::Null` if absent.
    pub fn attr(&self, name: &str) -> Result<TypedValue> {
        let attrs = self.attributes()?;
        Ok(attrs.get(name).cloned().unwrap_or(TypedValue::Null))
    }

    /// Look up an attribute, falling back to `fallback` (which must not be
    /// `TypedValue::Null`) when absent. The stored value, when present, is
    /// returned verbatim — `fallback` is ignored.
    pub fn attr_or_default(&self, name: &str, fallback: TypedValue) -> Result<TypedValue> {
        if matches!(fallback, TypedValue::Null) {
            return Err(Error::invalid_argument(
                "attr_or_default fallback must be one of Int32/Single/Boolean/String",
            ));
        }
        let attrs = self.attributes()?;
        Ok(attrs.get(name).cloned().unwrap_or(fallback))
    }

    /// This element's children, realized and memoized on first access.
    /// Placeholder records are filtered out.
    pub fn children(&self) -> Result<Vec<Element>> {
        let data = &self.0;
        let arc = data.children.get_or_try_init(|| {
            if data.is_dummy {
                return Ok(Arc::new(Vec::new()));
            }
            self.center()?;
            if data.child_count == 0 {
                return Ok(Arc::new(Vec::new()));
            }
            let weak_self = Arc::downgrade(data);
            let mut out = Vec::with_capacity(data.child_count as usize);
            for i in 0..data.child_count {
                let addr = data.child_base.offset(i);
                let child = Element::materialize(
                    data.center.clone(),
                    addr,
                    Parent::Node(weak_self.clone()),
                )?;
                if child.0.name.is_some() {
                    out.push(child);
                }
            }
            Ok(Arc::new(out))
        })?;
        Ok((*arc).clone())
    }

    /// Ancestors from immediate parent up to (and including) the root,
    /// excluding `self`.
    pub fn ancestors(&self) -> Result<Vec<Element>> {
        self.center()?;
        let mut out = Vec::new();
        let mut current = self.0.parent.clone();
        loop {
            match current {
                Parent::Root(_) => break,
                Parent::Node(weak) => {
                    let parent_data = weak.upgrade().ok_or(Error::UseAfterDispose)?;
                    let parent = Element(parent_data.clone());
                    current = parent_data.parent.clone();
                    out.push(parent);
                }
            }
        }
        Ok(out)
    }

    /// Children of this element's parent, excluding `self`. Empty for the
    /// root (which has no parent `Element`).
    pub fn siblings(&self) -> Result<Vec<Element>> {
        self.center()?;
        match &self.0.parent {
            Parent::Root(_) => Ok(Vec::new()),
            Parent::Node(weak) => {
                let parent_data = weak.upgrade().ok_or(Error::UseAfterDispose)?;
                let parent = Element(parent_data);
                Ok(parent
                    .children()?
                    .into_iter()
                    .filter(|c| !c.is_same_as(self))
                    .collect())
            }
        }
    }

    /// Breadth-first traversal of all true descendants, excluding `self`.
    pub fn descendants(&self) -> Result<Vec<Element>> {
        let mut out = Vec::new();
        let mut queue: std::collections::VecDeque<Element> = self.children()?.into_iter().collect();
        while let Some(next) = queue.pop_front() {
            let children = next.children()?;
            queue.extend(children);
            out.push(next);
        }
        Ok(out)
    }

    pub fn ancestors_named(&self, name: Option<&str>) -> Result<Vec<Element>> {
        let name = name.ok_or_else(|| Error::invalid_argument("null name filter"))?;
        Ok(self.ancestors()?.into_iter().filter(|e| e.name() == Some(name)).collect())
    }

    pub fn ancestors_named_any(&self, names: &HashSet<String>) -> Result<Vec<Element>> {
        Ok(self
            .ancestors()?
            .into_iter()
            .filter(|e| e.name().is_some_and(|n| names.contains(n)))
            .collect())
    }

    pub fn siblings_named(&self, name: Option<&str>) -> Result<Vec<Element>> {
        let name = name.ok_or_else(|| Error::invalid_argument("null name filter"))?;
        Ok(self.siblings()?.into_iter().filter(|e| e.name() == Some(name)).collect())
    }

    pub fn siblings_named_any(&self, names: &HashSet<String>) -> Result<Vec<Element>> {
        Ok(self
            .siblings()?
            .into_iter()
            .filter(|e| e.name().is_some_and(|n| names.contains(n)))
            .collect())
    }

    pub fn children_named(&self, name: Option<&str>) -> Result<Vec<Element>> {
        let name = name.ok_or_else(|| Error::invalid_argument("null name filter"))?;
        Ok(self.children()?.into_iter().filter(|e| e.name() == Some(name)).collect())
    }

    pub fn children_named_any(&self, names: &HashSet<String>) -> Result<Vec<Element>> {
        Ok(self
            .children()?
            .into_iter()
            .filter(|e| e.name().is_some_and(|n| names.contains(n)))
            .collect())
    }

    pub fn descendants_named(&self, name: Option<&str>) -> Result<Vec<Element>> {
        let name = name.ok_or_else(|| Error::invalid_argument("null name filter"))?;
        Ok(self.descendants()?.into_iter().filter(|e| e.name() == Some(name)).collect())
    }

    pub fn descendants_named_any(&self, names: &HashSet<String>) -> Result<Vec<Element>> {
        Ok(self
            .descendants()?
            .into_iter()
            .filter(|e| e.name().is_some_and(|n| names.contains(n)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::address::Address;
    use crate::builder::{AttrValue, DataCenterBuilder};
    use crate::error::Error;
    use crate::element::TypedValue;
    use std::sync::Arc;

    #[test]
    fn non_root_materialize_at_zero_is_not_mistaken_for_dummy_root() {
        // Empty name table (so `DataCenter::root()` is the synthetic dummy
        // root) but a real placeholder record sitting at element-heap
        // address (0, 0) — the same address the dummy-root shortcut
        // checks. A non-root materialize call at that address must read
        // the placeholder, not get shortcut into a fake "__root__".
        let mut b = DataCenterBuilder::new();
        b.push_placeholder(0);
        let dc = b.build();
        let root = dc.root().unwrap();
        assert_eq!(root.name(), Some("__root__"));

        let parent_weak = Arc::downgrade(&root.0);
        let child = super::Element::materialize(
            Arc::downgrade(&dc.inner),
            Address::new(0, 0),
            super::Parent::Node(parent_weak),
        )
        .unwrap();
        assert_eq!(child.name(), None);
    }

    #[test]
    fn placeholder_children_are_filtered_out() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        let real_name = b.add_name("real");
        let placeholder = b.push_placeholder(0);
        let real = b.push_element(0, real_name, 0, 0, 0, Address::ZERO, Address::ZERO);
        // root's children span [placeholder, real]; only `real` is surfaced.
        assert_eq!(placeholder, Address::new(0, 0));
        let _ = real;
        b.push_element(0, root_name, 0, 0, 2, Address::ZERO, placeholder);
        let dc = b.build();
        let root = dc.root().unwrap();
        let children = root.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), Some("real"));
    }

    #[test]
    fn reads_all_four_attribute_types() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        let n = b.add_name("n");
        let f = b.add_name("f");
        let flag = b.add_name("flag");
        let s = b.add_name("s");
        b.add_extension();
        let addr = Address::new(0, 0);
        b.add_value(addr, "hello");
        b.push_attribute(0, n, AttrValue::Int32(-7));
        b.push_attribute(0, f, AttrValue::Single(1.5));
        b.push_attribute(0, flag, AttrValue::Boolean(false));
        b.push_attribute(0, s, AttrValue::StringAt(addr));
        b.push_element(0, root_name, 0, 4, 0, Address::ZERO, Address::ZERO);
        let dc = b.build();
        let root = dc.root().unwrap();
        assert_eq!(root.attr("n").unwrap(), TypedValue::Int32(-7));
        assert_eq!(root.attr("f").unwrap(), TypedValue::Single(1.5));
        assert_eq!(root.attr("flag").unwrap(), TypedValue::Boolean(false));
        assert_eq!(root.attr("s").unwrap(), TypedValue::String("hello".to_string()));
    }

    #[test]
    fn duplicate_attribute_name_is_structural_error() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        let n = b.add_name("n");
        b.push_attribute(0, n, AttrValue::Int32(1));
        b.push_attribute(0, n, AttrValue::Int32(2));
        b.push_element(0, root_name, 0, 2, 0, Address::ZERO, Address::ZERO);
        let dc = b.build();
        let root = dc.root().unwrap();
        assert!(matches!(root.attributes().unwrap_err(), Error::Structural(_)));
    }

    #[test]
    fn unknown_type_code_is_structural_error() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        let n = b.add_name("n");
        b.push_attribute(0, n, AttrValue::Raw { type_code: 0, ext_code: 0, primitive: 0 });
        b.push_element(0, root_name, 0, 1, 0, Address::ZERO, Address::ZERO);
        let dc = b.build();
        let root = dc.root().unwrap();
        assert!(matches!(root.attributes().unwrap_err(), Error::Structural(_)));
    }

    #[test]
    fn nonzero_extension_flags_are_structural_error() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        b.add_extension();
        // extension_word packs 4-bit flags (low) then 12-bit ext_index (high); flags=1 here.
        let bad_extension_word: u16 = 1;
        b.push_element(0, root_name, bad_extension_word, 0, 0, Address::ZERO, Address::ZERO);
        let dc = b.build();
        assert!(matches!(dc.root().unwrap_err(), Error::Structural(_)));
    }

    #[test]
    fn attr_or_default_ignores_fallback_when_present() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        let n = b.add_name("n");
        b.push_attribute(0, n, AttrValue::Single(2.0));
        b.push_element(0, root_name, 0, 1, 0, Address::ZERO, Address::ZERO);
        let dc = b.build();
        let root = dc.root().unwrap();
        assert_eq!(
            root.attr_or_default("n", TypedValue::Single(3.5)).unwrap(),
            TypedValue::Single(2.0)
        );
        assert_eq!(
            root.attr_or_default("missing", TypedValue::Single(3.5)).unwrap(),
            TypedValue::Single(3.5)
        );
        assert!(matches!(
            root.attr_or_default("missing", TypedValue::Null).unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn concurrent_children_realization_computes_once() {
        let mut b = DataCenterBuilder::new();
        let root_name = b.add_name("root");
        let child_name = b.add_name("child");
        let child = b.push_element(0, child_name, 0, 0, 0, Address::ZERO, Address::ZERO);
        b.push_element(0, root_name, 0, 0, 1, Address::ZERO, child);
        let dc = Arc::new(b.build());
        let root = dc.root().unwrap();

        // One heap read for the root's own header happened inside `dc.root()`
        // above; everything from here on is attributable to `children()`.
        let reads_before = dc.inner.element_heap.read_count();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || root.children().unwrap())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Realizing the child set touches the element heap exactly once
        // (one record for the single child) no matter how many threads
        // raced to call `children()` — `LazyCell` lets exactly one of
        // them do the read and the rest observe the memoized result.
        let reads_after = dc.inner.element_heap.read_count();
        assert_eq!(reads_after - reads_before, 1);

        for kids in &results {
            assert_eq!(kids.len(), 1);
            assert_eq!(kids[0].name(), Some("child"));
        }
    }
}
