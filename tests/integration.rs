use datacenter::{Address, AttrValue, DataCenterBuilder, Error, TypedValue};

/// Builds a small tree:
///
/// ```text
/// root
///  └─ child (attrs: n=42, b=true, f=3.5, s="hi")
///      └─ grandchild
/// ```
fn small_tree() -> datacenter::DataCenter {
    let mut b = DataCenterBuilder::new();
    let root_name = b.add_name("root");
    let child_name = b.add_name("child");
    let grandchild_name = b.add_name("grandchild");
    let n = b.add_name("n");
    let bname = b.add_name("b");
    let f = b.add_name("f");
    let s = b.add_name("s");
    b.add_extension();

    let str_addr = Address::new(0, 0);
    b.add_value(str_addr, "hi");

    let attr_n = b.push_attribute(0, n, AttrValue::Int32(42));
    b.push_attribute(0, bname, AttrValue::Boolean(true));
    b.push_attribute(0, f, AttrValue::Single(3.5));
    b.push_attribute(0, s, AttrValue::StringAt(str_addr));
    assert_eq!(attr_n, Address::new(0, 0));

    // grandchild at element index 2
    let grandchild = b.push_element(0, grandchild_name, 0, 0, 0, Address::ZERO, Address::ZERO);

    // child at element index 1, pointing at the grandchild
    let child = b.push_element(0, child_name, 0, 4, 1, Address::new(0, 0), grandchild);

    // root at element index 0, pointing at the child
    b.push_element(0, root_name, 0, 0, 1, Address::ZERO, child);

    b.build()
}

#[test]
fn navigates_full_tree() {
    let dc = small_tree();
    let root = dc.root().unwrap();
    assert_eq!(root.name(), Some("root"));

    let children = root.children().unwrap();
    assert_eq!(children.len(), 1);
    let child = &children[0];
    assert_eq!(child.name(), Some("child"));

    assert_eq!(child.attr("n").unwrap(), TypedValue::Int32(42));
    assert_eq!(child.attr("b").unwrap(), TypedValue::Boolean(true));
    assert_eq!(child.attr("f").unwrap(), TypedValue::Single(3.5));
    assert_eq!(child.attr("s").unwrap(), TypedValue::String("hi".to_string()));
    assert_eq!(child.attr("missing").unwrap(), TypedValue::Null);

    let grandchildren = child.children().unwrap();
    assert_eq!(grandchildren.len(), 1);
    let grandchild = &grandchildren[0];
    assert_eq!(grandchild.name(), Some("grandchild"));

    let ancestors: Vec<_> = grandchild.ancestors().unwrap().iter().map(|e| e.name().unwrap().to_string()).collect();
    assert_eq!(ancestors, vec!["child", "root"]);

    let descendants: Vec<_> = root.descendants().unwrap().iter().map(|e| e.name().unwrap().to_string()).collect();
    assert_eq!(descendants, vec!["child", "grandchild"]);

    assert!(child.siblings().unwrap().is_empty());
    assert!(root.ancestors().unwrap().is_empty());
}

#[test]
fn freeze_then_close_then_read() {
    let dc = small_tree();
    dc.freeze();
    assert!(matches!(dc.close().unwrap_err(), Error::FrozenViolation));
    assert!(dc.root().is_ok());
}

#[test]
fn close_then_navigate_fails() {
    let dc = small_tree();
    let root = dc.root().unwrap();
    let child = root.children().unwrap().into_iter().next().unwrap();
    dc.close().unwrap();
    assert!(matches!(dc.root().unwrap_err(), Error::UseAfterDispose));
    assert!(matches!(child.children().unwrap_err(), Error::UseAfterDispose));
}
