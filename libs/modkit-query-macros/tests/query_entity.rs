use modkit_query::{Entity, FieldKind, FieldRef, QueryEntity, Value};

#[derive(Clone, Debug, Default, QueryEntity)]
struct Address {
    city: String,
    zip_code: Option<String>,
}

#[derive(Clone, Debug, Default, QueryEntity)]
#[query(name = "Customer")]
struct CustomerRecord {
    id: i64,
    #[query(rename = "Title")]
    full_name: String,
    is_active: bool,
    #[query(read_only)]
    order_count: i32,
    #[query(skip)]
    #[allow(dead_code)]
    cache: Vec<u8>,
    #[query(nested)]
    address: Address,
}

fn sample() -> CustomerRecord {
    CustomerRecord {
        id: 7,
        full_name: "Ann Lee".to_owned(),
        is_active: true,
        order_count: 3,
        cache: vec![1, 2, 3],
        address: Address {
            city: "Berlin".to_owned(),
            zip_code: None,
        },
    }
}

#[test]
fn test_default_names_are_upper_camel_case() {
    let names: Vec<&str> = Address::schema()
        .fields()
        .iter()
        .map(|f| f.path().as_str())
        .collect();
    assert_eq!(names, vec!["City", "ZipCode"]);
}

#[test]
fn test_struct_name_override() {
    assert_eq!(CustomerRecord::schema().name(), "Customer");
    assert_eq!(Address::schema().name(), "Address");
}

#[test]
fn test_rename_skip_and_nested() {
    let names: Vec<&str> = CustomerRecord::schema()
        .fields()
        .iter()
        .map(|f| f.path().as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "Id",
            "Title",
            "IsActive",
            "OrderCount",
            "Address.City",
            "Address.ZipCode"
        ]
    );
    assert!(CustomerRecord::schema().find("Cache").is_none());
    assert!(CustomerRecord::schema().find("FullName").is_none());
}

#[test]
fn test_field_selector_constants() {
    let id: FieldRef<CustomerRecord, i64> = CustomerRecord::ID;
    let title: FieldRef<CustomerRecord, String> = CustomerRecord::FULL_NAME;
    assert_eq!(id.name(), "Id");
    assert_eq!(title.name(), "Title");
    assert_eq!(CustomerRecord::ORDER_COUNT.name(), "OrderCount");
    assert_eq!(Address::ZIP_CODE.name(), "ZipCode");
}

#[test]
fn test_kinds_and_nullability() {
    let schema = CustomerRecord::schema();
    let active = schema.resolve("isactive").unwrap();
    assert_eq!(active.kind(), FieldKind::Bool);
    assert!(!active.is_nullable());

    let zip = schema.resolve("Address.ZipCode").unwrap();
    assert_eq!(zip.kind(), FieldKind::String);
    assert!(zip.is_nullable());
}

#[test]
fn test_accessors_read_and_write() {
    let schema = CustomerRecord::schema();
    let mut c = sample();

    assert_eq!(schema.resolve("Title").unwrap().get(&c), Value::from("Ann Lee"));
    assert_eq!(schema.resolve("Address.City").unwrap().get(&c), Value::from("Berlin"));
    assert_eq!(schema.resolve("Address.ZipCode").unwrap().get(&c), Value::Null);

    assert!(schema.resolve("Id").unwrap().set(&mut c, Value::I64(9)));
    assert_eq!(c.id, 9);

    let orders = schema.resolve("OrderCount").unwrap();
    assert!(!orders.is_writable());
    assert!(!orders.set(&mut c, Value::I64(1)));
    assert_eq!(c.order_count, 3);

    assert!(!schema.resolve("Address.City").unwrap().is_writable());
}

#[test]
fn test_ui_pass() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/pass/*.rs");
}
