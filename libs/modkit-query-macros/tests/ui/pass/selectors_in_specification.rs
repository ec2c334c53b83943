use modkit_query::{QueryEntity, QuerySpecification, SortType};

#[derive(Clone, Default, QueryEntity)]
struct Product {
    #[query(rename = "Sku")]
    id: String,
    price: f64,
    r#type: String,
}

fn main() {
    let mut spec = QuerySpecification::<Product>::new();
    spec.sorts_mut().add(Product::PRICE, SortType::OrderBy).unwrap();
    spec.filters_mut().add_eq(Product::TYPE, "book").unwrap();
    assert_eq!(Product::ID.name(), "Sku");
}
