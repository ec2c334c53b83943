//! JSON wire form of rule sets and specifications.
//!
//! ```json
//! {
//!   "Filters":     [{ "Filter": "((Id > 1) && (Name == \"x\"))" }],
//!   "Sorts":       [{ "OrderItem": "Id", "OrderType": 1 }],
//!   "Searches":    [{ "SearchItem": "Name", "SearchTerm": "A%", "SearchGroup": 1 }],
//!   "Projections": [{ "Assignor": "Name", "Assignee": "Label" }],
//!   "AsNoTracking": false,
//!   "AsSplitQuery": false,
//!   "IgnoreAutoIncludes": false,
//!   "IgnoreQueryFilters": false,
//!   "Skip": 0,
//!   "Take": 10
//! }
//! ```
//!
//! Filter texts are parsed with the grammar parser on the way in, one
//! predicate per element. Decoding through `Deserialize` uses the default
//! [`QueryConfig`]; [`QuerySpecification::from_json`] takes an explicit one.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::rules::{
    DEFAULT_SEARCH_GROUP, FilterRuleSet, ProjectionRuleSet, SearchRuleSet, SortRuleSet, SortType,
};
use crate::schema::Entity;
use crate::specification::{BehaviorFlags, QuerySpecification};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FilterItem {
    #[serde(rename = "Filter")]
    pub filter: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SortItem {
    #[serde(rename = "OrderItem")]
    pub field: String,
    #[serde(rename = "OrderType")]
    pub sort_type: SortType,
}

fn default_group() -> i32 {
    DEFAULT_SEARCH_GROUP
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    #[serde(rename = "SearchItem")]
    pub field: String,
    #[serde(rename = "SearchTerm")]
    pub pattern: String,
    #[serde(rename = "SearchGroup", default = "default_group")]
    pub group: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectionItem {
    #[serde(rename = "Assignor")]
    pub source: String,
    #[serde(rename = "Assignee", default)]
    pub destination: Option<String>,
}

/// Owned wire image of a specification.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SpecificationWire {
    #[serde(rename = "Filters")]
    pub filters: Vec<FilterItem>,
    #[serde(rename = "Sorts")]
    pub sorts: Vec<SortItem>,
    #[serde(rename = "Searches")]
    pub searches: Vec<SearchItem>,
    #[serde(rename = "Projections")]
    pub projections: Vec<ProjectionItem>,
    #[serde(rename = "AsNoTracking")]
    pub as_no_tracking: bool,
    #[serde(rename = "AsSplitQuery")]
    pub as_split_query: bool,
    #[serde(rename = "IgnoreAutoIncludes")]
    pub ignore_auto_includes: bool,
    #[serde(rename = "IgnoreQueryFilters")]
    pub ignore_query_filters: bool,
    #[serde(rename = "Skip")]
    pub skip: Option<u64>,
    #[serde(rename = "Take")]
    pub take: Option<u64>,
}

/* ---------- rule sets -> wire ---------- */

impl<T> FilterRuleSet<T> {
    #[must_use]
    pub fn to_wire(&self) -> Vec<FilterItem> {
        self.iter()
            .map(|p| FilterItem {
                filter: p.to_text(),
            })
            .collect()
    }
}

impl<T> SortRuleSet<T> {
    #[must_use]
    pub fn to_wire(&self) -> Vec<SortItem> {
        self.iter()
            .map(|r| SortItem {
                field: r.field().to_string(),
                sort_type: r.sort_type(),
            })
            .collect()
    }
}

impl<T> SearchRuleSet<T> {
    #[must_use]
    pub fn to_wire(&self) -> Vec<SearchItem> {
        self.iter()
            .map(|r| SearchItem {
                field: r.field().to_string(),
                pattern: r.pattern().to_owned(),
                group: r.group(),
            })
            .collect()
    }
}

impl<T, R> ProjectionRuleSet<T, R> {
    #[must_use]
    pub fn to_wire(&self) -> Vec<ProjectionItem> {
        self.iter()
            .map(|r| ProjectionItem {
                source: r.source().to_string(),
                destination: r.destination().map(ToString::to_string),
            })
            .collect()
    }
}

impl<T, R> QuerySpecification<T, R> {
    #[must_use]
    pub fn to_wire(&self) -> SpecificationWire {
        let flags = self.flags();
        SpecificationWire {
            filters: self.filters().to_wire(),
            sorts: self.sorts().to_wire(),
            searches: self.searches().to_wire(),
            projections: self.projections().to_wire(),
            as_no_tracking: flags.no_tracking,
            as_split_query: flags.split_query,
            ignore_auto_includes: flags.ignore_auto_includes,
            ignore_query_filters: flags.ignore_filters,
            skip: self.skip(),
            take: self.take(),
        }
    }
}

/* ---------- wire -> rule sets ---------- */

impl<T: Entity> FilterRuleSet<T> {
    /// Rebuild from wire items, rejecting texts longer than `max_len`.
    ///
    /// # Errors
    /// [`Error::InvalidFilter`] for oversized or unparsable texts.
    pub fn from_wire(items: &[FilterItem], max_len: usize) -> Result<Self> {
        let mut rules = Self::new();
        for item in items {
            if item.filter.len() > max_len {
                return Err(Error::InvalidFilter(format!(
                    "filter text is {} bytes, limit is {max_len}",
                    item.filter.len()
                )));
            }
            rules.add_text(&item.filter).map_err(|e| match e {
                Error::ArgumentNull(_) => Error::InvalidFilter("empty filter text".to_owned()),
                other => other,
            })?;
        }
        Ok(rules)
    }
}

impl<T: Entity> SortRuleSet<T> {
    /// # Errors
    /// Fails when a field does not resolve.
    pub fn from_wire(items: &[SortItem]) -> Result<Self> {
        let mut rules = Self::new();
        for item in items {
            rules.add(item.field.as_str(), item.sort_type)?;
        }
        Ok(rules)
    }
}

impl<T: Entity> SearchRuleSet<T> {
    /// # Errors
    /// Fails when a field does not resolve or a pattern is invalid.
    pub fn from_wire(items: &[SearchItem]) -> Result<Self> {
        let mut rules = Self::new();
        for item in items {
            rules.add_grouped(item.field.as_str(), &item.pattern, item.group)?;
        }
        Ok(rules)
    }
}

impl<T: Entity, R: Entity + Default> ProjectionRuleSet<T, R> {
    /// # Errors
    /// Fails on the same conditions as [`ProjectionRuleSet::add`] and
    /// [`ProjectionRuleSet::add_mapped`].
    pub fn from_wire(items: &[ProjectionItem]) -> Result<Self> {
        let mut rules = Self::new();
        for item in items {
            match &item.destination {
                Some(dest) => rules.add_mapped(item.source.as_str(), dest.as_str())?,
                None => rules.add(item.source.as_str())?,
            };
        }
        Ok(rules)
    }
}

impl<T: Entity, R: Entity + Default> QuerySpecification<T, R> {
    /// Rebuild a specification from its wire image.
    ///
    /// # Errors
    /// The first rule that fails to rebuild.
    pub fn from_wire(wire: &SpecificationWire, config: QueryConfig) -> Result<Self> {
        let max_len = config.max_filter_length;
        let mut spec = Self::with_config(config);
        *spec.filters_mut() = FilterRuleSet::from_wire(&wire.filters, max_len)?;
        *spec.sorts_mut() = SortRuleSet::from_wire(&wire.sorts)?;
        *spec.searches_mut() = SearchRuleSet::from_wire(&wire.searches)?;
        *spec.projections_mut() = ProjectionRuleSet::from_wire(&wire.projections)?;
        spec.set_flags(BehaviorFlags {
            no_tracking: wire.as_no_tracking,
            split_query: wire.as_split_query,
            ignore_filters: wire.ignore_query_filters,
            ignore_auto_includes: wire.ignore_auto_includes,
        });
        spec.set_skip(wire.skip).set_take(wire.take);
        Ok(spec)
    }

    /// Decode a JSON value with an explicit configuration.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for malformed JSON shapes, otherwise as
    /// [`QuerySpecification::from_wire`].
    pub fn from_json(value: serde_json::Value, config: QueryConfig) -> Result<Self> {
        let wire: SpecificationWire =
            serde_json::from_value(value).map_err(|e| Error::InvalidArgument(e.to_string()))?;
        Self::from_wire(&wire, config)
    }
}

/* ---------- serde ---------- */

impl<T> Serialize for FilterRuleSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_wire())
    }
}

impl<'de, T: Entity> Deserialize<'de> for FilterRuleSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<FilterItem>::deserialize(deserializer)?;
        Self::from_wire(&items, QueryConfig::default().max_filter_length).map_err(de::Error::custom)
    }
}

impl<T> Serialize for SortRuleSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_wire())
    }
}

impl<'de, T: Entity> Deserialize<'de> for SortRuleSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<SortItem>::deserialize(deserializer)?;
        Self::from_wire(&items).map_err(de::Error::custom)
    }
}

impl<T> Serialize for SearchRuleSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_wire())
    }
}

impl<'de, T: Entity> Deserialize<'de> for SearchRuleSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<SearchItem>::deserialize(deserializer)?;
        Self::from_wire(&items).map_err(de::Error::custom)
    }
}

impl<T, R> Serialize for ProjectionRuleSet<T, R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_wire())
    }
}

impl<'de, T: Entity, R: Entity + Default> Deserialize<'de> for ProjectionRuleSet<T, R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<ProjectionItem>::deserialize(deserializer)?;
        Self::from_wire(&items).map_err(de::Error::custom)
    }
}

impl<T, R> Serialize for QuerySpecification<T, R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let flags = self.flags();
        let mut state = serializer.serialize_struct("QuerySpecification", 10)?;
        state.serialize_field("Filters", self.filters())?;
        state.serialize_field("Sorts", self.sorts())?;
        state.serialize_field("Searches", self.searches())?;
        state.serialize_field("Projections", self.projections())?;
        state.serialize_field("AsNoTracking", &flags.no_tracking)?;
        state.serialize_field("AsSplitQuery", &flags.split_query)?;
        state.serialize_field("IgnoreAutoIncludes", &flags.ignore_auto_includes)?;
        state.serialize_field("IgnoreQueryFilters", &flags.ignore_filters)?;
        state.serialize_field("Skip", &self.skip())?;
        state.serialize_field("Take", &self.take())?;
        state.end()
    }
}

impl<'de, T: Entity, R: Entity + Default> Deserialize<'de> for QuerySpecification<T, R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = SpecificationWire::deserialize(deserializer)?;
        Self::from_wire(&wire, QueryConfig::default()).map_err(de::Error::custom)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, Row};
    use serde_json::json;
    use std::sync::OnceLock;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Device {
        id: i64,
        name: String,
        online: bool,
    }

    impl Entity for Device {
        fn schema() -> &'static EntitySchema<Self> {
            static SCHEMA: OnceLock<EntitySchema<Device>> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                EntitySchema::builder("Device")
                    .field("Id", |d: &Device| &d.id, |d: &mut Device| &mut d.id)
                    .field("Name", |d: &Device| &d.name, |d: &mut Device| &mut d.name)
                    .field("Online", |d: &Device| &d.online, |d: &mut Device| &mut d.online)
                    .build()
            })
        }
    }

    #[test]
    fn filter_wire_shape() {
        let mut rules = FilterRuleSet::<Device>::new();
        rules.add_text("id > 1 && name == 'a b'").unwrap();
        assert_eq!(
            serde_json::to_value(&rules).unwrap(),
            json!([{ "Filter": "((Id > 1) && (Name == \"a b\"))" }])
        );
    }

    #[test]
    fn sort_wire_shape() {
        let mut rules = SortRuleSet::<Device>::new();
        rules
            .add("Name", SortType::OrderBy)
            .unwrap()
            .add("Id", SortType::OrderByDescending)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&rules).unwrap(),
            json!([
                { "OrderItem": "Name", "OrderType": 0 },
                { "OrderItem": "Id", "OrderType": 3 },
            ])
        );
    }

    #[test]
    fn search_group_defaults_to_one() {
        let rules: SearchRuleSet<Device> =
            serde_json::from_value(json!([{ "SearchItem": "name", "SearchTerm": "x%" }])).unwrap();
        let rule = rules.iter().next().unwrap();
        assert_eq!(rule.group(), 1);
        assert_eq!(rule.field().as_str(), "Name");
    }

    #[test]
    fn bad_filter_text_fails_decoding() {
        let result: std::result::Result<FilterRuleSet<Device>, _> =
            serde_json::from_value(json!([{ "Filter": "Id 2" }]));
        assert!(result.is_err());
    }

    #[test]
    fn oversized_filter_text_is_rejected() {
        let items = vec![FilterItem {
            filter: format!("Name == \"{}\"", "x".repeat(64)),
        }];
        assert!(matches!(
            FilterRuleSet::<Device>::from_wire(&items, 16),
            Err(Error::InvalidFilter(_))
        ));
        assert!(FilterRuleSet::<Device>::from_wire(&items, 100).is_ok());
    }

    #[test]
    fn unknown_sort_type_fails_decoding() {
        let result: std::result::Result<SortRuleSet<Device>, _> =
            serde_json::from_value(json!([{ "OrderItem": "Id", "OrderType": 7 }]));
        assert!(result.is_err());
    }

    #[test]
    fn projection_assignee_is_null_without_destination() {
        let mut rules = ProjectionRuleSet::<Device, Row>::new();
        rules.add("Name").unwrap();
        assert_eq!(
            serde_json::to_value(&rules).unwrap(),
            json!([{ "Assignor": "Name", "Assignee": null }])
        );
    }

    #[test]
    fn specification_fields_are_siblings() {
        let mut spec = QuerySpecification::<Device>::new();
        spec.filters_mut().add_eq("Online", true).unwrap();
        spec.as_split_query().set_page(2, 5);

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["Filters"], json!([{ "Filter": "(Online == true)" }]));
        assert_eq!(value["AsSplitQuery"], json!(true));
        assert_eq!(value["AsNoTracking"], json!(false));
        assert_eq!(value["Skip"], json!(5));
        assert_eq!(value["Take"], json!(5));

        let back: QuerySpecification<Device> = serde_json::from_value(value).unwrap();
        assert_eq!(back.to_wire(), spec.to_wire());
    }

    #[test]
    fn from_json_honours_configured_limit() {
        let config = QueryConfig {
            max_filter_length: 8,
            ..QueryConfig::default()
        };
        let err = QuerySpecification::<Device>::from_json(
            json!({ "Filters": [{ "Filter": "Name == 'long enough'" }] }),
            config,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }
}
