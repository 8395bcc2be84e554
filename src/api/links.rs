//! HAL-style `_links` on JSON responses.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::okr::model::EntityKind;
use crate::okr::VisibilityFilter;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Links {
    One(Link),
    Many(Vec<Link>),
}

#[derive(Debug, Serialize)]
pub struct Resource<T: Serialize> {
    #[serde(flatten)]
    pub body: T,
    #[serde(rename = "_links")]
    pub links: BTreeMap<&'static str, Links>,
}

#[derive(Debug, Serialize)]
pub struct Collection<T: Serialize> {
    #[serde(rename = "_embedded")]
    pub embedded: BTreeMap<&'static str, Vec<Resource<T>>>,
    #[serde(rename = "_links")]
    pub links: BTreeMap<&'static str, Links>,
}

impl<T: Serialize> Collection<T> {
    pub fn new(relation: &'static str, self_href: String, items: Vec<Resource<T>>) -> Self {
        Self {
            embedded: BTreeMap::from([(relation, items)]),
            links: BTreeMap::from([("self", Links::One(Link { href: self_href }))]),
        }
    }
}

/// Collects the links of one entity, dropping relations the caller may not see.
pub struct LinkBuilder<'a> {
    base: &'a str,
    exposed: BTreeSet<&'static str>,
    links: BTreeMap<&'static str, Links>,
}

impl<'a> LinkBuilder<'a> {
    pub fn new(
        base: &'a str,
        filter: &VisibilityFilter,
        kind: EntityKind,
        privileges: &BTreeSet<String>,
        self_path: String,
    ) -> Self {
        let href = format!("{base}{self_path}");
        Self {
            base,
            exposed: filter.exposed_relations(kind, privileges),
            links: BTreeMap::from([("self", Links::One(Link { href }))]),
        }
    }

    pub fn relation(mut self, name: &'static str, path: Option<String>) -> Self {
        if let Some(path) = path {
            if self.exposed.contains(name) {
                let href = format!("{}{path}", self.base);
                self.links.insert(name, Links::One(Link { href }));
            }
        }
        self
    }

    pub fn relations(mut self, name: &'static str, paths: Vec<String>) -> Self {
        if !paths.is_empty() && self.exposed.contains(name) {
            let links = paths
                .into_iter()
                .map(|path| Link {
                    href: format!("{}{path}", self.base),
                })
                .collect();
            self.links.insert(name, Links::Many(links));
        }
        self
    }

    pub fn finish<T: Serialize>(self, body: T) -> Resource<T> {
        Resource {
            body,
            links: self.links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hidden_relations_are_dropped() {
        let filter = VisibilityFilter;
        let none = BTreeSet::new();
        let resource = LinkBuilder::new("/api/v1", &filter, EntityKind::Role, &none, "/roles/1".into())
            .relations("okrUsers", vec!["/okrUsers/4".into()])
            .relations("privileges", vec!["/privileges/2".into()])
            .finish(json!({"id": 1, "name": "admin"}));
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "name": "admin",
                "_links": {"self": {"href": "/api/v1/roles/1"}}
            })
        );
    }

    #[test]
    fn test_absent_relations_are_skipped() {
        let filter = VisibilityFilter;
        let none = BTreeSet::new();
        let resource = LinkBuilder::new(
            "",
            &filter,
            EntityKind::BusinessUnitKeyResult,
            &none,
            "/businessUnitKeyResults/3".into(),
        )
        .relation("companyKeyResult", None)
        .relation("history", Some("/businessUnitKeyResults/3/history".into()))
        .finish(json!({}));
        assert!(resource.links.contains_key("history"));
        assert!(!resource.links.contains_key("companyKeyResult"));
    }
}
