use std::collections::BTreeSet;

use super::model::EntityKind;

pub const VIEW_USERS: &str = "view_users";
pub const ACCESS_PRIVILEGES: &str = "access_privileges";

/// Which relation of which entity kind needs which privilege. `None` means any caller.
pub const RELATION_RULES: &[(EntityKind, &str, Option<&str>)] = &[
    (EntityKind::CompanyObjective, "companyKeyResults", None),
    (EntityKind::CompanyKeyResult, "companyObjective", None),
    (EntityKind::CompanyKeyResult, "businessUnitKeyResults", None),
    (EntityKind::CompanyKeyResult, "history", None),
    (EntityKind::BusinessUnit, "businessUnitObjectives", None),
    (EntityKind::BusinessUnit, "okrUsers", None),
    (EntityKind::BusinessUnitObjective, "businessUnit", None),
    (EntityKind::BusinessUnitObjective, "businessUnitKeyResults", None),
    (EntityKind::BusinessUnitKeyResult, "businessUnitObjective", None),
    (EntityKind::BusinessUnitKeyResult, "companyKeyResult", None),
    (EntityKind::BusinessUnitKeyResult, "history", None),
    (EntityKind::Role, "okrUsers", Some(VIEW_USERS)),
    (EntityKind::Role, "privileges", Some(ACCESS_PRIVILEGES)),
    (EntityKind::OkrUser, "role", None),
    (EntityKind::OkrUser, "businessUnit", None),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityFilter;

impl VisibilityFilter {
    pub fn exposed_relations(
        &self,
        kind: EntityKind,
        privileges: &BTreeSet<String>,
    ) -> BTreeSet<&'static str> {
        RELATION_RULES
            .iter()
            .filter(|(rule_kind, _, required)| {
                *rule_kind == kind && required.map_or(true, |p| privileges.contains(p))
            })
            .map(|(_, relation, _)| *relation)
            .collect()
    }

    pub fn is_exposed(&self, kind: EntityKind, relation: &str, privileges: &BTreeSet<String>) -> bool {
        self.exposed_relations(kind, privileges).contains(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privileges(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_role_relations_need_privileges() {
        let filter = VisibilityFilter;
        assert!(filter.exposed_relations(EntityKind::Role, &privileges(&[])).is_empty());

        let users_only = filter.exposed_relations(EntityKind::Role, &privileges(&[VIEW_USERS]));
        assert_eq!(users_only.into_iter().collect::<Vec<_>>(), vec!["okrUsers"]);

        let both = filter.exposed_relations(
            EntityKind::Role,
            &privileges(&[VIEW_USERS, ACCESS_PRIVILEGES]),
        );
        assert!(both.contains("okrUsers") && both.contains("privileges"));
    }

    #[test]
    fn test_unrestricted_relations() {
        let filter = VisibilityFilter;
        let none = privileges(&[]);
        assert!(filter.is_exposed(EntityKind::BusinessUnitKeyResult, "companyKeyResult", &none));
        assert!(filter.is_exposed(EntityKind::CompanyObjective, "companyKeyResults", &none));
        assert!(!filter.is_exposed(EntityKind::CompanyObjective, "okrUsers", &none));
        assert!(filter.exposed_relations(EntityKind::Privilege, &none).is_empty());
    }

    #[test]
    fn test_unknown_privileges_are_ignored() {
        let filter = VisibilityFilter;
        let extra = privileges(&["delete_everything"]);
        assert_eq!(
            filter.exposed_relations(EntityKind::Role, &extra),
            BTreeSet::new()
        );
    }
}
