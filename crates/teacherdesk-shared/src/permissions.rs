//! Declarative access rules for the hosted database.
//!
//! The rules are enforced by InstantDB itself; this module is the single
//! source they are rendered from (`to_instant_json`), and it can evaluate
//! them locally so the rule set is testable.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::constants::TEST_USER_ID;

/// Entities whose records carry a `user_id` owner attribute.
pub const USER_OWNED_ENTITIES: &[&str] = &[
    "teachers",
    "chat_sessions",
    "messages",
    "library_materials",
    "generated_artifacts",
];

/// InstantDB's built-in storage namespace.
pub const FILES_ENTITY: &str = "$files";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Allow,
    Deny,
    /// The caller owns the record (`data.<field> == auth.id`) or is the
    /// internal test account.
    OwnerOrTestUser { field: String },
    /// Storage paths are namespaced by owner: `<user id>/<file name>`.
    PathOwnerOrTestUser,
}

impl Rule {
    pub fn owner() -> Self {
        Rule::OwnerOrTestUser {
            field: "user_id".to_string(),
        }
    }

    /// InstantDB CEL expression for this rule.
    pub fn expression(&self, test_user_id: &str) -> String {
        match self {
            Rule::Allow => "true".to_string(),
            Rule::Deny => "false".to_string(),
            Rule::OwnerOrTestUser { field } => {
                format!("auth.id == data.{field} || auth.id == '{test_user_id}'")
            }
            Rule::PathOwnerOrTestUser => format!(
                "data.path.startsWith(auth.id + '/') || auth.id == '{test_user_id}'"
            ),
        }
    }

    pub fn evaluate(&self, auth_id: Option<&str>, record: &Value, test_user_id: &str) -> bool {
        match self {
            Rule::Allow => true,
            Rule::Deny => false,
            Rule::OwnerOrTestUser { field } => match auth_id {
                Some(id) if id == test_user_id => true,
                Some(id) => record.get(field).and_then(Value::as_str) == Some(id),
                None => false,
            },
            Rule::PathOwnerOrTestUser => match auth_id {
                Some(id) if id == test_user_id => true,
                Some(id) => record
                    .get("path")
                    .and_then(Value::as_str)
                    .and_then(|path| path.strip_prefix(id))
                    .is_some_and(|rest| rest.starts_with('/')),
                None => false,
            },
        }
    }
}

/// Rules for every declared entity, keyed by entity name then action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    test_user_id: String,
    entities: BTreeMap<String, BTreeMap<Action, Rule>>,
}

impl PermissionSet {
    pub fn new(test_user_id: impl Into<String>) -> Self {
        Self {
            test_user_id: test_user_id.into(),
            entities: BTreeMap::new(),
        }
    }

    /// Owner-or-test-user on every user-owned entity; files are readable by
    /// anyone holding the URL and writable by their path owner.
    pub fn teacher_defaults() -> Self {
        let mut set = Self::new(TEST_USER_ID);
        for entity in USER_OWNED_ENTITIES {
            set = set.with_entity(entity, Rule::owner());
        }
        set.with_entity(FILES_ENTITY, Rule::PathOwnerOrTestUser)
            .with_rule(FILES_ENTITY, Action::View, Rule::Allow)
    }

    /// Apply `rule` to all four actions of `entity`.
    pub fn with_entity(mut self, entity: &str, rule: Rule) -> Self {
        let rules = Action::ALL.iter().map(|a| (*a, rule.clone())).collect();
        self.entities.insert(entity.to_string(), rules);
        self
    }

    pub fn with_rule(mut self, entity: &str, action: Action, rule: Rule) -> Self {
        self.entities
            .entry(entity.to_string())
            .or_default()
            .insert(action, rule);
        self
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn rule(&self, entity: &str, action: Action) -> Option<&Rule> {
        self.entities.get(entity)?.get(&action)
    }

    /// Whether `auth_id` may perform `action` on `record` of `entity`.
    /// Undeclared entities and actions are denied.
    pub fn allows(&self, entity: &str, action: Action, auth_id: Option<&str>, record: &Value) -> bool {
        self.rule(entity, action)
            .is_some_and(|rule| rule.evaluate(auth_id, record, &self.test_user_id))
    }

    /// Render as an InstantDB perms document.
    pub fn to_instant_json(&self) -> Value {
        let mut doc = Map::new();
        for (entity, rules) in &self.entities {
            let allow: Map<String, Value> = rules
                .iter()
                .map(|(action, rule)| {
                    (
                        action.as_str().to_string(),
                        Value::String(rule.expression(&self.test_user_id)),
                    )
                })
                .collect();
            doc.insert(entity.clone(), json!({ "allow": allow }));
        }
        Value::Object(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_can_do_everything() {
        let perms = PermissionSet::teacher_defaults();
        let record = json!({ "id": "m1", "user_id": "teacher-a" });
        for action in Action::ALL {
            assert!(perms.allows("library_materials", action, Some("teacher-a"), &record));
        }
    }

    #[test]
    fn test_other_user_and_anonymous_are_denied() {
        let perms = PermissionSet::teacher_defaults();
        let record = json!({ "user_id": "teacher-a" });
        assert!(!perms.allows("chat_sessions", Action::View, Some("teacher-b"), &record));
        assert!(!perms.allows("chat_sessions", Action::Delete, None, &record));
        // A record without an owner is not owned by anyone.
        assert!(!perms.allows("messages", Action::Update, Some("teacher-a"), &json!({})));
    }

    #[test]
    fn test_test_account_bypasses_ownership() {
        let perms = PermissionSet::teacher_defaults();
        let record = json!({ "user_id": "teacher-a" });
        assert!(perms.allows("messages", Action::Delete, Some(TEST_USER_ID), &record));
    }

    #[test]
    fn test_file_rules() {
        let perms = PermissionSet::teacher_defaults();
        let file = json!({ "path": "teacher-a/worksheet.pdf" });
        assert!(perms.allows(FILES_ENTITY, Action::View, None, &file));
        assert!(perms.allows(FILES_ENTITY, Action::Delete, Some("teacher-a"), &file));
        assert!(!perms.allows(FILES_ENTITY, Action::Delete, Some("teacher"), &file));
        assert!(!perms.allows(FILES_ENTITY, Action::Create, Some("teacher-b"), &file));
    }

    #[test]
    fn test_unknown_entity_denied() {
        let perms = PermissionSet::teacher_defaults();
        assert!(!perms.allows("invoices", Action::View, Some(TEST_USER_ID), &json!({})));
    }

    #[test]
    fn test_render_instant_json() {
        let doc = PermissionSet::teacher_defaults().to_instant_json();
        assert_eq!(
            doc["chat_sessions"]["allow"]["view"],
            format!("auth.id == data.user_id || auth.id == '{TEST_USER_ID}'")
        );
        assert_eq!(doc["$files"]["allow"]["view"], "true");
        assert!(doc["$files"]["allow"]["create"]
            .as_str()
            .unwrap()
            .starts_with("data.path.startsWith(auth.id + '/')"));
        assert_eq!(doc.as_object().unwrap().len(), USER_OWNED_ENTITIES.len() + 1);
    }
}
