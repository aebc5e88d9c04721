//! InstantDB schema declaration for the teacherdesk entities.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::permissions::FILES_ENTITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Number,
    Boolean,
    Date,
    Json,
}

impl AttrType {
    fn as_str(self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Number => "number",
            AttrType::Boolean => "boolean",
            AttrType::Date => "date",
            AttrType::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub kind: AttrType,
    pub optional: bool,
    pub indexed: bool,
    pub unique: bool,
}

impl Attr {
    fn new(kind: AttrType) -> Self {
        Self {
            kind,
            optional: false,
            indexed: false,
            unique: false,
        }
    }

    pub fn string() -> Self {
        Self::new(AttrType::String)
    }
    pub fn number() -> Self {
        Self::new(AttrType::Number)
    }
    pub fn boolean() -> Self {
        Self::new(AttrType::Boolean)
    }
    pub fn date() -> Self {
        Self::new(AttrType::Date)
    }
    pub fn json() -> Self {
        Self::new(AttrType::Json)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn to_json(&self) -> Value {
        json!({
            "valueType": self.kind.as_str(),
            "required": !self.optional,
            "config": { "indexed": self.indexed, "unique": self.unique },
        })
    }
}

/// One side of a link: `entity.label`, with `has: "one" | "many"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEnd {
    pub on: String,
    pub label: String,
    pub many: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub forward: LinkEnd,
    pub reverse: LinkEnd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entities: BTreeMap<String, BTreeMap<String, Attr>>,
    links: BTreeMap<String, Link>,
}

impl Schema {
    pub fn entity<I>(mut self, name: &str, attrs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Attr)>,
    {
        let attrs = attrs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.entities.insert(name.to_string(), attrs);
        self
    }

    /// `name` links `from.forward_label` (one) to `to.reverse_label` (many).
    pub fn has_many(mut self, name: &str, from: (&str, &str), to: (&str, &str)) -> Self {
        self.links.insert(
            name.to_string(),
            Link {
                forward: LinkEnd {
                    on: from.0.to_string(),
                    label: from.1.to_string(),
                    many: false,
                },
                reverse: LinkEnd {
                    on: to.0.to_string(),
                    label: to.1.to_string(),
                    many: true,
                },
            },
        );
        self
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn attrs(&self, entity: &str) -> Option<&BTreeMap<String, Attr>> {
        self.entities.get(entity)
    }

    pub fn links(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn teacherdesk() -> Self {
        Schema::default()
            .entity(
                "teachers",
                [
                    ("user_id", Attr::string().unique().indexed()),
                    ("email", Attr::string().unique().indexed()),
                    ("name", Attr::string().optional()),
                    ("school", Attr::string().optional()),
                    ("subjects", Attr::json().optional()),
                    ("grades", Attr::json().optional()),
                    ("created_at", Attr::date()),
                    ("updated_at", Attr::date().optional()),
                ],
            )
            .entity(
                "chat_sessions",
                [
                    ("user_id", Attr::string().indexed()),
                    ("title", Attr::string()),
                    ("summary", Attr::string().optional()),
                    ("is_archived", Attr::boolean().optional()),
                    ("created_at", Attr::date().indexed()),
                    ("updated_at", Attr::date().indexed()),
                ],
            )
            .entity(
                "messages",
                [
                    ("user_id", Attr::string().indexed()),
                    ("session_id", Attr::string().indexed()),
                    ("role", Attr::string()),
                    ("content", Attr::string()),
                    ("metadata", Attr::json().optional()),
                    ("created_at", Attr::date().indexed()),
                ],
            )
            .entity(
                "library_materials",
                [
                    ("user_id", Attr::string().indexed()),
                    ("title", Attr::string()),
                    ("type", Attr::string().indexed()),
                    ("content", Attr::string()),
                    ("description", Attr::string().optional()),
                    ("tags", Attr::json().optional()),
                    ("source", Attr::string().optional()),
                    ("is_favorite", Attr::boolean().optional()),
                    ("created_at", Attr::date().indexed()),
                    ("updated_at", Attr::date()),
                ],
            )
            .entity(
                "generated_artifacts",
                [
                    ("user_id", Attr::string().indexed()),
                    ("agent_id", Attr::string().optional()),
                    ("kind", Attr::string()),
                    ("payload", Attr::json()),
                    ("created_at", Attr::date().indexed()),
                ],
            )
            .entity(
                FILES_ENTITY,
                [
                    ("path", Attr::string().unique().indexed()),
                    ("url", Attr::string()),
                ],
            )
            .has_many(
                "sessionMessages",
                ("messages", "session"),
                ("chat_sessions", "messages"),
            )
            .has_many(
                "teacherMaterials",
                ("library_materials", "owner"),
                ("teachers", "materials"),
            )
            .has_many(
                "teacherSessions",
                ("chat_sessions", "owner"),
                ("teachers", "sessions"),
            )
    }

    /// Render as the JSON shape of an InstantDB schema file.
    pub fn to_instant_json(&self) -> Value {
        let entities: Map<String, Value> = self
            .entities
            .iter()
            .map(|(name, attrs)| {
                let attrs: Map<String, Value> =
                    attrs.iter().map(|(k, a)| (k.clone(), a.to_json())).collect();
                (name.clone(), json!({ "attrs": attrs }))
            })
            .collect();

        let links: Map<String, Value> = self
            .links
            .iter()
            .map(|(name, link)| {
                let end = |e: &LinkEnd| {
                    json!({
                        "on": e.on,
                        "has": if e.many { "many" } else { "one" },
                        "label": e.label,
                    })
                };
                (
                    name.clone(),
                    json!({ "forward": end(&link.forward), "reverse": end(&link.reverse) }),
                )
            })
            .collect();

        json!({ "entities": entities, "links": links })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionSet, USER_OWNED_ENTITIES};

    #[test]
    fn test_schema_and_permissions_cover_same_entities() {
        let schema = Schema::teacherdesk();
        let perms = PermissionSet::teacher_defaults();
        let a: Vec<&str> = schema.entity_names().collect();
        let b: Vec<&str> = perms.entities().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_owned_entities_have_indexed_owner() {
        let schema = Schema::teacherdesk();
        for entity in USER_OWNED_ENTITIES {
            let attrs = schema.attrs(entity).unwrap();
            assert!(attrs["user_id"].indexed, "{entity}.user_id must be indexed");
            assert!(!attrs["user_id"].optional);
        }
    }

    #[test]
    fn test_links_reference_declared_entities() {
        let schema = Schema::teacherdesk();
        for (name, link) in schema.links() {
            assert!(schema.attrs(&link.forward.on).is_some(), "{name}");
            assert!(schema.attrs(&link.reverse.on).is_some(), "{name}");
        }
    }

    #[test]
    fn test_render_instant_json() {
        let doc = Schema::teacherdesk().to_instant_json();
        let title = &doc["entities"]["library_materials"]["attrs"]["title"];
        assert_eq!(title["valueType"], "string");
        assert_eq!(title["required"], true);
        assert_eq!(doc["links"]["sessionMessages"]["reverse"]["has"], "many");
        assert_eq!(doc["links"]["sessionMessages"]["forward"]["on"], "messages");
    }
}
