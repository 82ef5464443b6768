//! Entity state extraction from edit pages
//!
//! Edit pages embed the server-side stash as a JSON argument inside a
//! script tag (`Object.defineProperty(window,"__MB__",...)`). There's no API
//! that exposes the same data, so the JSON is located by its surrounding
//! text and decoded with serde.

use crate::error::{EditError, EditResult};
use crate::models::{Entity, PartialDate, Relationship};
use serde::Deserialize;

const MB_PROPERTY_PREFIX: &str = r#"Object.defineProperty(window,"__MB__","#;
const CATALYST_PREFIX: &str = r#","$c":Object.freeze("#;

/// `window.__MB__.$c`
#[derive(Debug, Deserialize)]
struct CatalystData {
    stash: Stash,
}

#[derive(Debug, Deserialize)]
struct Stash {
    source_entity: SourceEntity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceEntity {
    #[serde(default)]
    gid: String,
    #[serde(default)]
    entity_type: String,
    #[serde(default)]
    name: String,
    /// Only present for URLs
    #[serde(default)]
    decoded: Option<String>,
    #[serde(default)]
    relationships: Vec<JsonRelationship>,
}

#[derive(Debug, Deserialize)]
struct JsonRelationship {
    id: u64,
    #[serde(rename = "linkTypeID")]
    link_type_id: u32,
    #[serde(default)]
    backward: bool,
    #[serde(default)]
    begin_date: Option<JsonDate>,
    #[serde(default)]
    end_date: Option<JsonDate>,
    #[serde(default)]
    ended: bool,
    #[serde(rename = "verbosePhrase", default)]
    verbose_phrase: String,
    target: JsonTarget,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonTarget {
    #[serde(default)]
    name: String,
    entity_type: String,
    gid: String,
}

/// Date components are null when unknown.
#[derive(Debug, Default, Deserialize)]
struct JsonDate {
    year: Option<u16>,
    month: Option<u8>,
    day: Option<u8>,
}

impl From<Option<JsonDate>> for PartialDate {
    fn from(date: Option<JsonDate>) -> Self {
        let date = date.unwrap_or_default();
        PartialDate::new(
            date.year.unwrap_or(0),
            date.month.unwrap_or(0),
            date.day.unwrap_or(0),
        )
    }
}

impl From<JsonRelationship> for Relationship {
    fn from(rel: JsonRelationship) -> Self {
        Relationship {
            id: rel.id,
            link_type_id: rel.link_type_id,
            link_phrase: rel.verbose_phrase,
            begin_date: rel.begin_date.into(),
            end_date: rel.end_date.into(),
            ended: rel.ended,
            backward: rel.backward,
            target_mbid: rel.target.gid,
            target_name: rel.target.name,
            target_type: rel.target.entity_type,
        }
    }
}

/// Extract the source entity from an edit page.
pub fn parse_edit_page(page: &str) -> EditResult<Entity> {
    let rest = seek(page, MB_PROPERTY_PREFIX)
        .ok_or_else(|| EditError::Scrape("missing __MB__ property".to_string()))?;
    let rest = seek(rest, CATALYST_PREFIX)
        .ok_or_else(|| EditError::Scrape("missing $c property".to_string()))?;

    // Only the first value is decoded; the rest of the script follows it.
    let mut de = serde_json::Deserializer::from_str(rest);
    let data = CatalystData::deserialize(&mut de)
        .map_err(|e| EditError::Scrape(format!("decoding $c: {}", e)))?;
    let ent = data.stash.source_entity;

    if let Some(decoded) = &ent.decoded {
        if *decoded != ent.name {
            return Err(EditError::Scrape(format!(
                "URLs don't match (name={:?}, decoded={:?})",
                ent.name, decoded
            )));
        }
    }

    Ok(Entity {
        mbid: ent.gid,
        entity_type: ent.entity_type,
        name: ent.name,
        relationships: ent.relationships.into_iter().map(Relationship::from).collect(),
    })
}

fn seek<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.find(prefix).map(|idx| &s[idx + prefix.len()..])
}

/// Wrap a `$c` JSON object in the script boilerplate of an edit page.
///
/// Used by tests and the mock server.
pub fn render_edit_page(catalyst_json: &str) -> String {
    format!(
        "<html><head><script>{}{{\"DBDefs\":{{}}{}{})}});</script></head><body></body></html>",
        MB_PROPERTY_PREFIX, CATALYST_PREFIX, catalyst_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_type;

    const URL_STASH: &str = r#"{"stash":{"source_entity":{
        "gid":"0e8f52a1-0c5a-4e8d-9f1b-2d1b7f3c6a77",
        "entityType":"url",
        "name":"http://www.geocities.com/test/",
        "decoded":"http://www.geocities.com/test/",
        "relationships":[
          {"id":123,"linkTypeID":183,"backward":true,
           "begin_date":{"year":1999,"month":null,"day":null},
           "end_date":null,"ended":false,
           "verbosePhrase":"has an official homepage at",
           "target":{"name":"Some Artist","entityType":"artist",
                     "gid":"63a5c79f-697e-47e0-975d-1e2087a454aa"}},
          {"id":124,"linkTypeID":85,"backward":true,
           "begin_date":{"year":null,"month":null,"day":null},
           "end_date":{"year":2005,"month":3,"day":14},"ended":true,
           "verbosePhrase":"has a fan page at",
           "target":{"name":"An Album","entityType":"release",
                     "gid":"5b11f4ce-a62d-471e-81fc-a69a8278c7da"}}
        ]}},"user":null}"#;

    #[test]
    fn test_parse_url_page() {
        let entity = parse_edit_page(&render_edit_page(URL_STASH)).unwrap();
        assert_eq!(entity.mbid, "0e8f52a1-0c5a-4e8d-9f1b-2d1b7f3c6a77");
        assert_eq!(entity.entity_type, entity_type::URL);
        assert_eq!(entity.name, "http://www.geocities.com/test/");
        assert_eq!(
            entity.relationships,
            vec![
                Relationship {
                    id: 123,
                    link_type_id: 183,
                    link_phrase: "has an official homepage at".to_string(),
                    begin_date: PartialDate::new(1999, 0, 0),
                    backward: true,
                    target_mbid: "63a5c79f-697e-47e0-975d-1e2087a454aa".to_string(),
                    target_name: "Some Artist".to_string(),
                    target_type: "artist".to_string(),
                    ..Default::default()
                },
                Relationship {
                    id: 124,
                    link_type_id: 85,
                    link_phrase: "has a fan page at".to_string(),
                    end_date: PartialDate::new(2005, 3, 14),
                    ended: true,
                    backward: true,
                    target_mbid: "5b11f4ce-a62d-471e-81fc-a69a8278c7da".to_string(),
                    target_name: "An Album".to_string(),
                    target_type: "release".to_string(),
                    ..Default::default()
                },
            ]
        );
    }

    #[test]
    fn test_missing_markers() {
        assert!(matches!(
            parse_edit_page("<html></html>"),
            Err(EditError::Scrape(_))
        ));
        let no_catalyst = format!("{}{{\"DBDefs\":{{}}}}", MB_PROPERTY_PREFIX);
        assert!(matches!(
            parse_edit_page(&no_catalyst),
            Err(EditError::Scrape(_))
        ));
    }

    #[test]
    fn test_mismatched_decoded_url() {
        let json = r#"{"stash":{"source_entity":{"gid":"x","entityType":"url",
            "name":"http://a.example/%20","decoded":"http://a.example/ ",
            "relationships":[]}}}"#;
        let err = parse_edit_page(&render_edit_page(json)).unwrap_err();
        assert!(err.to_string().contains("don't match"), "{}", err);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_edit_page(&render_edit_page(r#"{"stash":"#)),
            Err(EditError::Scrape(_))
        ));
    }
}
