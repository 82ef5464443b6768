//! Rewrite rules and the URL maintenance tasks built from them
//!
//! Each rule is a pattern plus a [`Transform`] describing what to do with a
//! matching URL. Transforms are plain data so rules can be inspected and
//! tested on their own.

use super::{RelationshipUpdate, RewriteResult};
use crate::models::{entity_type, has_target_type, Entity, PartialDate, Relationship};
use regex::{Captures, Regex};

pub const TIDAL_EDIT_NOTE: &str =
    "normalize Tidal streaming URLs: https://tickets.metabrainz.org/browse/MBBE-71";
pub const GEOCITIES_EDIT_NOTE: &str =
    "end GeoCities relationships: https://tickets.metabrainz.org/browse/MBBE-47";
pub const TIDAL_STORE_EDIT_NOTE: &str =
    "end Tidal Store relationships: https://tickets.metabrainz.org/browse/MBBE-63";
pub const RECMUSIC_EDIT_NOTE: &str = "convert RecMusic URLs to Tower Records Music: \
     https://tickets.metabrainz.org/browse/MBBE-48, \
     https://tickets.metabrainz.org/browse/MBBE-49";

/// https://en.wikipedia.org/wiki/Yahoo!_GeoCities
pub const GEOCITIES_END_DATE: PartialDate = PartialDate::new(2009, 10, 26);
pub const GEOCITIES_JAPAN_END_DATE: PartialDate = PartialDate::new(2019, 3, 31);
pub const TIDAL_STORE_END_DATE: PartialDate = PartialDate::new(2022, 10, 20);
/// Also the date music.tower.jp started
pub const RECMUSIC_END_DATE: PartialDate = PartialDate::new(2021, 10, 1);

/// Resolves a path that could name one of several resources, using the
/// types of the entity's relationship targets.
#[derive(Debug, Clone)]
pub struct Disambiguation {
    /// Matched against the captured path
    pub pattern: Regex,
    /// (target type, replacement) pairs in priority order. The replacement
    /// may refer to groups of `pattern`, e.g. "/track/$2".
    pub preferences: Vec<(String, String)>,
}

/// What a rule does with a matching URL
#[derive(Debug, Clone)]
pub enum Transform {
    /// Rewrite the URL to `canonical_base` followed by capture group 1.
    Canonicalize {
        canonical_base: String,
        disambiguation: Option<Disambiguation>,
    },

    /// Keep the URL and end every active relationship. The end date may
    /// depend on capture group 1 (e.g. a regional top-level domain).
    Retire {
        default_end_date: PartialDate,
        regional_end_dates: Vec<(String, PartialDate)>,
    },

    /// Keep the URL, set each relationship's link type according to its
    /// target's type, and end every active relationship.
    Reclassify {
        link_types: Vec<(String, u32)>,
        end_date: PartialDate,
    },

    /// Keep the URL, end its relationships, and create a new URL carrying
    /// the same relationships starting at `cutover`.
    ///
    /// `destination` may refer to capture groups, e.g. "https://x/$1/$2".
    /// Capture groups 1 and 2 are checked against `unreachable`, which lists
    /// resources known not to exist at the destination.
    Migrate {
        destination: String,
        cutover: PartialDate,
        unreachable: Vec<(String, String)>,
    },
}

/// A pattern and the transform applied to URLs matching it
#[derive(Debug, Clone)]
pub struct Rule {
    name: &'static str,
    pattern: Regex,
    transform: Transform,
    edit_note: String,
}

impl Rule {
    pub fn new(
        name: &'static str,
        pattern: &str,
        transform: Transform,
        edit_note: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            transform,
            edit_note: edit_note.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn edit_note(&self) -> &str {
        &self.edit_note
    }

    /// Evaluate the rule for `entity`, whose name produced `caps`.
    ///
    /// Returns `None` if the rule declines, i.e. the URL matched but the
    /// rule has nothing sensible to do with it.
    pub fn evaluate(&self, caps: &Captures, entity: &Entity) -> Option<RewriteResult> {
        let rels = &entity.relationships;
        let mut res = RewriteResult {
            rewritten: entity.name.clone(),
            edit_note: self.edit_note.clone(),
            ..Default::default()
        };

        match &self.transform {
            Transform::Canonicalize {
                canonical_base,
                disambiguation,
            } => {
                let path = caps.get(1)?.as_str();
                let path = match disambiguation {
                    Some(d) => d.resolve(path, rels)?,
                    None => path.to_string(),
                };
                res.rewritten = format!("{}{}", canonical_base, path);
            }

            Transform::Retire {
                default_end_date,
                regional_end_dates,
            } => {
                let region = caps.get(1).map(|m| m.as_str());
                let end_date = regional_end_dates
                    .iter()
                    .find(|(r, _)| Some(r.as_str()) == region)
                    .map(|(_, d)| *d)
                    .unwrap_or(*default_end_date);
                res.updated = collect_updates(rels, |rel| end(rel, end_date));
                if res.updated.is_empty() {
                    return None;
                }
            }

            Transform::Reclassify {
                link_types,
                end_date,
            } => {
                res.updated = collect_updates(rels, |rel| {
                    if let Some((_, id)) = link_types.iter().find(|(t, _)| *t == rel.target_type) {
                        rel.link_type_id = *id;
                    }
                    end(rel, *end_date);
                });
                // TODO: The server rejects edits that would duplicate an existing
                // relationship (same link type, source and target); detect those here.
                if res.updated.is_empty() {
                    return None;
                }
            }

            Transform::Migrate {
                destination,
                cutover,
                unreachable,
            } => {
                if rels.is_empty() {
                    return None;
                }
                res.updated = collect_updates(rels, |rel| end(rel, *cutover));

                let kind = caps.get(1).map_or("", |m| m.as_str());
                let id = caps.get(2).map_or("", |m| m.as_str());
                let reachable = !unreachable.iter().any(|(k, i)| k == kind && i == id);

                let mut url = String::new();
                caps.expand(destination, &mut url);
                let mut new_url = Entity::new_url(url);
                if reachable {
                    new_url.relationships = rels
                        .iter()
                        // Only relationships ended by this run move over. Ones that
                        // ended earlier either predate the destination or were
                        // migrated already.
                        .filter(|rel| !rel.ended)
                        .map(|rel| Relationship {
                            id: 0,
                            begin_date: *cutover,
                            end_date: PartialDate::default(),
                            ended: false,
                            ..rel.clone()
                        })
                        .collect();
                }
                if !new_url.relationships.is_empty() {
                    res.new_entities.push(new_url);
                }
            }
        }

        Some(res)
    }
}

impl Disambiguation {
    /// Resolve `path`, returning it unchanged if it isn't ambiguous.
    /// Returns `None` if no relationship says which resource is meant.
    fn resolve(&self, path: &str, rels: &[Relationship]) -> Option<String> {
        let Some(caps) = self.pattern.captures(path) else {
            return Some(path.to_string());
        };
        let (_, replacement) = self
            .preferences
            .iter()
            .find(|(target_type, _)| has_target_type(rels, target_type))?;
        let mut resolved = String::new();
        caps.expand(replacement, &mut resolved);
        Some(resolved)
    }
}

/// Apply `change` to a copy of each relationship, keeping the ones it altered.
fn collect_updates(
    rels: &[Relationship],
    mut change: impl FnMut(&mut Relationship),
) -> Vec<RelationshipUpdate> {
    rels.iter()
        .filter_map(|orig| {
            let mut desired = orig.clone();
            change(&mut desired);
            (desired != *orig).then(|| RelationshipUpdate {
                original: orig.clone(),
                desired,
            })
        })
        .collect()
}

/// Mark `rel` as ended on `date` unless it already ended.
fn end(rel: &mut Relationship, date: PartialDate) {
    if !rel.ended {
        rel.ended = true;
        rel.end_date = date;
    }
}

/// The URL maintenance tasks, in evaluation order.
pub fn standard_rules() -> Result<Vec<Rule>, regex::Error> {
    Ok(vec![
        // MBBE-71: Normalize Tidal streaming URLs:
        //  https://listen.tidal.com/album/114997210 -> https://tidal.com/album/114997210
        //  https://tidal.com/browse/artist/5015356  -> https://tidal.com/artist/5015356
        Rule::new(
            "tidal-streaming",
            concat!(
                r"^https?://",
                r"(?:(?:desktop\.|desktop\.stage\.|listen\.|www\.)?tidal\.com)",
                r"(?:/browse)?",
                r"(/(?:album|artist|track|video|album/\d+/track)/\d+)",
                r"(?:/|\?.*)?",
                r"$",
            ),
            Transform::Canonicalize {
                canonical_base: "https://tidal.com".to_string(),
                disambiguation: Some(Disambiguation {
                    pattern: Regex::new(r"^/album/(\d+)/track/(\d+)$")?,
                    preferences: vec![
                        (entity_type::RECORDING.to_string(), "/track/$2".to_string()),
                        (entity_type::RELEASE.to_string(), "/album/$1".to_string()),
                    ],
                }),
            },
            TIDAL_EDIT_NOTE,
        )?,
        // MBBE-47: Mark GeoCities URL relationships as ended.
        Rule::new(
            "geocities",
            r"^https?://(?:[-a-z0-9]+\.)?geocities\.(?:yahoo\.)?(com|jp|co\.jp)/.*$",
            Transform::Retire {
                default_end_date: GEOCITIES_END_DATE,
                regional_end_dates: vec![
                    ("jp".to_string(), GEOCITIES_JAPAN_END_DATE),
                    ("co.jp".to_string(), GEOCITIES_JAPAN_END_DATE),
                ],
            },
            GEOCITIES_EDIT_NOTE,
        )?,
        // MBBE-63: Mark Tidal Store URL relationships as ended.
        Rule::new(
            "tidal-store",
            r"^https?://(?:store\.tidal\.com|tidal\.com(?:/[a-zA-Z]{2})?/store)/.*$",
            Transform::Reclassify {
                link_types: vec![
                    (entity_type::ARTIST.to_string(), 176), // "music can be purchased for download at"
                    (entity_type::RELEASE.to_string(), 74), // "can be purchased for download at"
                    (entity_type::RECORDING.to_string(), 254), // "can be purchased for download at"
                ],
                end_date: TIDAL_STORE_END_DATE,
            },
            TIDAL_STORE_EDIT_NOTE,
        )?,
        // MBBE-48: Mark RecMusic links as ended
        // MBBE-49: Migrate RecMusic URLs to Tower Records Music URLs
        Rule::new(
            "recmusic",
            r"^https?://recmusic\.jp/(?:[a-z][a-z]/)?(artist|album)/\?id=(\d+)$",
            Transform::Migrate {
                destination: "https://music.tower.jp/$1/detail/$2".to_string(),
                cutover: RECMUSIC_END_DATE,
                unreachable: vec![
                    ("artist".to_string(), "2001445271".to_string()),
                    ("album".to_string(), "1016070930".to_string()),
                ],
            },
            RECMUSIC_EDIT_NOTE,
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::RuleTable;

    const D: PartialDate = PartialDate::new(2003, 7, 9); // arbitrary

    fn rel(target_type: &str) -> Relationship {
        Relationship {
            target_type: target_type.to_string(),
            ..Default::default()
        }
    }

    fn run(url: &str, rels: Vec<Relationship>) -> Option<RewriteResult> {
        let table = RuleTable::standard().unwrap();
        table.apply(&Entity {
            relationships: rels,
            ..Entity::new_url(url)
        })
    }

    fn desired(res: &RewriteResult) -> Vec<Relationship> {
        res.updated.iter().map(|u| u.desired.clone()).collect()
    }

    #[test]
    fn test_tidal_canonical_forms() {
        for (url, want) in [
            ("http://tidal.com/album/11069", "https://tidal.com/album/11069"),
            ("https://listen.tidal.com/artist/11069", "https://tidal.com/artist/11069"),
            ("https://tidal.com/browse/track/11069", "https://tidal.com/track/11069"),
            ("https://www.tidal.com/album/11069", "https://tidal.com/album/11069"),
            ("https://desktop.tidal.com/album/163812859", "https://tidal.com/album/163812859"),
            (
                "https://desktop.stage.tidal.com/album/163812859",
                "https://tidal.com/album/163812859",
            ),
            (
                "http://tidal.com/browse/album/119425271?play=true",
                "https://tidal.com/album/119425271",
            ),
            ("https://tidal.com/browse/album/126495793/", "https://tidal.com/album/126495793"),
            ("https://listen.tidal.com/video/78581329", "https://tidal.com/video/78581329"),
            (
                "https://www.tidal.com/browse/track/155221653",
                "https://tidal.com/track/155221653",
            ),
        ] {
            let res = run(url, vec![]).unwrap_or_else(|| panic!("{} not rewritten", url));
            assert_eq!(res.rewritten, want, "rewriting {}", url);
            assert!(res.updated.is_empty());
            assert!(res.new_entities.is_empty());
        }
    }

    #[test]
    fn test_tidal_not_rewritten() {
        assert!(run("https://tidal.com/album/11069", vec![]).is_none()); // already canonical
        assert!(run("https://test.tidal.com/album/11069", vec![]).is_none()); // unknown hostname
        assert!(run("http://www.tidal.com/test/11069", vec![]).is_none()); // unknown path component
    }

    #[test]
    fn test_tidal_album_track_disambiguation() {
        let url = "https://listen.tidal.com/album/123/track/456";

        let res = run(url, vec![rel("release")]).unwrap();
        assert_eq!(res.rewritten, "https://tidal.com/album/123");

        let res = run(url, vec![rel("recording")]).unwrap();
        assert_eq!(res.rewritten, "https://tidal.com/track/456");

        // Recordings win over releases
        let res = run(url, vec![rel("release"), rel("recording")]).unwrap();
        assert_eq!(res.rewritten, "https://tidal.com/track/456");

        // No signal: give up
        assert!(run(url, vec![rel("artist")]).is_none());
        assert!(run(url, vec![]).is_none());
    }

    #[test]
    fn test_geocities() {
        let url = "http://www.geocities.com/test/";

        // No relationships, or already ended
        assert!(run(url, vec![]).is_none());
        let ended = Relationship {
            ended: true,
            end_date: D,
            ..rel("artist")
        };
        assert!(run(url, vec![ended]).is_none());

        let active = Relationship {
            begin_date: D,
            ..rel("artist")
        };
        let res = run(url, vec![active.clone()]).unwrap();
        assert_eq!(res.rewritten, url);
        assert_eq!(res.edit_note, GEOCITIES_EDIT_NOTE);
        assert_eq!(
            desired(&res),
            vec![Relationship {
                ended: true,
                end_date: GEOCITIES_END_DATE,
                ..active
            }]
        );
    }

    #[test]
    fn test_geocities_japan() {
        let rels = vec![
            Relationship {
                begin_date: D,
                ..rel("artist")
            },
            Relationship {
                begin_date: D,
                ..rel("release")
            },
        ];
        for url in [
            "http://geocities.yahoo.co.jp/test/",
            "http://www.geocities.jp/user/",
        ] {
            let res = run(url, rels.clone()).unwrap();
            assert_eq!(res.updated.len(), 2);
            for update in &res.updated {
                assert!(update.desired.ended);
                assert_eq!(update.desired.end_date, GEOCITIES_JAPAN_END_DATE);
                assert_eq!(update.desired.begin_date, D);
            }
        }
    }

    #[test]
    fn test_tidal_store() {
        let url = "https://store.tidal.com/artist/123";
        assert!(run(url, vec![]).is_none());

        // Already ended with the right link type
        let done = Relationship {
            link_type_id: 176,
            ended: true,
            end_date: D,
            ..rel("artist")
        };
        assert!(run(url, vec![done]).is_none());

        let res = run(
            url,
            vec![Relationship {
                link_type_id: 176,
                ..rel("artist")
            }],
        )
        .unwrap();
        assert_eq!(
            desired(&res),
            vec![Relationship {
                link_type_id: 176,
                ended: true,
                end_date: TIDAL_STORE_END_DATE,
                ..rel("artist")
            }]
        );

        // Ended with the wrong link type: only the type changes
        let res = run(
            url,
            vec![Relationship {
                link_type_id: 194,
                ended: true,
                end_date: D,
                ..rel("artist")
            }],
        )
        .unwrap();
        assert_eq!(
            desired(&res),
            vec![Relationship {
                link_type_id: 176,
                ended: true,
                end_date: D,
                ..rel("artist")
            }]
        );

        let res = run(
            "https://tidal.com/store/album/123",
            vec![Relationship {
                link_type_id: 85,
                ..rel("release")
            }],
        )
        .unwrap();
        assert_eq!(desired(&res)[0].link_type_id, 74);

        let res = run(
            "https://tidal.com/us/store/track/123",
            vec![Relationship {
                link_type_id: 268,
                ..rel("recording")
            }],
        )
        .unwrap();
        assert_eq!(desired(&res)[0].link_type_id, 254);
        assert_eq!(desired(&res)[0].end_date, TIDAL_STORE_END_DATE);
    }

    #[test]
    fn test_recmusic_migration() {
        assert!(run("https://recmusic.jp/album/?id=1010526534", vec![]).is_none());

        let res = run(
            "https://recmusic.jp/artist/?id=2000017248",
            vec![Relationship {
                link_type_id: 978,
                ..rel("artist")
            }],
        )
        .unwrap();
        assert_eq!(res.rewritten, "https://recmusic.jp/artist/?id=2000017248");
        assert_eq!(
            desired(&res),
            vec![Relationship {
                link_type_id: 978,
                ended: true,
                end_date: RECMUSIC_END_DATE,
                ..rel("artist")
            }]
        );
        assert_eq!(
            res.new_entities,
            vec![Entity {
                relationships: vec![Relationship {
                    link_type_id: 978,
                    begin_date: RECMUSIC_END_DATE,
                    ..rel("artist")
                }],
                ..Entity::new_url("https://music.tower.jp/artist/detail/2000017248")
            }]
        );
    }

    #[test]
    fn test_recmusic_ended_relationships_stay_behind() {
        let old = Relationship {
            link_type_id: 980,
            ended: true,
            end_date: D,
            ..rel("release")
        };
        assert!(run("https://recmusic.jp/sp/album/?id=1010526534", vec![old.clone()]).is_none());

        let active = Relationship {
            link_type_id: 980,
            target_mbid: "f0b6a8b4-4d53-4c1a-9a28-8f5a3a4f1b2c".to_string(),
            ..rel("release")
        };
        let res = run(
            "https://recmusic.jp/sp/album/?id=1010526534",
            vec![old, active.clone()],
        )
        .unwrap();
        assert_eq!(res.updated.len(), 1);
        assert_eq!(res.updated[0].original, active);
        assert_eq!(
            res.new_entities,
            vec![Entity {
                relationships: vec![Relationship {
                    begin_date: RECMUSIC_END_DATE,
                    ..active
                }],
                ..Entity::new_url("https://music.tower.jp/album/detail/1010526534")
            }]
        );
    }

    #[test]
    fn test_recmusic_unreachable_destination() {
        let res = run(
            "https://recmusic.jp/artist/?id=2001445271",
            vec![Relationship {
                link_type_id: 978,
                ..rel("artist")
            }],
        )
        .unwrap();
        assert_eq!(res.updated.len(), 1);
        assert!(res.new_entities.is_empty());
    }

    #[test]
    fn test_standard_rules_are_distinguishable() {
        let table = RuleTable::standard().unwrap();
        for (url, want) in [
            ("https://listen.tidal.com/album/1", "tidal-streaming"),
            ("https://store.tidal.com/album/1", "tidal-store"),
            ("https://tidal.com/store/album/1", "tidal-store"),
            ("http://www.geocities.com/a/", "geocities"),
            ("https://recmusic.jp/album/?id=1", "recmusic"),
        ] {
            let matching: Vec<&str> = table
                .rules()
                .iter()
                .filter(|r| r.pattern().is_match(url))
                .map(|r| r.name())
                .collect();
            assert_eq!(matching, vec![want], "rules matching {}", url);
        }
    }
}
