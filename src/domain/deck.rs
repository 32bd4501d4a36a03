//! Deck document model: the structured slide/block document fed to the renderer.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

const DEFAULT_LANGUAGE: &str = "en";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub meta: DeckMeta,
    /// Order is significant and preserved through export.
    #[serde(default)]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckMeta {
    pub title: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// Layout category such as `cover` or `bullets`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_variant: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Slide {
    pub fn is_cover(&self) -> bool {
        self.kind.eq_ignore_ascii_case("cover")
    }

    pub fn is_centered(&self) -> bool {
        self.layout_variant
            .as_deref()
            .is_some_and(|variant| variant.eq_ignore_ascii_case("centered"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sublabel: Option<String>,
}

impl StatBlock {
    /// Blank sublabels count as absent.
    pub fn sublabel(&self) -> Option<&str> {
        non_blank(self.sublabel.as_deref())
    }
}

/// A block whose `kind` this build does not know. Kept verbatim so the
/// renderer can reject it by name instead of the document failing to load.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownBlock {
    pub kind: String,
    pub fields: Map<String, Value>,
}

/// Content block, discriminated on the wire by `kind`.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title { text: String },
    Text { text: String },
    Bullets { items: Vec<String> },
    StatBlock(StatBlock),
    Unknown(UnknownBlock),
}

impl Block {
    pub fn kind(&self) -> &str {
        match self {
            Block::Title { .. } => "title",
            Block::Text { .. } => "text",
            Block::Bullets { .. } => "bullets",
            Block::StatBlock(_) => "stat_block",
            Block::Unknown(unknown) => unknown.kind.as_str(),
        }
    }
}

const KNOWN_KINDS: [&str; 4] = ["title", "text", "bullets", "stat_block"];

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KnownBlock {
    Title { text: String },
    Text { text: String },
    Bullets { items: Vec<String> },
    StatBlock(StatBlock),
}

impl From<KnownBlock> for Block {
    fn from(block: KnownBlock) -> Self {
        match block {
            KnownBlock::Title { text } => Block::Title { text },
            KnownBlock::Text { text } => Block::Text { text },
            KnownBlock::Bullets { items } => Block::Bullets { items },
            KnownBlock::StatBlock(stat) => Block::StatBlock(stat),
        }
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(mut fields) = value else {
            return Err(de::Error::custom("block must be a JSON object"));
        };

        let kind = match fields.get("kind") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Err(de::Error::custom("block `kind` must be a string")),
            None => return Err(de::Error::missing_field("kind")),
        };

        if KNOWN_KINDS.contains(&kind.as_str()) {
            return KnownBlock::deserialize(Value::Object(fields))
                .map(Block::from)
                .map_err(de::Error::custom);
        }

        fields.remove("kind");
        Ok(Block::Unknown(UnknownBlock { kind, fields }))
    }
}

impl Serialize for Block {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let known = match self {
            Block::Title { text } => KnownBlock::Title { text: text.clone() },
            Block::Text { text } => KnownBlock::Text { text: text.clone() },
            Block::Bullets { items } => KnownBlock::Bullets {
                items: items.clone(),
            },
            Block::StatBlock(stat) => KnownBlock::StatBlock(stat.clone()),
            Block::Unknown(unknown) => {
                let mut map = serializer.serialize_map(Some(unknown.fields.len() + 1))?;
                map.serialize_entry("kind", &unknown.kind)?;
                for (key, value) in &unknown.fields {
                    map.serialize_entry(key, value)?;
                }
                return map.end();
            }
        };
        known.serialize(serializer)
    }
}

/// Brand columns stored alongside a deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandFields {
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub logo_url: Option<String>,
}

/// Deck as returned by the deck lookup collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub theme_id: Option<String>,
    pub brand: BrandFields,
    pub document: Deck,
    pub updated_at: OffsetDateTime,
}

impl DeckRecord {
    /// Theme precedence: deck column, then document meta. `None` means the
    /// caller should use its configured default.
    pub fn theme_id(&self) -> Option<&str> {
        non_blank(self.theme_id.as_deref())
            .or_else(|| non_blank(self.document.meta.theme_id.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_every_known_block_kind() {
        let slide: Slide = serde_json::from_value(json!({
            "type": "bullets",
            "layoutVariant": "two-column",
            "blocks": [
                { "kind": "title", "text": "Quarterly review" },
                { "kind": "text", "text": "Highlights" },
                { "kind": "bullets", "items": ["one", "two"] },
                { "kind": "stat_block", "value": "42%", "label": "Growth", "sublabel": "YoY" }
            ]
        }))
        .unwrap();

        assert_eq!(slide.kind, "bullets");
        assert_eq!(slide.layout_variant.as_deref(), Some("two-column"));
        let kinds: Vec<_> = slide.blocks.iter().map(Block::kind).collect();
        assert_eq!(kinds, ["title", "text", "bullets", "stat_block"]);
    }

    #[test]
    fn unknown_kind_is_preserved_not_dropped() {
        let block: Block =
            serde_json::from_value(json!({ "kind": "chart", "series": [1, 2, 3] })).unwrap();

        match &block {
            Block::Unknown(unknown) => {
                assert_eq!(unknown.kind, "chart");
                assert_eq!(unknown.fields["series"], json!([1, 2, 3]));
            }
            other => panic!("expected unknown block, got {other:?}"),
        }

        let round = serde_json::to_value(&block).unwrap();
        assert_eq!(round, json!({ "kind": "chart", "series": [1, 2, 3] }));
    }

    #[test]
    fn malformed_known_kind_is_an_error() {
        let result: Result<Block, _> = serde_json::from_value(json!({ "kind": "bullets" }));
        assert!(result.is_err());

        let result: Result<Block, _> = serde_json::from_value(json!({ "text": "no kind" }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_sublabel_is_treated_as_absent() {
        let stat = StatBlock {
            value: "3".into(),
            label: "Offices".into(),
            sublabel: Some("   ".into()),
        };
        assert_eq!(stat.sublabel(), None);

        let block: Block =
            serde_json::from_value(json!({ "kind": "stat_block", "value": "3", "label": "Offices" }))
                .unwrap();
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("sublabel").is_none());
    }

    #[test]
    fn theme_id_prefers_record_column_over_meta() {
        let document: Deck = serde_json::from_value(json!({
            "meta": { "title": "Deck", "themeId": "midnight" },
            "slides": []
        }))
        .unwrap();
        let mut record = DeckRecord {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            theme_id: Some("ocean".into()),
            brand: BrandFields::default(),
            document,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(record.theme_id(), Some("ocean"));

        record.theme_id = None;
        assert_eq!(record.theme_id(), Some("midnight"));

        record.document.meta.theme_id = Some(" ".into());
        assert_eq!(record.theme_id(), None);
        assert_eq!(record.document.meta.language, "en");
    }
}
