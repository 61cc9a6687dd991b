use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_THEME: &str = "classic";
pub const DEFAULT_DURATION_SECONDS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub content: ItemContent,
    #[serde(default)]
    pub overrides: ItemOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_override_seconds: Option<u32>,
}

impl Item {
    /// Sourced items are keyed by the upstream post id so re-adding the same
    /// post can be detected.
    pub fn sourced(post: SourcedPost) -> Self {
        Self {
            id: ItemId(post.source_id.clone()),
            content: ItemContent::Sourced(post),
            overrides: ItemOverrides::default(),
            duration_override_seconds: None,
        }
    }

    pub fn custom(card: CustomCard) -> Self {
        Self {
            id: ItemId::generate(),
            content: ItemContent::Custom(card),
            overrides: ItemOverrides::default(),
            duration_override_seconds: None,
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match &self.content {
            ItemContent::Sourced(post) => Some(&post.source_id),
            ItemContent::Custom(_) => None,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.overrides.pinned.unwrap_or(false)
    }

    pub fn is_breaking(&self) -> bool {
        self.overrides.breaking.unwrap_or(false)
    }

    pub fn effective_duration_seconds(&self, global: &GlobalSettings) -> u32 {
        self.duration_override_seconds
            .unwrap_or(global.default_duration_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemContent {
    Sourced(SourcedPost),
    Custom(CustomCard),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedPost {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub author: PostAuthor,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: PostStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub replies: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCard {
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub theme: String,
    pub show_avatar: bool,
    pub show_name: bool,
    pub show_username: bool,
    pub show_media: bool,
    pub show_date: bool,
    pub show_stats: bool,
    pub scale: f64,
    pub play_sound: bool,
    pub default_duration_seconds: u32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.into(),
            show_avatar: true,
            show_name: true,
            show_username: true,
            show_media: true,
            show_date: true,
            show_stats: true,
            scale: 1.0,
            play_sound: false,
            default_duration_seconds: DEFAULT_DURATION_SECONDS,
        }
    }
}

/// Partial update of [`GlobalSettings`]; absent keys keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_avatar: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_name: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_username: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_media: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_date: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_stats: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_sound: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration_seconds: Option<u32>,
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(format!("scale must be a positive number, got {scale}"));
            }
        }
        if self.default_duration_seconds == Some(0) {
            return Err("default duration must be at least one second".into());
        }
        Ok(())
    }

    pub fn apply_to(&self, settings: &mut GlobalSettings) {
        if let Some(v) = &self.theme {
            settings.theme = v.clone();
        }
        if let Some(v) = self.show_avatar {
            settings.show_avatar = v;
        }
        if let Some(v) = self.show_name {
            settings.show_name = v;
        }
        if let Some(v) = self.show_username {
            settings.show_username = v;
        }
        if let Some(v) = self.show_media {
            settings.show_media = v;
        }
        if let Some(v) = self.show_date {
            settings.show_date = v;
        }
        if let Some(v) = self.show_stats {
            settings.show_stats = v;
        }
        if let Some(v) = self.scale {
            settings.scale = v;
        }
        if let Some(v) = self.play_sound {
            settings.play_sound = v;
        }
        if let Some(v) = self.default_duration_seconds {
            settings.default_duration_seconds = v;
        }
    }
}

/// Per-item edit. `duration_seconds` distinguishes an absent key (keep) from
/// an explicit `null` (clear the override).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_seconds: Option<Option<u32>>,
    #[serde(default)]
    pub toggle_pinned: bool,
    #[serde(default)]
    pub toggle_breaking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ItemPatch {
    pub fn rewrites_card(&self) -> bool {
        self.title.is_some() || self.text.is_some()
    }
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<u32>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(Some)
}

/// What gets written to durable storage. Playback position is not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    #[serde(default)]
    pub queue: Vec<Item>,
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QueueDocument {
    pub fn new(queue: Vec<Item>, settings: GlobalSettings) -> Self {
        Self {
            queue,
            settings,
            updated_at: None,
        }
    }

    pub fn stamped(mut self) -> Self {
        self.updated_at = Some(Utc::now());
        self
    }

    /// Checks what the command paths enforce on the way in: positive
    /// durations, a usable scale and unique ids and sources.
    pub fn validate(&self) -> Result<(), String> {
        SettingsPatch {
            scale: Some(self.settings.scale),
            default_duration_seconds: Some(self.settings.default_duration_seconds),
            ..SettingsPatch::default()
        }
        .validate()?;

        for (index, item) in self.queue.iter().enumerate() {
            if item.duration_override_seconds == Some(0) {
                return Err(format!("item {} has a zero duration override", item.id));
            }
            let earlier = &self.queue[..index];
            if earlier.iter().any(|other| other.id == item.id) {
                return Err(format!("item id {} appears more than once", item.id));
            }
            if let Some(source_id) = item.source_id() {
                if earlier.iter().any(|other| other.source_id() == Some(source_id)) {
                    return Err(format!("post {source_id} appears more than once"));
                }
            }
        }
        Ok(())
    }
}

impl Default for QueueDocument {
    fn default() -> Self {
        Self::new(Vec::new(), GlobalSettings::default())
    }
}

/// Global settings as seen by the overlay for one particular item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    #[serde(flatten)]
    pub display: GlobalSettings,
    pub pinned: bool,
    pub breaking: bool,
}

/// Merges item overrides over the global settings. An override only wins for
/// keys it explicitly sets; everything else comes from `global`.
pub fn effective_settings(global: &GlobalSettings, overrides: &ItemOverrides) -> EffectiveSettings {
    let mut display = global.clone();
    if let Some(theme) = &overrides.theme {
        display.theme = theme.clone();
    }
    EffectiveSettings {
        display,
        pinned: overrides.pinned.unwrap_or(false),
        breaking: overrides.breaking.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_theme_override_wins_only_when_set() {
        let global = GlobalSettings {
            theme: "dark".into(),
            scale: 1.5,
            ..GlobalSettings::default()
        };
        let merged = effective_settings(&global, &ItemOverrides::default());
        assert_eq!(merged.display, global);
        assert!(!merged.pinned && !merged.breaking);

        let overrides = ItemOverrides {
            theme: Some("neon".into()),
            pinned: Some(true),
            breaking: None,
        };
        let merged = effective_settings(&global, &overrides);
        assert_eq!(merged.display.theme, "neon");
        assert_eq!(merged.display.scale, 1.5);
        assert!(merged.pinned);
        assert!(!merged.breaking);
    }

    #[test]
    fn settings_patch_only_touches_provided_keys() {
        let mut settings = GlobalSettings::default();
        let before = settings.clone();
        let patch: SettingsPatch = serde_json::from_str(r#"{"show_date": false}"#).expect("patch");
        patch.apply_to(&mut settings);

        assert!(!settings.show_date);
        assert_eq!(
            GlobalSettings {
                show_date: true,
                ..settings
            },
            before
        );
    }

    #[test]
    fn settings_patch_rejects_bad_values() {
        let zero = SettingsPatch {
            default_duration_seconds: Some(0),
            ..SettingsPatch::default()
        };
        assert!(zero.validate().is_err());
        let negative = SettingsPatch {
            scale: Some(-2.0),
            ..SettingsPatch::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn item_patch_separates_null_duration_from_missing() {
        let clear: ItemPatch = serde_json::from_str(r#"{"duration_seconds": null}"#).expect("patch");
        assert_eq!(clear.duration_seconds, Some(None));

        let keep: ItemPatch = serde_json::from_str(r#"{"theme": "neon"}"#).expect("patch");
        assert_eq!(keep.duration_seconds, None);

        let set: ItemPatch = serde_json::from_str(r#"{"duration_seconds": 25}"#).expect("patch");
        assert_eq!(set.duration_seconds, Some(Some(25)));
    }

    #[test]
    fn item_serializes_with_kind_tag() {
        let item = Item::custom(CustomCard {
            title: "Halftime".into(),
            text: "Back in 5".into(),
            image_url: None,
            media: Vec::new(),
        });
        let value = serde_json::to_value(&item).expect("json");
        assert_eq!(value["kind"], "custom");
        assert_eq!(value["title"], "Halftime");
        let back: Item = serde_json::from_value(value).expect("item");
        assert_eq!(back, item);
    }

    #[test]
    fn document_validation_rejects_zero_durations_and_repeats() {
        let card = Item::custom(CustomCard {
            title: "Weather".into(),
            text: String::new(),
            image_url: None,
            media: Vec::new(),
        });
        let good = QueueDocument::new(vec![card.clone()], GlobalSettings::default());
        assert!(good.validate().is_ok());

        let zero_default = QueueDocument::new(
            Vec::new(),
            GlobalSettings {
                default_duration_seconds: 0,
                ..GlobalSettings::default()
            },
        );
        assert!(zero_default.validate().is_err());

        let mut zero_override = card.clone();
        zero_override.duration_override_seconds = Some(0);
        let doc = QueueDocument::new(vec![zero_override], GlobalSettings::default());
        assert!(doc.validate().is_err());

        let repeated = QueueDocument::new(vec![card.clone(), card], GlobalSettings::default());
        assert!(repeated.validate().unwrap_err().contains("more than once"));
    }
}
