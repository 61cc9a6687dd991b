use serde::{Deserialize, Serialize};

use crate::domain::{CustomCard, EffectiveSettings, GlobalSettings, Item, ItemPatch};

/// Cursor value sent on the wire when nothing is shown.
pub const NO_CURSOR: i64 = -1;

/// Everything a client needs to mirror the playback state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub queue: Vec<Item>,
    pub cursor: i64,
    pub auto_advance_active: bool,
    pub global_settings: GlobalSettings,
}

impl StateSnapshot {
    pub fn cursor_index(&self) -> Option<usize> {
        usize::try_from(self.cursor).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowPayload {
    pub item: Item,
    /// 1-based position of `item` in the queue.
    pub display_position: usize,
    pub total: usize,
    pub effective_settings: EffectiveSettings,
    pub is_pinned: bool,
    pub is_breaking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    StateUpdate(StateSnapshot),
    #[serde(rename = "show_tweet")]
    ShowItem(ShowPayload),
    #[serde(rename = "hide_tweet")]
    HideItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddSource {
    Url { url: String },
    Custom { custom: CustomCard },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRequest {
    #[serde(flatten)]
    pub source: AddSource,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditItemRequest {
    pub index: usize,
    #[serde(flatten)]
    pub patch: ItemPatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Show,
    Next,
    Prev,
    ToggleAuto,
    Hide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageAction {
    Delete,
    Clear,
    MoveUp,
    MoveDown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageRequest {
    pub action: ManageAction,
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
}

impl CommandResponse {
    pub const OK: Self = Self { success: true };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hide_event_has_no_payload() {
        let text = serde_json::to_string(&ServerEvent::HideItem).expect("json");
        assert_eq!(text, r#"{"type":"hide_tweet"}"#);
    }

    #[test]
    fn state_update_uses_wire_name() {
        let event = ServerEvent::StateUpdate(StateSnapshot {
            queue: Vec::new(),
            cursor: NO_CURSOR,
            auto_advance_active: false,
            global_settings: GlobalSettings::default(),
        });
        let value = serde_json::to_value(&event).expect("json");
        assert_eq!(value["type"], "state_update");
        assert_eq!(value["payload"]["cursor"], -1);
        assert_eq!(value["payload"]["global_settings"]["default_duration_seconds"], 10);
    }

    #[test]
    fn add_request_accepts_url_or_custom_card() {
        let by_url: AddRequest = serde_json::from_str(
            r#"{"url": "https://x.com/a/status/123", "theme": "dark"}"#,
        )
        .expect("url request");
        assert!(matches!(by_url.source, AddSource::Url { ref url } if url.ends_with("123")));
        assert_eq!(by_url.theme.as_deref(), Some("dark"));

        let custom: AddRequest = serde_json::from_str(
            r#"{"custom": {"title": "Score", "text": "2-1"}, "duration_seconds": 30}"#,
        )
        .expect("custom request");
        assert!(matches!(custom.source, AddSource::Custom { ref custom } if custom.title == "Score"));
        assert_eq!(custom.duration_seconds, Some(30));
    }

    #[test]
    fn control_actions_are_snake_case() {
        let req: ControlRequest =
            serde_json::from_str(r#"{"action": "toggle_auto"}"#).expect("control");
        assert_eq!(req.action, ControlAction::ToggleAuto);
        assert_eq!(req.index, None);
    }
}
