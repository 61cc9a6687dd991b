use std::{fmt, sync::Arc};

use playback::{PlaybackError, PlaybackHandle, PlaybackOp, StoreError};
use shared::{
    domain::{Item, SettingsPatch, DEFAULT_THEME},
    error::{ApiError, ErrorCode},
    protocol::{
        AddRequest, AddSource, ControlAction, ControlRequest, EditItemRequest, ManageAction,
        ManageRequest, StateSnapshot,
    },
};
use source_fetch::{extract_post_id, FetchError, PostFetcher};
use storage::SnapshotStore;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub playback: PlaybackHandle,
    pub fetcher: Arc<dyn PostFetcher>,
    pub store: Arc<dyn SnapshotStore>,
}

/// Result of a stream-deck style shortcut, rendered as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Next,
    Prev,
    Empty,
    AutoOn,
    AutoOff,
    Hidden,
}

impl fmt::Display for TriggerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Next => "Next",
            Self::Prev => "Prev",
            Self::Empty => "Empty",
            Self::AutoOn => "Auto ON",
            Self::AutoOff => "Auto OFF",
            Self::Hidden => "Hidden",
        })
    }
}

pub async fn current_state(ctx: &ApiContext) -> Result<StateSnapshot, ApiError> {
    ctx.playback.snapshot().await.map_err(playback_error)
}

pub async fn add_item(ctx: &ApiContext, req: AddRequest) -> Result<Item, ApiError> {
    if req.duration_seconds == Some(0) {
        return Err(ApiError::invalid_input(
            "duration must be at least one second",
        ));
    }

    let mut item = match req.source {
        AddSource::Url { url } => {
            let post_id = extract_post_id(&url)
                .ok_or_else(|| ApiError::invalid_input(format!("not a post URL: {url}")))?;
            if ctx
                .playback
                .contains_source(&post_id)
                .await
                .map_err(playback_error)?
            {
                return Err(duplicate(&post_id));
            }
            let post = ctx
                .fetcher
                .fetch_post(&post_id)
                .await
                .map_err(fetch_error)?;
            let mut item = Item::sourced(post);
            item.overrides.theme = Some(req.theme.unwrap_or_else(|| DEFAULT_THEME.to_string()));
            item
        }
        AddSource::Custom { custom } => {
            if custom.title.trim().is_empty() && custom.text.trim().is_empty() {
                return Err(ApiError::invalid_input(
                    "custom card needs a title or text",
                ));
            }
            let mut item = Item::custom(custom);
            item.overrides.theme = req.theme;
            item
        }
    };
    item.duration_override_seconds = req.duration_seconds;

    ctx.playback
        .apply(PlaybackOp::Append(item.clone()))
        .await
        .map_err(playback_error)?;
    info!(id = %item.id, "item queued");
    Ok(item)
}

pub async fn edit_item(ctx: &ApiContext, req: EditItemRequest) -> Result<StateSnapshot, ApiError> {
    ctx.playback
        .apply(PlaybackOp::PatchItem(req.index, req.patch))
        .await
        .map_err(playback_error)
}

pub async fn control(ctx: &ApiContext, req: ControlRequest) -> Result<StateSnapshot, ApiError> {
    let op = match req.action {
        ControlAction::Show => {
            let index = req
                .index
                .ok_or_else(|| ApiError::invalid_input("show needs an index"))?;
            PlaybackOp::Show(index)
        }
        ControlAction::Next => PlaybackOp::Next,
        ControlAction::Prev => PlaybackOp::Prev,
        ControlAction::ToggleAuto => PlaybackOp::ToggleAuto,
        ControlAction::Hide => PlaybackOp::Hide,
    };
    ctx.playback.apply(op).await.map_err(playback_error)
}

pub async fn manage(ctx: &ApiContext, req: ManageRequest) -> Result<StateSnapshot, ApiError> {
    let index = || {
        req.index
            .ok_or_else(|| ApiError::invalid_input(format!("{:?} needs an index", req.action)))
    };
    let op = match req.action {
        ManageAction::Delete => PlaybackOp::RemoveAt(index()?),
        ManageAction::Clear => PlaybackOp::Clear,
        ManageAction::MoveUp => PlaybackOp::MoveUp(index()?),
        ManageAction::MoveDown => PlaybackOp::MoveDown(index()?),
    };
    ctx.playback.apply(op).await.map_err(playback_error)
}

pub async fn update_settings(
    ctx: &ApiContext,
    patch: SettingsPatch,
) -> Result<StateSnapshot, ApiError> {
    ctx.playback
        .apply(PlaybackOp::PatchSettings(patch))
        .await
        .map_err(playback_error)
}

/// Shortcut endpoints for hardware buttons. Stepping an empty queue reports
/// `Empty` instead of doing nothing silently.
pub async fn trigger(ctx: &ApiContext, action: ControlAction) -> Result<TriggerOutcome, ApiError> {
    let outcome = match action {
        ControlAction::Next | ControlAction::Prev => {
            let state = current_state(ctx).await?;
            if state.queue.is_empty() {
                return Ok(TriggerOutcome::Empty);
            }
            if action == ControlAction::Next {
                ctx.playback.next().await.map_err(playback_error)?;
                TriggerOutcome::Next
            } else {
                ctx.playback.prev().await.map_err(playback_error)?;
                TriggerOutcome::Prev
            }
        }
        ControlAction::ToggleAuto => {
            let state = ctx.playback.toggle_auto().await.map_err(playback_error)?;
            if state.auto_advance_active {
                TriggerOutcome::AutoOn
            } else {
                TriggerOutcome::AutoOff
            }
        }
        ControlAction::Hide => {
            ctx.playback.hide().await.map_err(playback_error)?;
            TriggerOutcome::Hidden
        }
        ControlAction::Show => {
            return Err(ApiError::invalid_input("show has no shortcut"));
        }
    };
    Ok(outcome)
}

/// Reads back what is currently persisted and returns its queue length.
pub async fn saved_queue_len(ctx: &ApiContext) -> Result<usize, ApiError> {
    let document = ctx.store.load().await.map_err(|e| {
        ApiError::internal(format!("{}: {e:#}", ctx.store.describe()))
    })?;
    Ok(document.map(|d| d.queue.len()).unwrap_or(0))
}

fn duplicate(source_id: &str) -> ApiError {
    ApiError::new(ErrorCode::Duplicate, format!("post {source_id} is already queued"))
}

fn playback_error(err: PlaybackError) -> ApiError {
    match err {
        PlaybackError::Store(StoreError::DuplicateItem(id)) => duplicate(&id),
        PlaybackError::Store(err @ StoreError::IndexOutOfRange { .. }) => {
            ApiError::not_found(err.to_string())
        }
        PlaybackError::Store(StoreError::InvalidInput(message)) => ApiError::invalid_input(message),
        PlaybackError::Closed => ApiError::internal("playback task has stopped"),
    }
}

fn fetch_error(err: FetchError) -> ApiError {
    warn!(error = %err, "post fetch failed");
    ApiError::new(ErrorCode::UpstreamFetch, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
