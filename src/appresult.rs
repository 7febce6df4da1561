use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::error::ChatError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        let Some(err) = self.0.downcast_ref::<ChatError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };

        match err {
            ChatError::Authentication | ChatError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
            ChatError::Permission(_) => StatusCode::FORBIDDEN,
            ChatError::Conflict(_) | ChatError::DirectChatExists { .. } => StatusCode::CONFLICT,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Validation(_) | ChatError::Unsupported(_) => StatusCode::BAD_REQUEST,
            ChatError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        }

        let mut body = json!({
            "success": false,
            "message": self.0.to_string(),
        });
        match self.0.downcast_ref::<ChatError>() {
            Some(ChatError::DirectChatExists { chat_id }) => {
                body["direct_message_id"] = json!(chat_id);
            }
            Some(err) if err.is_retryable() => {
                body["retryable"] = json!(true);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
