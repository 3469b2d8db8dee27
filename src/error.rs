use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::feed::FeedError;
use crate::schedule::ScheduleError;

#[allow(dead_code)]
#[derive(thiserror::Error, Debug)]
pub enum TimetableError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Error response: {0} {1}")]
    Response(u16, String),
}

impl ResponseError for TimetableError {
    fn error_response(&self) -> HttpResponse {
        match self {
            TimetableError::Response(_, message) => {
                HttpResponse::build(self.status_code()).json(json!({ "error": message }))
            }
            other => {
                log::error!("{}", other);
                HttpResponse::InternalServerError().finish()
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            TimetableError::Response(status, _) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type TimetableResult<T> = Result<T, TimetableError>;
