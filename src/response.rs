use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

/// Success envelope: `{ "success": true, "message": ..., "data": ... }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn ok(message: impl Into<String>, data: T) -> HttpResponse {
        HttpResponse::Ok().json(Self::new(message, Some(data)))
    }

    pub fn created(message: impl Into<String>, data: T) -> HttpResponse {
        HttpResponse::Created().json(Self::new(message, Some(data)))
    }
}

impl ApiResponse<()> {
    /// 200 with no `data` field
    pub fn message(message: impl Into<String>) -> HttpResponse {
        HttpResponse::Ok().json(ApiResponse::<()>::new(message, None))
    }
}
