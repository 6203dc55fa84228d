//! Request extractors

use axum::extract::FromRequest;

use crate::error::Error;

/// JSON body whose rejections answer with the API error body instead of
/// axum's plain-text default
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);
