//! Read access to rendered pages.
//!
//! The public page is open. A participant page is only served to a bearer
//! whose session token names that participant.

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, instrument};

use vickrey_core::page::PageDocument;
use vickrey_core::paths::{self, PUBLIC_PAGE_KEY};
use vickrey_core::store::{run_blocking, DocumentStoreExt, StoreError};

use crate::routes::AppState;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("forbidden")]
    Forbidden,

    #[error("page not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match self {
            GateError::MissingToken | GateError::InvalidToken => StatusCode::UNAUTHORIZED,
            GateError::Forbidden => StatusCode::FORBIDDEN,
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::Store(ref e) => {
                error!("page read failed: {e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `GET /drafts/{draft_id}/pages/{page_key}`
#[instrument(skip(state, headers))]
pub async fn page(
    State(state): State<AppState>,
    Path((draft_id, page_key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Html<String>, GateError> {
    let path = paths::page(&draft_id, &page_key).map_err(|_| GateError::NotFound)?;

    if page_key != PUBLIC_PAGE_KEY {
        let token = bearer_token(&headers).ok_or(GateError::MissingToken)?;
        let claims = state.identity.verify(token).map_err(|e| {
            debug!("rejected token: {e}");
            GateError::InvalidToken
        })?;
        if claims.sub != page_key {
            return Err(GateError::Forbidden);
        }
    }

    let found = run_blocking(&state.store, move |store| store.get_as::<PageDocument>(&path)).await?;
    let Some((page, _)) = found else {
        return Err(GateError::NotFound);
    };
    Ok(Html(page.html))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
