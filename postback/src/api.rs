use crate::errors::PostbackError;
use crate::service::Postback;
use crate::translator::Params;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Path, Request, State},
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MAX_FORM_BYTES: usize = 64 * 1024;

pub fn router(postback: Postback) -> Router {
    Router::new()
        .route("/api/mapping", post(load_mappings))
        .route("/api/{source}", get(consume).post(consume))
        .with_state(postback)
}

async fn consume(
    State(postback): State<Postback>,
    Path(source): Path<String>,
    request: Request,
) -> Result<StatusCode, PostbackError> {
    let params = request_params(request).await?;
    postback.consume(&source, &params).await?;
    Ok(StatusCode::OK)
}

async fn load_mappings(
    State(postback): State<Postback>,
    body: Body,
) -> Result<StatusCode, PostbackError> {
    postback.load_mappings(body).await?;
    Ok(StatusCode::OK)
}

/// Merges query string parameters with a form-encoded body. The first
/// occurrence of a name wins, query string first.
async fn request_params(request: Request) -> Result<Params, PostbackError> {
    let mut params = Params::new();
    let (parts, body) = request.into_parts();

    if let Some(query) = parts.uri.query() {
        collect_pairs(&mut params, query.as_bytes());
    }

    let is_form = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));

    if parts.method == Method::POST && is_form {
        let bytes = to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|e| PostbackError::Validation(format!("Invalid request body: {e}")))?;
        collect_pairs(&mut params, &bytes);
    }

    Ok(params)
}

fn collect_pairs(params: &mut Params, input: &[u8]) {
    for (name, value) in url::form_urlencoded::parse(input) {
        params
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }
}

impl IntoResponse for PostbackError {
    fn into_response(self) -> Response {
        match self {
            PostbackError::Validation(message) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            PostbackError::NotFound => StatusCode::NOT_FOUND.into_response(),
            PostbackError::Unsupported => StatusCode::NOT_IMPLEMENTED.into_response(),
            PostbackError::Upstream(e) => {
                tracing::error!(error = %e, "store error");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
