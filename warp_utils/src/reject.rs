//! Typed rejections and the handler that converts them to `{code, message}`
//! JSON bodies.

use api_types::ErrorMessage;
use std::convert::Infallible;
use warp::{http::StatusCode, reject::Reject, Reply};

#[derive(Debug)]
pub struct CustomBadRequest(pub String);

impl Reject for CustomBadRequest {}

pub fn custom_bad_request(msg: String) -> warp::reject::Rejection {
    warp::reject::custom(CustomBadRequest(msg))
}

#[derive(Debug)]
pub struct CustomNotFound(pub String);

impl Reject for CustomNotFound {}

pub fn custom_not_found(msg: String) -> warp::reject::Rejection {
    warp::reject::custom(CustomNotFound(msg))
}

#[derive(Debug)]
pub struct CustomServerError(pub String);

impl Reject for CustomServerError {}

pub fn custom_server_error(msg: String) -> warp::reject::Rejection {
    warp::reject::custom(CustomServerError(msg))
}

#[derive(Debug)]
pub struct Unauthorized(pub String);

impl Reject for Unauthorized {}

pub fn unauthorized(msg: String) -> warp::reject::Rejection {
    warp::reject::custom(Unauthorized(msg))
}

/// Receives a `Rejection` and turns it into an error response.
///
/// Unknown methods produce `405` with an empty body; everything else gets a
/// JSON `{code, message}` body.
pub async fn handle_rejection(err: warp::Rejection) -> Result<warp::reply::Response, Infallible> {
    let code;
    let message;

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(
            warp::reply::with_status(warp::reply(), StatusCode::METHOD_NOT_ALLOWED)
                .into_response(),
        );
    }

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "not found".to_string();
    } else if let Some(e) = err.find::<CustomBadRequest>() {
        code = StatusCode::BAD_REQUEST;
        message = e.0.clone();
    } else if let Some(e) = err.find::<CustomNotFound>() {
        code = StatusCode::NOT_FOUND;
        message = e.0.clone();
    } else if let Some(e) = err.find::<CustomServerError>() {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = e.0.clone();
    } else if let Some(e) = err.find::<Unauthorized>() {
        code = StatusCode::UNAUTHORIZED;
        message = e.0.clone();
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        message = format!("error deserializing request body: {}", e);
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = format!("invalid query: {}", e);
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "unhandled error".to_string();
    }

    let json = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message,
    });

    Ok(warp::reply::with_status(json, code).into_response())
}
