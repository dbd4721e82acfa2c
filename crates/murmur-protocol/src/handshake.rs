//! Bearer token extraction for the WebSocket handshake.

use thiserror::Error;

/// Query parameter carrying the token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Scheme prefix of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Picks the bearer token out of the handshake request.
///
/// The `token` query parameter wins over the `Authorization` header.
/// Empty values count as absent.
pub fn extract_bearer_token<'a>(
    query_token: Option<&'a str>,
    authorization: Option<&'a str>,
) -> Result<&'a str, TokenExtractError> {
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Ok(token);
    }

    let Some(header) = authorization else {
        return Err(TokenExtractError::Missing);
    };

    match header.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err(TokenExtractError::Missing),
        None => Err(TokenExtractError::UnsupportedScheme),
    }
}

/// Errors that can occur when extracting a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenExtractError {
    #[error("no bearer token supplied")]
    Missing,

    #[error("authorization header does not use the Bearer scheme")]
    UnsupportedScheme,
}
