use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity Provider Payloads ---

/// Body of the client-credentials grant sent to `/oauth/token`.
#[derive(Debug, Serialize)]
pub struct ClientCredentialsRequest<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub audience: &'a str,
}

/// ManagementTokenResponse
///
/// Successful `/oauth/token` response. `expires_in` is in seconds.
#[derive(Debug, Deserialize)]
pub struct ManagementTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Body of the authorization-code grant sent to `/oauth/token` from the login callback.
#[derive(Debug, Serialize)]
pub struct AuthorizationCodeRequest<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub code: &'a str,
    pub redirect_uri: &'a str,
}

/// AuthorizationCodeResponse
///
/// Tokens issued for a completed hosted login.
#[derive(Debug, Deserialize)]
pub struct AuthorizationCodeResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// `/userinfo` response; only the subject is read.
#[derive(Debug, Deserialize)]
pub struct UserInfoResponse {
    pub sub: String,
}

/// The subset of a Management API user record the preference store reads.
#[derive(Debug, Default, Deserialize)]
pub struct UserProfileResponse {
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
}

/// Free-form metadata the marketplace stores on each user.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// PATCH body updating a user's metadata.
#[derive(Debug, Serialize)]
pub struct UpdateUserMetadataRequest {
    pub user_metadata: UserMetadata,
}

// --- API Request/Response Schemas ---

/// LanguageRequest
///
/// Payload for `PUT /api/me/language`.
#[derive(Debug, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct LanguageRequest {
    #[schema(example = "fr")]
    pub language: String,
}

/// LanguageResponse
///
/// The effective language preference and where it came from.
#[derive(Debug, Deserialize, Serialize, PartialEq, TS, ToSchema)]
#[ts(export)]
pub struct LanguageResponse {
    pub language: String,
    pub source: LanguageSource,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LanguageSource {
    Cookie,
    Profile,
    Default,
}
