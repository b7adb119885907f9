//! Shared library for Wayfeel Lambda functions and the calendar client.
//!
//! This crate provides the wire records, the mood table, error and
//! configuration types, and the Google Calendar client used across crates.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod google;
pub mod http;
pub mod models;
pub mod mood;
pub mod oauth_state;
pub mod secrets;

pub use auth::{authenticate_request, extract_user_from_context, AuthenticatedUser, SessionClaims, SessionVerifier};
pub use config::Config;
pub use error::{Error, Result};
pub use google::{GoogleCalendarClient, GoogleCalendarEvent, GoogleTokens};
pub use http::{error_response, failure_response, json_response, parse_json_body};
pub use models::{
    EditRequest, EditResponse, ErrorBody, ExternalEvent, ExternalEventsResponse, MarkerRecord, NewMarker,
};
pub use mood::MoodTag;
pub use oauth_state::OAuthStateSigner;
pub use secrets::{
    get_database_credentials, get_secret, DatabaseCredentials, GoogleOAuthCredentials, StoredCalendarTokens,
};
