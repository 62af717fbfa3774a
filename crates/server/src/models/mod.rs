mod message;
mod notification;
mod user;

pub use message::*;
pub use notification::*;
pub use user::*;

use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;

/// RFC 3339 UTC with fixed millisecond precision, so stored timestamps sort lexically.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_secs_ago(secs: i64) -> String {
    (Utc::now() - Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
    pub has_more: bool,
}
