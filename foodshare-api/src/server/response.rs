use crate::server::extract::Json;
use axum::response::{IntoResponse, Response};
use foodshare_common::query::{Page, PageInfo, Pagination};
use serde::Serialize;

/// The body every endpoint replies with.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unread_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<PageInfo>,
}

impl<T> Envelope<T> {
    fn new(success: bool, data: Option<T>) -> Self {
        Self {
            success,
            data,
            message: None,
            count: None,
            unread_count: None,
            pagination: None,
        }
    }

    pub fn data(data: T) -> Self {
        Self::new(true, Some(data))
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_unread_count(mut self, unread_count: u64) -> Self {
        self.unread_count = Some(unread_count);
        self
    }
}

impl<T> Envelope<Vec<T>> {
    /// A list reply carrying the count of this page.
    pub fn list(items: Vec<T>) -> Self {
        let count = items.len() as u64;
        Self::data(items).with_count(count)
    }

    pub fn page(page: Page<T>, pagination: Pagination) -> Self {
        let mut envelope = Self::list(page.items);
        envelope.pagination = Some(PageInfo::new(page.total, pagination));
        envelope
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(true, None).with_message(message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(false, None).with_message(message)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
