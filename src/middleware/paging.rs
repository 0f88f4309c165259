use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};

pub const DEFAULT_PAGE_LENGTH: u32 = 20;
pub const MAX_PAGE_LENGTH: u32 = 100;

/// `?page=<n>&len=<n>` (or `?p=&l=`) paging for list endpoints.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page_length: u32,
    pub page: u32,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page_length: DEFAULT_PAGE_LENGTH,
            page: 0,
        }
    }
}

impl PageState {
    pub fn new(page: u32, page_length: u32) -> PageState {
        PageState {
            page_length: page_length.clamp(1, MAX_PAGE_LENGTH),
            page,
        }
    }

    pub fn skip(&self) -> u64 {
        self.page as u64 * self.page_length as u64
    }

    pub fn limit(&self) -> i64 {
        self.page_length as i64
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let query = |long: &str, short: &str| -> Option<u32> {
            request
                .query_value(long)
                .and_then(|it| it.ok())
                .or_else(|| request.query_value(short).and_then(|it| it.ok()))
        };

        let length = query("len", "l");
        let page = query("page", "p");

        Outcome::Success(PageState::new(
            page.unwrap_or(0),
            length.unwrap_or(DEFAULT_PAGE_LENGTH),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds() {
        let page = PageState::new(2, 500);
        assert_eq!(page.page_length, MAX_PAGE_LENGTH);
        assert_eq!(page.skip(), 200);
        assert_eq!(PageState::new(0, 0).limit(), 1);
    }
}
