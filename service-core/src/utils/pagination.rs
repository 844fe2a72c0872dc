use serde::Deserialize;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// `limit`/`offset` query parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamps() {
        let p = Pagination::default();
        assert_eq!((p.limit(), p.offset()), (20, 0));

        let p = Pagination {
            limit: Some(500),
            offset: Some(-3),
        };
        assert_eq!((p.limit(), p.offset()), (100, 0));

        let p = Pagination {
            limit: Some(0),
            offset: Some(40),
        };
        assert_eq!((p.limit(), p.offset()), (1, 40));
    }
}
