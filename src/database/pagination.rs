use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

use crate::config;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Raw `?page=&limit=&sort=&order=` query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// Whitelist of sortable fields for one resource: (api name, SQL column)
pub struct SortSpec {
    pub fields: &'static [(&'static str, &'static str)],
    pub default_column: &'static str,
    pub default_direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub sort_column: &'static str,
    pub direction: SortDirection,
}

impl PageQuery {
    pub fn resolve(&self, spec: &SortSpec) -> Result<Pagination, ValidationErrors> {
        let api = &config::config().api;
        self.resolve_with(spec, api.default_page_size, api.max_page_size)
    }

    fn resolve_with(&self, spec: &SortSpec, default_limit: i64, max_limit: i64) -> Result<Pagination, ValidationErrors> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ValidationErrors::single("page", "Must be at least 1"));
        }

        let limit = self.limit.unwrap_or(default_limit);
        if limit < 1 {
            return Err(ValidationErrors::single("limit", "Must be at least 1"));
        }
        let limit = if limit > max_limit {
            tracing::debug!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            max_limit
        } else {
            limit
        };
        if (page - 1).checked_mul(limit).is_none() {
            return Err(ValidationErrors::single("page", "Is too large"));
        }

        let sort_column = match self.sort.as_deref() {
            None => spec.default_column,
            Some(name) => spec
                .fields
                .iter()
                .find(|(api_name, _)| *api_name == name)
                .map(|(_, column)| *column)
                .ok_or_else(|| {
                    let allowed: Vec<&str> = spec.fields.iter().map(|(api_name, _)| *api_name).collect();
                    ValidationErrors::single("sort", format!("Must be one of: {}", allowed.join(", ")))
                })?,
        };

        let direction = match self.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => spec.default_direction,
            Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(_) => return Err(ValidationErrors::single("order", "Must be 'asc' or 'desc'")),
        };

        Ok(Pagination {
            page,
            limit,
            sort_column,
            direction,
        })
    }
}

impl Pagination {
    /// Saturates; `resolve` already rejects pages whose offset would overflow
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Append `ORDER BY ... LIMIT ... OFFSET ...` to a query under construction
    pub fn push_to(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(format!(" ORDER BY {} {}", self.sort_column, self.direction.to_sql()));
        builder.push(" LIMIT ").push_bind(self.limit);
        builder.push(" OFFSET ").push_bind(self.offset());
    }
}

/// A page of results plus the unpaged total
#[derive(Debug, Clone, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
        }
    }

    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORT: SortSpec = SortSpec {
        fields: &[("created_at", "l.created_at"), ("name", "l.name")],
        default_column: "l.created_at",
        default_direction: SortDirection::Desc,
    };

    #[test]
    fn defaults_apply() {
        let p = PageQuery::default().resolve_with(&SORT, 25, 100).unwrap();
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 25);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.sort_column, "l.created_at");
        assert_eq!(p.direction, SortDirection::Desc);
    }

    #[test]
    fn limit_is_capped_and_offset_follows_page() {
        let q = PageQuery {
            page: Some(3),
            limit: Some(500),
            sort: Some("name".into()),
            order: Some("ASC".into()),
        };
        let p = q.resolve_with(&SORT, 25, 100).unwrap();
        assert_eq!(p.limit, 100);
        assert_eq!(p.offset(), 200);
        assert_eq!(p.sort_column, "l.name");
        assert_eq!(p.direction, SortDirection::Asc);
    }

    #[test]
    fn rejects_unknown_sort_and_bad_numbers() {
        let bad_sort = PageQuery { sort: Some("password_hash".into()), ..Default::default() };
        let err = bad_sort.resolve_with(&SORT, 25, 100).unwrap_err();
        assert_eq!(err.fields["sort"], "Must be one of: created_at, name");

        let bad_page = PageQuery { page: Some(0), ..Default::default() };
        assert!(bad_page.resolve_with(&SORT, 25, 100).is_err());

        let bad_order = PageQuery { order: Some("sideways".into()), ..Default::default() };
        assert!(bad_order.resolve_with(&SORT, 25, 100).is_err());
    }

    #[test]
    fn push_to_renders_order_and_limits() {
        let p = PageQuery::default().resolve_with(&SORT, 10, 100).unwrap();
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM leads l");
        p.push_to(&mut builder);
        assert_eq!(builder.sql(), "SELECT * FROM leads l ORDER BY l.created_at DESC LIMIT $1 OFFSET $2");
    }

    #[test]
    fn page_map_keeps_counts() {
        let p = PageQuery::default().resolve_with(&SORT, 10, 100).unwrap();
        let page = Page::new(vec![1, 2], 12, &p).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total, 12);
        assert_eq!(page.limit, 10);
    }

    #[test]
    fn huge_page_is_rejected_instead_of_overflowing() {
        let q = PageQuery {
            page: Some(i64::MAX),
            limit: Some(50),
            ..Default::default()
        };
        let err = q.resolve_with(&SORT, 25, 100).unwrap_err();
        assert!(err.fields.contains_key("page"));

        // the largest page that still fits keeps a non-negative offset
        let q = PageQuery {
            page: Some(i64::MAX / 50),
            limit: Some(50),
            ..Default::default()
        };
        let p = q.resolve_with(&SORT, 25, 100).unwrap();
        assert!(p.offset() >= 0);
    }
}
