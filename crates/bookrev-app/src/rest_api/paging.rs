use crate::error::{ApiError, ApiResult};
use bookrev_dal::{Batch, ListingParams, Order};
use garde::Validate;
use serde::Serialize;

#[derive(Debug, Clone, Default, Validate, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi",into_params(parameter_in = Query))]
pub struct Paging {
    #[garde(inner(range(min = 1)))]
    page: Option<u32>,
    #[garde(inner(range(min = 1, max = 1000)))]
    page_size: Option<u32>,
    /// Comma separated fields, `-` prefix for descending order
    #[garde(inner(length(max = 255)))]
    sort: Option<String>,
    /// Case insensitive substring search
    #[garde(inner(length(max = 255)))]
    search: Option<String>,
}

fn parse_ordering(orderings: &str) -> ApiResult<Vec<Order>> {
    orderings
        .split(',')
        .map(|name| {
            let (field_name, descending) = match name.trim() {
                "" => return Err(ApiError::InvalidQuery("Empty ordering name".to_string())),
                name if name.len() > 100 => {
                    return Err(ApiError::InvalidQuery("Ordering name too long".to_string()))
                }
                name if name.starts_with('+') => (&name[1..], false),
                name if name.starts_with('-') => (&name[1..], true),
                name => (name, false),
            };

            let order = if descending {
                Order::Desc(field_name.to_string())
            } else {
                Order::Asc(field_name.to_string())
            };

            Ok(order)
        })
        .collect::<Result<Vec<_>, _>>()
}

impl Paging {
    pub fn into_listing_params(self, default_page_size: u32) -> ApiResult<ListingParams> {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size(default_page_size);
        let offset = i64::from(page - 1) * i64::from(page_size);
        let order = self.sort.as_deref().map(parse_ordering).transpose()?;

        Ok(ListingParams {
            offset,
            limit: page_size.into(),
            order,
            filter: self.search,
        })
    }

    pub fn page_size(&self, default_page_size: u32) -> u32 {
        self.page_size.unwrap_or(default_page_size).max(1)
    }
}

#[derive(Debug, Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Page<T> {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total: u64,
    pub rows: Vec<T>,
}

impl<T> Page<T>
where
    T: Serialize,
{
    pub fn from_batch(batch: Batch<T>, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        let page = u32::try_from(batch.offset.max(0) / i64::from(page_size) + 1).unwrap_or(u32::MAX);
        let total_pages =
            u32::try_from(batch.total.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX);
        Self {
            page,
            page_size,
            total_pages,
            total: batch.total,
            rows: batch.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_params() {
        let paging = Paging {
            page: Some(3),
            page_size: Some(20),
            sort: Some("-average_rating, title".to_string()),
            search: Some("dune".to_string()),
        };
        let params = paging.into_listing_params(100).unwrap();
        assert_eq!(params.offset, 40);
        assert_eq!(params.limit, 20);
        assert_eq!(params.filter.as_deref(), Some("dune"));
        let order = params.order.unwrap();
        assert!(matches!(&order[0], Order::Desc(f) if f == "average_rating"));
        assert!(matches!(&order[1], Order::Asc(f) if f == "title"));

        let params = Paging::default().into_listing_params(25).unwrap();
        assert_eq!(params.offset, 0);
        assert_eq!(params.limit, 25);
        assert!(params.order.is_none());

        let paging = Paging {
            sort: Some("title,,".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            paging.into_listing_params(10),
            Err(ApiError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_paging_validation() {
        let paging = Paging {
            page_size: Some(1001),
            ..Default::default()
        };
        assert!(paging.validate().is_err());
        let paging = Paging {
            page: Some(0),
            ..Default::default()
        };
        assert!(paging.validate().is_err());
    }

    #[test]
    fn test_page_from_batch() {
        let batch = Batch {
            offset: 20,
            limit: 10,
            total: 31,
            rows: vec![1, 2, 3],
        };
        let page = Page::from_batch(batch, 10);
        assert_eq!(page.page, 3);
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.total, 31);
        assert_eq!(page.rows.len(), 3);

        let empty: Page<u8> = Page::from_batch(
            Batch {
                offset: 0,
                limit: 10,
                total: 0,
                rows: vec![],
            },
            10,
        );
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 0);
    }
}
