use crate::error::IndexerResult;
use crate::realm::client::IndexerApi;
use crate::realm::model::SubrealmListing;

pub const SUBREALM_PAGE_SIZE: usize = 200;

/// Lazy, finite, single-use walk over the direct children of one parent.
///
/// Pages are requested at `offset = page * page_size` starting from page 0.
/// A short page (fewer than `page_size` entries, including an empty one) is
/// the last; after it, or after any error, the cursor is exhausted.
pub struct SubrealmPages<'a> {
    api: &'a dyn IndexerApi,
    parent_id: &'a str,
    page_size: usize,
    page: usize,
    done: bool,
}

impl<'a> SubrealmPages<'a> {
    pub fn new(api: &'a dyn IndexerApi, parent_id: &'a str, page_size: usize) -> Self {
        Self {
            api,
            parent_id,
            page_size: page_size.max(1),
            page: 0,
            done: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.page * self.page_size
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next non-empty page, or `Ok(None)` once the listing is exhausted.
    pub async fn next_page(&mut self) -> IndexerResult<Option<Vec<SubrealmListing>>> {
        if self.done {
            return Ok(None);
        }

        let offset = self.offset();
        let results = match self
            .api
            .find_subrealms(self.parent_id, self.page_size, offset)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        tracing::debug!(
            parent_id = self.parent_id,
            page = self.page,
            offset,
            len = results.len(),
            "subrealm page fetched"
        );

        if results.len() < self.page_size {
            self.done = true;
        }
        self.page += 1;

        if results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(results))
        }
    }
}
