//! Immutable chainable queries.

use std::{fmt, sync::Arc};

use crate::{
    collection::{Collection, Record},
    condition::Condition,
    error::{DataError, Result},
    item::Item,
    page::Page,
    value::Value,
};

/// Conditions joined by AND, added by one `filter` call.
type ConditionGroup = Vec<(String, Condition)>;

/// A query over one collection.
///
/// Every transform returns a new query; the collection is never modified.
#[derive(Clone)]
pub struct Query {
    collection: Arc<Collection>,
    conditions: Vec<ConditionGroup>,
    order: Option<(String, bool)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    pub(crate) fn new(collection: Arc<Collection>) -> Self {
        Self {
            collection,
            conditions: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    /// Model name of the queried collection.
    pub fn model(&self) -> &str {
        self.collection.name()
    }

    /// Keep records matching every condition ("where").
    #[must_use]
    pub fn filter<K, C>(&self, conditions: impl IntoIterator<Item = (K, C)>) -> Self
    where
        K: Into<String>,
        C: Into<Condition>,
    {
        let group = conditions
            .into_iter()
            .map(|(k, c)| (k.into(), c.into()))
            .collect();
        let mut next = self.clone();
        next.conditions.push(group);
        next
    }

    /// Order by a field. Records without the field always come last.
    #[must_use]
    pub fn order(&self, field: impl Into<String>, desc: bool) -> Self {
        let mut next = self.clone();
        next.order = Some((field.into(), desc));
        next
    }

    #[must_use]
    pub fn limit(&self, count: usize) -> Self {
        let mut next = self.clone();
        next.limit = Some(count);
        next
    }

    #[must_use]
    pub fn offset(&self, count: usize) -> Self {
        let mut next = self.clone();
        next.offset = Some(count);
        next
    }

    /// Apply a registered scope.
    pub fn scope(&self, name: &str, args: &[Value]) -> Result<Self> {
        let Some(scope) = self.collection.scope(name).cloned() else {
            return Err(DataError::UnknownScope {
                scope: name.to_string(),
                model: self.model().to_string(),
            });
        };
        scope(self, args).map_err(|e| DataError::Scope {
            scope: name.to_string(),
            model: self.model().to_string(),
            source: Box::new(e),
        })
    }

    /// All matching records.
    pub fn all(&self) -> Vec<Item> {
        self.records().into_iter().map(|r| self.item(r)).collect()
    }

    pub fn first(&self) -> Option<Item> {
        self.records().into_iter().next().map(|r| self.item(r))
    }

    pub fn last(&self) -> Option<Item> {
        self.records().into_iter().next_back().map(|r| self.item(r))
    }

    pub fn count(&self) -> usize {
        self.records().len()
    }

    /// First record matching the conditions.
    pub fn find_by<K, C>(&self, conditions: impl IntoIterator<Item = (K, C)>) -> Option<Item>
    where
        K: Into<String>,
        C: Into<Condition>,
    {
        self.filter(conditions).first()
    }

    /// Split the result into pages of `per_page` items.
    ///
    /// Pages partition the result exactly. An empty result still yields one
    /// empty page.
    pub fn paginate(&self, per_page: usize) -> Result<Vec<Page>> {
        if per_page == 0 {
            return Err(DataError::invalid("per_page must be positive"));
        }

        let items = self.all();
        let total_items = items.len();
        if total_items == 0 {
            return Ok(vec![Page::new(Vec::new(), 1, 1, 0)]);
        }

        let total_pages = total_items.div_ceil(per_page);
        Ok(items
            .chunks(per_page)
            .enumerate()
            .map(|(index, chunk)| Page::new(chunk.to_vec(), index + 1, total_pages, total_items))
            .collect())
    }

    fn item(&self, record: Arc<Record>) -> Item {
        Item::new(record, Arc::clone(&self.collection))
    }

    fn records(&self) -> Vec<Arc<Record>> {
        let mut result: Vec<Arc<Record>> = self
            .collection
            .records()
            .iter()
            .filter(|record| {
                self.conditions.iter().all(|group| {
                    group
                        .iter()
                        .all(|(field, condition)| condition.matches(record.field(field)))
                })
            })
            .cloned()
            .collect();

        if let Some((field, desc)) = &self.order {
            let (mut present, missing): (Vec<_>, Vec<_>) = result
                .into_iter()
                .partition(|record| !record.field(field).is_null());
            present.sort_by(|a, b| a.field(field).rank_cmp(b.field(field)));
            if *desc {
                present.reverse();
            }
            present.extend(missing);
            result = present;
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        result.into_iter().skip(offset).take(limit).collect()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model())
            .field("conditions", &self.conditions)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}
