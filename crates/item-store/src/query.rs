/// Restricts the sort attribute of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    /// Sort value equals the given value.
    Equals(String),
    /// Sort value starts with the given prefix.
    BeginsWith(String),
    /// Sort value lies in the inclusive range.
    Between(String, String),
}

impl SortCondition {
    /// Returns true if `sort` satisfies the condition.
    pub fn matches(&self, sort: &str) -> bool {
        match self {
            SortCondition::Equals(v) => sort == v,
            SortCondition::BeginsWith(prefix) => sort.starts_with(prefix.as_str()),
            SortCondition::Between(lo, hi) => sort >= lo.as_str() && sort <= hi.as_str(),
        }
    }
}

/// Builder for querying the items of one partition.
///
/// Results are ordered by sort value, ascending unless [`ItemQuery::descending`]
/// is set.
#[derive(Debug, Clone)]
pub struct ItemQuery {
    /// The partition to read.
    pub partition: String,

    /// Optional restriction on the sort attribute.
    pub sort: Option<SortCondition>,

    /// Maximum number of items to return.
    pub limit: Option<usize>,

    /// Return items in descending sort order.
    pub descending: bool,
}

impl ItemQuery {
    /// Creates a query for all items in a partition.
    pub fn partition(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
            limit: None,
            descending: false,
        }
    }

    /// Restricts to sort values starting with `prefix`.
    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.sort = Some(SortCondition::BeginsWith(prefix.into()));
        self
    }

    /// Restricts to sort values in the inclusive range.
    pub fn between(mut self, lo: impl Into<String>, hi: impl Into<String>) -> Self {
        self.sort = Some(SortCondition::Between(lo.into(), hi.into()));
        self
    }

    /// Restricts to one sort value.
    pub fn sort_equals(mut self, value: impl Into<String>) -> Self {
        self.sort = Some(SortCondition::Equals(value.into()));
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Orders results by descending sort value.
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_conditions() {
        assert!(SortCondition::Equals("a".into()).matches("a"));
        assert!(!SortCondition::Equals("a".into()).matches("ab"));
        assert!(SortCondition::BeginsWith("prompt#".into()).matches("prompt#1"));
        assert!(SortCondition::Between("b".into(), "d".into()).matches("c"));
        assert!(SortCondition::Between("b".into(), "d".into()).matches("d"));
        assert!(!SortCondition::Between("b".into(), "d".into()).matches("e"));
    }

    #[test]
    fn test_builder() {
        let q = ItemQuery::partition("p").begins_with("x").limit(5).descending();
        assert_eq!(q.partition, "p");
        assert_eq!(q.sort, Some(SortCondition::BeginsWith("x".into())));
        assert_eq!(q.limit, Some(5));
        assert!(q.descending);
    }
}
