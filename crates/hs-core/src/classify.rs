//! Keyword-based billable classification.

/// Decides whether a lowercased event title is billable.
///
/// A non-billable keyword match wins over a billable one; with no match at
/// all the configured default applies. Matching is plain substring search, so
/// callers must lowercase both the title and the keywords.
pub fn is_billable<S: AsRef<str>>(
    title_lower: &str,
    bill_keywords: &[S],
    nonbill_keywords: &[S],
    default_billable: bool,
) -> bool {
    if nonbill_keywords
        .iter()
        .any(|kw| title_lower.contains(kw.as_ref()))
    {
        return false;
    }
    if bill_keywords
        .iter()
        .any(|kw| title_lower.contains(kw.as_ref()))
    {
        return true;
    }
    default_billable
}

/// Lowercased keyword sets used to filter and classify calendar events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordRules {
    skip: Vec<String>,
    billable: Vec<String>,
    non_billable: Vec<String>,
    default_billable: bool,
}

impl KeywordRules {
    /// Builds rules from raw configured keywords.
    ///
    /// Keywords are lowercased once here. Blank keywords are dropped since an
    /// empty substring would match every title.
    pub fn new<S: AsRef<str>>(
        skip: &[S],
        billable: &[S],
        non_billable: &[S],
        default_billable: bool,
    ) -> Self {
        Self {
            skip: normalize(skip),
            billable: normalize(billable),
            non_billable: normalize(non_billable),
            default_billable,
        }
    }

    /// Whether the event should be dropped before it becomes a block.
    pub fn is_skipped(&self, title_lower: &str) -> bool {
        self.skip.iter().any(|kw| title_lower.contains(kw.as_str()))
    }

    pub fn is_billable(&self, title_lower: &str) -> bool {
        is_billable(
            title_lower,
            &self.billable,
            &self.non_billable,
            self.default_billable,
        )
    }
}

fn normalize<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    keywords
        .iter()
        .map(|kw| kw.as_ref().trim().to_lowercase())
        .filter(|kw| !kw.is_empty())
        .collect()
}
