//! Per-domain admission

use brief_core::Document;
use std::collections::HashMap;

/// Caps how many documents each domain may contribute
#[derive(Debug, Clone)]
pub struct DomainQuota {
    cap: usize,
    counts: HashMap<String, usize>,
}

impl DomainQuota {
    /// Empty quota
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            counts: HashMap::new(),
        }
    }

    /// Quota with documents already held counted against it
    #[must_use]
    pub fn with_held(cap: usize, held: &[Document]) -> Self {
        let mut quota = Self::new(cap);
        for doc in held {
            *quota.counts.entry(doc.domain.clone()).or_insert(0) += 1;
        }
        quota
    }

    /// Take a slot for `domain` if one is left
    pub fn admit(&mut self, domain: &str) -> bool {
        let used = self.counts.entry(domain.to_string()).or_insert(0);
        if *used >= self.cap {
            false
        } else {
            *used += 1;
            true
        }
    }
}
