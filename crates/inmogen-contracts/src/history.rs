use crate::content::GeneratedListing;

/// Newest-first, in-memory history of generated listings for the current
/// session.
#[derive(Debug, Default)]
pub struct ListingHistory {
    records: Vec<GeneratedListing>,
}

impl ListingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts at the front. Ids are server-assigned and trusted to be
    /// unique; a duplicate id simply becomes a second entry.
    pub fn prepend(&mut self, record: GeneratedListing) {
        self.records.insert(0, record);
    }

    pub fn find_by_id(&self, id: i64) -> Option<&GeneratedListing> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn records(&self) -> &[GeneratedListing] {
        &self.records
    }

    /// Installs a freshly fetched history, replacing whatever was loaded.
    pub fn replace_all(&mut self, records: Vec<GeneratedListing>) {
        self.records = records;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
