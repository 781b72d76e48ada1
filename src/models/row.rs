/// Snapshot of one `tr.kt-datatable__row` read from the host page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// Position among all table rows in document order; the handle used for writes.
    pub index: usize,
    /// Whether the row carries a name cell, i.e. is a data (or header) row.
    pub has_name: bool,
    pub street: Option<String>,
    pub city: Option<String>,
    /// Row text with any transit label removed.
    pub text: String,
}
