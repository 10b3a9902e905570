#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The server reported more finished files than it has in total.
    #[error("Inconsistent summary: {converted} converted + {failed} failed exceeds total {total}")]
    InconsistentSummary {
        total: u32,
        converted: u32,
        failed: u32,
    },
}
