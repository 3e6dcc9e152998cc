/// What a caller should do after receiving an HTTP status from the Portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Decode the body and carry on
    Success,
    /// Try again after the configured delay, if budget remains
    Retry,
    /// Give up immediately
    Terminal,
}

/// Classify a registration response status.
///
/// 401/403/404 and 400/409 are terminal: credentials, cluster support or
/// the request itself are wrong and repeating it cannot help. 429 and every
/// other unexpected status are retryable within the attempt budget.
#[must_use]
pub const fn classify(status: u16) -> Outcome {
    match status {
        200 | 201 => Outcome::Success,
        400 | 401 | 403 | 404 | 409 => Outcome::Terminal,
        _ => Outcome::Retry,
    }
}
