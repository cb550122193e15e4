// ═══════════════════════════════════════════════════════════
// Lookup errors — the classification every chain fails with
// ═══════════════════════════════════════════════════════════

use std::time::Duration;

/// Why a lookup (or a whole chain of them) failed.
///
/// Every stage failure travels unchanged to the single catch point of its
/// chain, so the variant seen by the renderer is the one produced by the stage
/// that broke.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    /// No usable response: connection failure, or a body that is not JSON.
    #[error("network problem: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("{label} ({status})")]
    HttpStatus { status: u16, label: String },

    /// A 2xx reverse-geocode payload carrying the "006" rejection code.
    #[error("rate limit exceeded, try again in a moment")]
    DomainRateLimited,

    /// The country resolved fine but has no neighbour to continue with.
    #[error("no neighbour found")]
    NoNeighbor,

    #[error("timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Well-formed JSON that is missing something the next stage needs.
    #[error("unexpected payload: {0}")]
    Payload(String),

    /// Every input of an `any` combinator failed; errors keep input order.
    #[error("all {} lookups failed", .0.len())]
    AllFailed(Vec<LookupError>),

    #[error("location unavailable: {0}")]
    Location(String),
}

impl LookupError {
    pub fn http_status(status: u16, label: impl Into<String>) -> Self {
        LookupError::HttpStatus { status, label: label.into() }
    }

    /// The message handed to `Renderer::render_error`.
    pub fn user_message(&self) -> String {
        format!("Something went wrong 💥 {}", self)
    }
}

pub type Outcome<T> = Result<T, LookupError>;
