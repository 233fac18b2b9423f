// ResultGuard - last size check before a result leaves the pipeline

use tracing::{debug, warn};

use super::models::{format_limit, format_megabytes, DownloadResult, SizeBudget};

#[derive(Debug)]
pub enum GuardVerdict {
    /// Ownership of the file passes to the delivery step
    Accept(DownloadResult),
    /// The file has already been deleted
    Reject { reason: String, size_bytes: u64 },
}

impl GuardVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept(_))
    }
}

pub struct ResultGuard;

impl ResultGuard {
    /// Measure the file on disk and enforce the budget.
    ///
    /// A result whose size cannot be measured is rejected with the last known size.
    pub fn check(mut result: DownloadResult, budget: SizeBudget) -> GuardVerdict {
        let size_bytes = match result.file.size_on_disk() {
            Ok(size) => size,
            Err(e) => {
                warn!(path = %result.file.path().display(), error = %e, "Cannot measure result");
                let size_bytes = result.size_bytes;
                result.file.remove();
                return GuardVerdict::Reject {
                    reason: format!("file could not be measured: {}", e),
                    size_bytes,
                };
            }
        };

        if !budget.allows(size_bytes) {
            warn!(
                path = %result.file.path().display(),
                size_bytes,
                budget_bytes = budget.bytes(),
                "Result exceeds size budget, deleting"
            );
            result.file.remove();
            return GuardVerdict::Reject {
                reason: format!(
                    "File size ({}) exceeds the limit ({})",
                    format_megabytes(size_bytes),
                    format_limit(budget.bytes())
                ),
                size_bytes,
            };
        }

        debug!(size_bytes, budget_bytes = budget.bytes(), "Result within budget");
        result.size_bytes = size_bytes;
        GuardVerdict::Accept(result)
    }
}
