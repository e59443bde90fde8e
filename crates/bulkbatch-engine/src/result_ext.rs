//! Error logging helper for assembly results.

use std::fmt::Display;
use tracing::error;

/// Adds a `log` method that records an `Err` with context and the
/// caller's source location, then hands the result back unchanged.
///
/// ```ignore
/// use bulkbatch_engine::ResultExt;
///
/// let step = assembler.assemble_step(&descriptor, None).log("assembling step 'load'")?;
/// ```
pub trait ResultExt<T, E> {
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "bulkbatch_engine",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Assembly failed"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_passes_result_through() {
        let ok: Result<u32, String> = Ok(7);
        assert_eq!(ok.log("ok path"), Ok(7));

        let err: Result<u32, String> = Err("boom".to_string());
        assert_eq!(err.log("err path"), Err("boom".to_string()));
    }
}
