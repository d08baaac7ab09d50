//! Exit status for the trawl binary

use trawl_common::TrawlError;

/// Exit code for success
pub const EXIT_SUCCESS: u8 = 0;

/// Exit code for failures that carry no specific code
pub const EXIT_GENERAL_ERROR: u8 = 1;

/// Exit code for a fatal error, taken from the engine error when there is one
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<TrawlError>())
        .and_then(|e| u8::try_from(e.code()).ok())
        .unwrap_or(EXIT_GENERAL_ERROR)
}
