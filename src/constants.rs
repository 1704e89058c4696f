// Longest accepted post or reply body, in characters, after trimming.
pub const MAX_POST_CONTENT_LENGTH: usize = 5000;

// Length of the ban issued on the second violation.
pub const TEMPORARY_BAN_HOURS: i64 = 24;

// Attempts at a ledger compare-and-swap before the request gives up.
pub const MAX_LEDGER_RETRIES: usize = 32;
