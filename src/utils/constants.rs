//! Shared timing and launch constants
//!
//! Default values used throughout the crate to ensure consistency and avoid
//! magic numbers.

/// Chrome user agent string for stealth mode
///
/// Chrome releases new stable versions ~every 4 weeks; update quarterly to
/// stay within a reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// How long a click waits for a new tab to appear before concluding there is none
pub const NEW_TAB_RACE_MS: u64 = 1_500;

/// How long a click waits for the network to go idle before giving up on it
pub const NETWORK_IDLE_RACE_MS: u64 = 5_000;

/// Per-character typing delay range, simulates human input and defeats naive
/// anti-automation heuristics
pub const TYPE_DELAY_MS: std::ops::RangeInclusive<u64> = 25..=75;

/// Maximum dispatch retries per failure site (three total attempts)
pub const MAX_DISPATCH_RETRIES: u32 = 2;

/// Poll interval for xpath resolution and new-tab detection
pub const POLL_INTERVAL_MS: u64 = 100;

/// Deadline for resolving an xpath to an on-screen point
pub const LOCATE_TIMEOUT_MS: u64 = 5_000;
