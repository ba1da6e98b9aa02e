/*!
 * Capture Limits and Constants
 *
 * Centralized location for polling, dedup and channel limits.
 * Organized by component so defaults are discoverable in one place.
 */

use std::time::Duration;

// =============================================================================
// POLL SCHEDULE
// =============================================================================

/// Fastest poll interval, used while events keep arriving
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Slowest poll interval, used after idle cycles and after errors
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Multiplier applied to the interval on every idle cycle
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

// =============================================================================
// DEDUPLICATION
// =============================================================================

/// Re-read margin behind the watermark
/// Absorbs commit and clock skew between the server and the poller
pub const DEFAULT_OVERLAP_WINDOW: Duration = Duration::from_secs(5);

// =============================================================================
// CHANNELS
// =============================================================================

/// Per-stream event channel capacity
/// Oldest events are evicted past this point
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

// =============================================================================
// FILTERS
// =============================================================================

/// Time allowed for a single exclusion pattern evaluation
pub const DEFAULT_REGEX_BUDGET: Duration = Duration::from_secs(1);

/// Compiled program size limit for exclusion patterns (1MB)
pub const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// Lazy DFA cache limit for exclusion patterns (2MB)
pub const REGEX_DFA_SIZE_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Fingerprint assigned to empty or whitespace-only text
pub const EMPTY_FINGERPRINT: &str = "0000000000000000";

/// Hex characters kept from the fingerprint digest
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Marker carried by records whose payload could not be parsed
pub const MALFORMED_MARKER: &str = "<malformed>";

/// Random suffix length appended to stream ids
pub const STREAM_ID_SUFFIX_LEN: usize = 8;
