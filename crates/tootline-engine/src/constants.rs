//! Engine-wide tuning knobs.

/// How many statuses a single page request asks the server for.
///
/// Also the yardstick for the full-page heuristic: a response this long
/// probably has more behind it, a shorter one is the end of what the server
/// will give us.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// How many cached rows the initial load pulls from disk before the network
/// round trip completes. Three screens' worth.
pub const INITIAL_CACHE_PAGE: u32 = DEFAULT_PAGE_SIZE * 3;

/// Upper bound on cached timeline rows per account. Cleanup trims everything
/// older once a sync pushes the table past this.
pub const MAX_CACHED_ROWS: u32 = 1000;

/// Event bus buffer per subscriber. A timeline that falls this far behind
/// resynchronizes with a refresh instead of replaying.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Command queue depth for a timeline task. Commands arriving while the
/// queue is full are dropped, which is what turns a second "refresh" tap
/// into a no-op.
pub const COMMAND_CHANNEL_CAPACITY: usize = 8;
