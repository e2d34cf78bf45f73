use super::Multiplier;

/// Number of multiplier units per 1.00x
pub const HUNDREDTHS: u64 = 100;

/// Default statistical advantage retained by the operator (1%)
pub const DEFAULT_HOUSE_EDGE: f64 = 0.01;

/// Highest crash point a round can reach (10,000x)
pub const MAX_CRASH_POINT: Multiplier = Multiplier::from_hundredths(10_000 * HUNDREDTHS);

/// Number of random bytes in a server seed (hex encoded when published)
pub const SERVER_SEED_BYTES: usize = 32;

/// Number of random bytes in a generated client seed
pub const CLIENT_SEED_BYTES: usize = 16;

/// Maximum length of a seed string (server or client)
pub const MAX_SEED_LENGTH: usize = 128;

/// Default betting window in seconds
pub const BETTING_WINDOW_SECS: u64 = 15;

/// Default number of completed rounds retained in memory
pub const HISTORY_CAPACITY: usize = 100;

/// Number of crash points included in a status response
pub const RECENT_CRASHES: usize = 10;
