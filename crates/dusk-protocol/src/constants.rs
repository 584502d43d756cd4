/// JSON-RPC protocol version used on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// Prefix for every JSON-RPC method name.
pub const METHOD_PREFIX: &str = "game";

/// Default name the coordinator runs under. Reserved: never a player.
pub const DEFAULT_COORDINATOR_NAME: &str = "coordinator";

/// Fewest players a game can start with.
pub const MIN_PLAYERS: usize = 3;

/// Default per-call timeout for coordinator requests.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Default coordinator-side pause between a discussion request and the vote.
pub const DEFAULT_DISCUSSION_WINDOW_MS: u64 = 15_000;

/// Default grace period before the first phase so peers can come up.
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 2_000;

/// Default listen address for a node.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9400";
