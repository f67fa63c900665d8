//! System-wide constants for the fab workspace.
//!
//! Single source of truth for codec limits and runtime defaults.

use static_assertions::const_assert;

/// Width of one register word in bits.
pub const WORD_BITS: u8 = 16;

/// Lowest byte decoded verbatim in ASCII fields.
pub const PRINTABLE_MIN: u8 = 0x20;

/// Highest byte decoded verbatim in ASCII fields.
pub const PRINTABLE_MAX: u8 = 0x7E;

/// Substituted for bytes outside the printable range.
pub const PLACEHOLDER_CHAR: char = '?';

/// Fills the tail of ASCII fields shorter than their word run.
pub const TEXT_PAD_BYTE: u8 = b' ';

/// Top-level key of the resolved alarm in nested state renderings. Layout
/// fields may not use it as their first path segment.
pub const ALARM_KEY: &str = "alarm";

/// Upper bound for integer fields that declare no nominal range.
pub const DEFAULT_INTEGER_MAX: u16 = 255;

/// Default producer poll period in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Ceiling for the producer retry backoff in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;

/// Default simulator update period in milliseconds.
pub const DEFAULT_SIM_INTERVAL_MS: u64 = 2_000;

/// Default size of an in-memory register bank (words).
pub const DEFAULT_BANK_SIZE: usize = 300;

/// Default Unix socket path for live viewers.
pub const DEFAULT_VIEWER_SOCKET: &str = "/tmp/fab_state.sock";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fab/fab_sim.toml";

const_assert!(WORD_BITS as u32 == u16::BITS);
const_assert!(PRINTABLE_MIN <= TEXT_PAD_BYTE && TEXT_PAD_BYTE <= PRINTABLE_MAX);
const_assert!(PLACEHOLDER_CHAR as u32 >= PRINTABLE_MIN as u32);
const_assert!(PLACEHOLDER_CHAR as u32 <= PRINTABLE_MAX as u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        assert!(DEFAULT_POLL_INTERVAL_MS > 0);
        assert!(DEFAULT_MAX_BACKOFF_MS >= DEFAULT_POLL_INTERVAL_MS);
        assert!(DEFAULT_SIM_INTERVAL_MS > 0);
        assert!(DEFAULT_BANK_SIZE > 0);
    }

    #[test]
    fn default_bank_covers_builtin_layouts() {
        // gas_cabinet/v2 reaches word 226.
        assert!(DEFAULT_BANK_SIZE > 226);
    }
}
