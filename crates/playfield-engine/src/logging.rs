//! Subscriber setup for binaries and demos.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding application's choice.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"playfield_engine=debug"`).
///
/// Returns `false` if a global subscriber was already installed, which is
/// harmless: repeated calls from tests or demos simply keep the first one.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init_tracing("warn");
        assert!(!init_tracing("debug"));
    }
}
