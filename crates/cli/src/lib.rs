//! Argument parsing and process wiring for the `trftp-server`/`trftp-client`
//! binaries. Thin by design (spec.md §6: "illustrative, not part of the
//! core spec") — all protocol behavior lives in `core`.

pub mod client;
pub mod server;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` formatter driven by `RUST_LOG`, falling
/// back to `debug` for this crate's dependencies when `--verbose` is set
/// and `info` otherwise.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn port_in_range(value: &str) -> Result<u16, String> {
    let port: u16 = value.parse().map_err(|_| format!("invalid port: {value}"))?;
    if !(1024..=65535).contains(&port) {
        return Err(format!("invalid port: {port} (must be 1024-65535)"));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_in_range_accepts_the_dynamic_range() {
        assert_eq!(port_in_range("1024"), Ok(1024));
        assert_eq!(port_in_range("65535"), Ok(65535));
    }

    #[test]
    fn port_in_range_rejects_well_known_ports() {
        assert!(port_in_range("80").is_err());
        assert!(port_in_range("1023").is_err());
    }

    #[test]
    fn port_in_range_rejects_non_numeric_input() {
        assert!(port_in_range("not-a-port").is_err());
    }
}
