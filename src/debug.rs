use std::fmt;
use std::sync::OnceLock;

/// Hex dumps of raw datagrams are emitted when `VBMC_DEBUG` is set and non-empty.
pub(crate) fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("VBMC_DEBUG")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    })
}

pub(crate) fn dump_hex(direction: &'static str, peer: &str, bytes: &[u8]) {
    if !enabled() {
        return;
    }
    tracing::trace!(direction, peer, len = bytes.len(), bytes = %Hex(bytes), "datagram");
}

struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
