use std::time::Duration;

use crate::error::Error;

pub(crate) fn record_command(netfn: u8, cmd: u8, elapsed: Duration, completion_code: u8) {
    #[cfg(feature = "metrics")]
    {
        metrics::counter!("vbmc_ipmi_commands_total", "outcome" => command_outcome(completion_code))
            .increment(1);
        metrics::histogram!("vbmc_ipmi_command_seconds").record(elapsed.as_secs_f64());
    }

    tracing::debug!(
        netfn,
        cmd,
        completion_code,
        outcome = command_outcome(completion_code),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "ipmi command handled"
    );
}

/// Label of a handled command: `ok` for a normal completion, `err` otherwise.
pub(crate) fn command_outcome(completion_code: u8) -> &'static str {
    if completion_code == 0x00 { "ok" } else { "err" }
}

pub(crate) fn record_rejected(peer: &str, err: &Error) {
    #[cfg(feature = "metrics")]
    metrics::counter!("vbmc_ipmi_rejected_total", "kind" => error_kind(err)).increment(1);

    tracing::warn!(peer, error = %err, "ipmi datagram rejected");
}

pub(crate) fn record_reset(reset_type: &str, status: u16) {
    #[cfg(feature = "metrics")]
    metrics::counter!(
        "vbmc_redfish_resets_total",
        "status" => status.to_string()
    )
    .increment(1);

    tracing::info!(reset_type, status, "redfish reset action");
}

#[cfg(feature = "metrics")]
fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Io(_) => "io",
        Error::Protocol(_) | Error::ProtocolOwned(_) => "protocol",
        Error::UnsupportedClass(_)
        | Error::UnsupportedAuthType(_)
        | Error::UnsupportedCommand { .. } => "unsupported",
        Error::UnknownSession(_) | Error::UserNotFound | Error::SessionLimit(_) => "session",
        Error::AuthenticationFailed(_) => "authentication",
        Error::Crypto(_) => "crypto",
        Error::StateConflict(_) => "state_conflict",
        Error::Machine(_) => "machine",
        Error::NoBmcNetwork(_) | Error::Binding(_) | Error::UnknownSerial(_) => "binding",
        Error::InvalidArgument(_) => "invalid_argument",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_follows_completion_code() {
        assert_eq!(command_outcome(0x00), "ok");
        assert_eq!(command_outcome(0xD5), "err");
        assert_eq!(command_outcome(0xC1), "err");
    }
}
