//! rotctld line protocol
//!
//! Commands are single ASCII lines. `P` and `S` answer with `RPRT <code>`,
//! `p` answers with azimuth and elevation on two lines.

use crate::{AzEl, Result, RotorError};

/// Replies never exceed this many bytes
pub const REPLY_BUFFER_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetPosition(AzEl),
    GetPosition,
    Stop,
    Quit,
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::SetPosition(pos) => format!("P {:.2} {:.2}\n", pos.azimuth_deg, pos.elevation_deg),
            Command::GetPosition => "p\n".to_string(),
            Command::Stop => "S\n".to_string(),
            Command::Quit => "q\n".to_string(),
        }
    }

    /// Whether the daemon answers this command
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::Quit)
    }
}

fn parse_rprt(reply: &str) -> Option<Result<i32>> {
    let code = reply.trim().strip_prefix("RPRT")?;
    Some(
        code.trim()
            .parse::<i32>()
            .map_err(|_| RotorError::Protocol(format!("bad status line '{}'", reply.trim()))),
    )
}

/// Status reply to `P` or `S`. An empty reply counts as success.
pub fn parse_status(reply: &str) -> Result<()> {
    if reply.trim().is_empty() {
        return Ok(());
    }
    match parse_rprt(reply) {
        Some(Ok(0)) => Ok(()),
        Some(Ok(code)) => Err(RotorError::Rprt(code)),
        Some(Err(e)) => Err(e),
        None => Err(RotorError::Protocol(format!("unexpected reply '{}'", reply.trim()))),
    }
}

/// Position reply to `p`: azimuth and elevation on separate lines.
/// Any `RPRT` line is an error here.
pub fn parse_position(reply: &str) -> Result<AzEl> {
    if let Some(status) = parse_rprt(reply) {
        return Err(match status {
            Ok(code) => RotorError::Rprt(code),
            Err(e) => e,
        });
    }

    let mut lines = reply.splitn(3, '\n');
    let az = lines.next().map(str::trim).unwrap_or_default();
    let el = lines.next().map(str::trim).unwrap_or_default();

    match (az.parse::<f64>(), el.parse::<f64>()) {
        (Ok(az), Ok(el)) if az.is_finite() && el.is_finite() => Ok(AzEl::new(az, el)),
        _ => Err(RotorError::Protocol(format!("bad response '{}'", reply.trim()))),
    }
}
