use anyhow::Result;

use crate::config::LogLevel;

/// install the global logger at `level`. Must be called once, before any
/// [`crate::client::RadiusClient`] is constructed.
pub fn init(level: LogLevel) -> Result<()> {
    simple_logger::init_with_level(level.as_level())?;
    Ok(())
}
