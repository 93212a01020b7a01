// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay serial port.

use crate::config::SerialConfig;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::BufReader;
use std::time::Duration;

/// Read timeout; bounds how long a stop request can go unnoticed.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Open the relay port (8N1, no flow control).
pub fn open(config: &SerialConfig) -> Result<Box<dyn SerialPort>, serialport::Error> {
    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;

    tracing::info!(port = %config.port, baud = config.baud_rate, "Opened serial port");
    Ok(port)
}

/// Open the relay port wrapped for line reads.
pub fn open_buffered(
    config: &SerialConfig,
) -> Result<BufReader<Box<dyn SerialPort>>, serialport::Error> {
    open(config).map(BufReader::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let config = SerialConfig {
            port: "/dev/aria-bridge-no-such-port".into(),
            baud_rate: 115_200,
        };
        assert!(open(&config).is_err());
    }
}
