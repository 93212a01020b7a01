// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TWELITE ARIA Relay Bridge
//!
//! Reads ARIA sensor reports from a serial-attached relay and publishes
//! them as JSON to a cloud messaging channel.
//!
//! # Features
//!
//! - **Frame Decoding**: Fixed-layout ARIA frames to typed [`SensorFrame`]s
//! - **JWT-Bearer Auth**: RS256 client assertions exchanged for bearer tokens
//! - **Token Caching**: Refresh only when the cached token nears expiry
//! - **Resilient Ingest**: Malformed lines and failed publishes are logged and skipped
//!
//! # Quick Start
//!
//! ```bash
//! # Bridge a relay on /dev/ttyUSB0 to a channel
//! aria-bridge -p /dev/ttyUSB0 -i my-device -c 0123456789abcdefghij -k ./jwtRS256.key
//!
//! # Using config file
//! aria-bridge --config bridge.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [cloud]
//! client_id = "my-device"
//! channel_id = "0123456789abcdefghij"
//! private_key_path = "./jwtRS256.key"
//! ```

pub mod assertion;
pub mod bridge;
pub mod config;
pub mod frame;
pub mod http;
pub mod line;
pub mod publish;
pub mod serial;
pub mod token;

pub use assertion::{sign_assertion, AssertionClaims, SigningKey};
pub use bridge::{Bridge, BridgeError, BridgeStats, BridgeStatsSnapshot, FramePublisher, StopHandle};
pub use config::{BridgeConfig, ChannelId, CloudConfig, ConfigError, SerialConfig};
pub use frame::{
    FrameError, MagnetismEvent, MagnetismState, PacketProperty, SensorFrame, WakeFactor,
    WakeFactorSource,
};
pub use http::{HttpBody, HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor, TransportError};
pub use line::decode_line;
pub use publish::{ErrorsBody, MessagingClient, PublishError};
pub use token::{AuthError, TokenManager};
