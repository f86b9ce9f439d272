//! Server configuration
//!
//! All fields have defaults; a host can embed the agent with
//! `ServerConfig::default()` and only override what it needs. The config is
//! serde-deserializable so standalone deployments can load it from TOML.

use serde::Deserialize;

use spyglass_adapter::SerializerLimits;
use spyglass_protocol::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_NETWORK_PORT, DEFAULT_USB_PORT};

/// Which transports the server binds on start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    NetworkOnly,
    UsbOnly,
    Both,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for all listeners
    ///
    /// Loopback by default: the protocol has no authentication, so binding a
    /// routable interface is an explicit decision the host has to make.
    pub bind_address: String,

    /// Port for the network transport
    pub network_port: u16,

    /// Port for the USB-muxed transport
    pub usb_port: u16,

    /// Which transports to bind
    pub transport_mode: TransportMode,

    /// Service name advertised by discovery (discovery itself is external)
    pub service_name: Option<String>,

    /// Maximum frame size, header included
    pub max_message_bytes: usize,

    /// Object-graph serialization limits handed to the adapter
    pub serializer: SerializerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            network_port: DEFAULT_NETWORK_PORT,
            usb_port: DEFAULT_USB_PORT,
            transport_mode: TransportMode::Both,
            service_name: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_SIZE,
            serializer: SerializerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the bind address
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the network transport port
    pub fn with_network_port(mut self, port: u16) -> Self {
        self.network_port = port;
        self
    }

    /// Set the USB-muxed transport port
    pub fn with_usb_port(mut self, port: u16) -> Self {
        self.usb_port = port;
        self
    }

    /// Set the transport mode
    pub fn with_transport_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = mode;
        self
    }

    /// Set the advertised service name
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the maximum frame size
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Listener bind address for the network transport
    pub fn network_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.network_port)
    }

    /// Listener bind address for the USB-muxed transport
    pub fn usb_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.usb_port)
    }
}

/// Serialization limits section
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// How deep linked objects render before collapsing into references
    pub max_depth: u32,

    /// Cap on list and linking-objects items per property
    pub max_list_items: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_list_items: 100,
        }
    }
}

impl SerializerConfig {
    /// Convert to the adapter-side limits type
    pub fn limits(&self) -> SerializerLimits {
        SerializerLimits {
            max_depth: self.max_depth,
            max_list_items: self.max_list_items,
        }
    }
}
