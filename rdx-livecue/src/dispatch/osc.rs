//! OSC-over-UDP delivery.

use super::{DeviceConfig, DispatchError, Dispatcher};
use crate::common::MatchId;
use crate::components::action::{CueMessage, OscArg};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, warn};

/// Sends cue messages as OSC packets over a single UDP socket.
#[derive(Debug)]
pub struct OscDispatcher {
    socket: UdpSocket,
    devices: HashMap<String, SocketAddr>,
}

impl OscDispatcher {
    /// Binds a local socket and resolves the address of every device.
    pub async fn connect(devices: &[DeviceConfig]) -> Result<Self, DispatchError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(DispatchError::Bind)?;

        let mut resolved = HashMap::with_capacity(devices.len());
        for device in devices {
            let addr = lookup_host(device.address.as_str())
                .await
                .ok()
                .and_then(|mut addrs| addrs.next())
                .ok_or_else(|| DispatchError::Resolve {
                    device: device.name.clone(),
                    address: device.address.clone(),
                })?;
            debug!(device = %device.name, %addr, "Registered OSC device");
            resolved.insert(device.name.clone(), addr);
        }

        Ok(Self {
            socket,
            devices: resolved,
        })
    }

    /// The names of all registered devices.
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }
}

impl Dispatcher for OscDispatcher {
    fn deliver(&self, message: &CueMessage, match_id: MatchId) {
        let Some(addr) = self.devices.get(&message.target) else {
            warn!(device = %message.target, "No such device, dropping message");
            return;
        };
        let packet = encode_message(&message.address, &message.render_args(match_id));
        if let Err(e) = self.socket.try_send_to(&packet, *addr) {
            warn!(device = %message.target, %addr, error = %e, "Failed to send OSC message");
        }
    }
}

/// Encodes an OSC 1.0 message.
pub fn encode_message(address: &str, args: &[OscArg]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(32 + args.len() * 8);
    push_padded_str(&mut packet, address);

    let mut tags = String::with_capacity(args.len() + 1);
    tags.push(',');
    for arg in args {
        tags.push(match arg {
            OscArg::Int(_) => 'i',
            OscArg::Long(_) => 'h',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
        });
    }
    push_padded_str(&mut packet, &tags);

    for arg in args {
        match arg {
            OscArg::Int(i) => packet.extend_from_slice(&i.to_be_bytes()),
            OscArg::Long(i) => packet.extend_from_slice(&i.to_be_bytes()),
            OscArg::Float(f) => packet.extend_from_slice(&f.to_be_bytes()),
            OscArg::Str(s) => push_padded_str(&mut packet, s),
            OscArg::Bool(_) => {}
        }
    }
    packet
}

// OSC strings are null-terminated and padded to a four byte boundary.
fn push_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    let padding = 4 - (s.len() % 4);
    buf.extend(std::iter::repeat(0u8).take(padding));
}
