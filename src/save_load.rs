use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::brain::network::{Layer, Network};
use crate::brain::{PolicyError, PolicyKind};

const SNAPSHOT_VERSION_V1: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct PolicySnapshotV1 {
    version: u32,
    kind: PolicyKind,
    layers: Vec<Layer>,
}

impl PolicySnapshotV1 {
    fn from_network(network: &Network, kind: PolicyKind) -> Self {
        Self {
            version: SNAPSHOT_VERSION_V1,
            kind,
            layers: network.layers().to_vec(),
        }
    }

    fn restore(self) -> Result<(PolicyKind, Network), PolicyError> {
        if self.version != SNAPSHOT_VERSION_V1 {
            return Err(PolicyError::Version(self.version));
        }
        let network = Network::from_layers(self.layers).map_err(PolicyError::Corrupt)?;
        Ok((self.kind, network))
    }
}

pub fn encode_network(network: &Network, kind: PolicyKind) -> Result<Vec<u8>, PolicyError> {
    Ok(bincode::serialize(&PolicySnapshotV1::from_network(network, kind))?)
}

pub fn decode_network(bytes: &[u8]) -> Result<(PolicyKind, Network), PolicyError> {
    bincode::deserialize::<PolicySnapshotV1>(bytes)?.restore()
}

/// Save a network's parameters to a file.
pub fn save_network(network: &Network, kind: PolicyKind, path: &Path) -> Result<(), PolicyError> {
    let bytes = encode_network(network, kind)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| PolicyError::Io {
            path: dir.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Load network parameters from a file.
pub fn load_network(path: &Path) -> Result<(PolicyKind, Network), PolicyError> {
    let bytes = std::fs::read(path).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    decode_network(&bytes)
}
