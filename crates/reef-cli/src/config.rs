//! Password-protected identity files.
//!
//! ```text
//! [32 bytes: salt][u32 BE m_cost][u32 BE t_cost][u32 BE p_cost][cipher stream]
//! ```
//!
//! The cipher stream carries the JSON form of [`IdentityConfig`], written
//! through a [`CipherWriter`] whose key is Argon2id over the password and
//! salt, then `blake3::derive_key` for domain separation. Loading runs the
//! stream back through a [`CipherReader`], so a wrong password fails
//! authentication of the first chunk.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use reef_crypto::{CipherReader, CipherWriter, CryptoError, Identity, StreamKey, DEFAULT_CHUNK_SIZE};
use reef_types::{Section, SliceReader};
use serde::{Deserialize, Serialize};

/// Current identity file format.
pub const CONFIG_VERSION: u32 = 1;

const KEY_CONTEXT: &str = "reef 2024-01-01 identity file password key";

const SALT_LEN: usize = 32;
const PREAMBLE_LEN: u64 = SALT_LEN as u64 + 12;

/// Upper bound on the memory cost accepted from a file (1 GiB in KiB).
const MAX_M_COST: u32 = 1024 * 1024;

/// Argon2id cost parameters, stored in the file next to the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 64 * 1024,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl KdfParams {
    fn to_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..4].copy_from_slice(&self.m_cost.to_be_bytes());
        out[4..8].copy_from_slice(&self.t_cost.to_be_bytes());
        out[8..].copy_from_slice(&self.p_cost.to_be_bytes());
        out
    }

    fn from_bytes(raw: &[u8; 12]) -> Self {
        let word = |i: usize| u32::from_be_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Self {
            m_cost: word(0),
            t_cost: word(4),
            p_cost: word(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub version: u32,
    pub identity: Identity,
}

impl IdentityConfig {
    pub fn new(identity: Identity) -> Self {
        Self {
            version: CONFIG_VERSION,
            identity,
        }
    }

    /// Write to a new file at `path`. Never overwrites; a partially written
    /// file is removed.
    pub fn save(&self, path: &Path, password: &str) -> Result<()> {
        self.save_with(path, password, KdfParams::default())
    }

    pub fn save_with(&self, path: &Path, password: &str, params: KdfParams) -> Result<()> {
        let file = create_private(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let result = self.write_sealed(file, password, params);
        if result.is_err() {
            let _ = fs::remove_file(path);
        }
        result.with_context(|| format!("failed to write {}", path.display()))
    }

    fn write_sealed(&self, mut file: File, password: &str, params: KdfParams) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        rand::Rng::fill(&mut rand::rngs::OsRng, &mut salt);
        let key = password_key(password, &salt, params)?;

        file.write_all(&salt)?;
        file.write_all(&params.to_bytes())?;
        let mut writer = CipherWriter::with_random_nonce(file, &key, DEFAULT_CHUNK_SIZE)?;
        serde_json::to_writer(&mut writer, self)?;
        writer.finish()?;
        let file = writer.into_inner();
        file.sync_all()?;
        Ok(())
    }

    /// Read and decrypt the file at `path`.
    pub fn load(path: &Path, password: &str) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let len = SliceReader::len(&file)?;
        if len < PREAMBLE_LEN {
            bail!("{} is not an identity file", path.display());
        }
        let mut salt = [0u8; SALT_LEN];
        let mut raw_params = [0u8; 12];
        file.read_exact_at(0, &mut salt)?;
        file.read_exact_at(SALT_LEN as u64, &mut raw_params)?;
        let params = KdfParams::from_bytes(&raw_params);
        let key = password_key(password, &salt, params)
            .with_context(|| format!("{} has unusable key parameters", path.display()))?;

        let stream = Section::new(file, PREAMBLE_LEN, len - PREAMBLE_LEN);
        let reader = CipherReader::new(stream, &key, DEFAULT_CHUNK_SIZE as u64)
            .with_context(|| format!("{} is not an identity file", path.display()))?;
        let plain = Section::full(reader)
            .and_then(|section| section.read_to_vec())
            .map_err(|e| match CryptoError::from_io(e) {
                CryptoError::ChunkAuthentication { .. } => {
                    anyhow!("wrong password or damaged identity file {}", path.display())
                }
                other => anyhow::Error::new(other),
            })?;
        let config: IdentityConfig = serde_json::from_slice(&plain)
            .with_context(|| format!("invalid identity file {}", path.display()))?;
        if config.version != CONFIG_VERSION {
            bail!(
                "identity file {} has version {}, expected {CONFIG_VERSION}",
                path.display(),
                config.version
            );
        }
        Ok(config)
    }
}

/// Argon2id(password, salt), then a BLAKE3 context derivation.
fn password_key(password: &str, salt: &[u8; SALT_LEN], params: KdfParams) -> Result<StreamKey> {
    if params.m_cost > MAX_M_COST {
        bail!("memory cost {} KiB exceeds {MAX_M_COST}", params.m_cost);
    }
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| anyhow!("invalid key parameters: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut stretched = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut stretched)
        .map_err(|e| anyhow!("key derivation failed: {e}"))?;
    Ok(StreamKey::from_bytes(blake3::derive_key(KEY_CONTEXT, &stretched)))
}

fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
