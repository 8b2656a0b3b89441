use crate::crypto::envelope::EncryptionAlgorithm;
use crate::errors::{KeyError, KeyResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric master key protecting one encrypted overlay instance.
///
/// Material is wiped on drop and redacted from debug output. The key id is
/// carried in every envelope so records can outlive a future rotation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    kid: String,
    material: Vec<u8>,
    #[zeroize(skip)]
    created_at: u64,
}

impl MasterKey {
    pub fn new(kid: impl Into<String>, material: Vec<u8>, created_at: u64) -> Self {
        Self {
            kid: kid.into(),
            material,
            created_at,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// Creation time as seconds since the Unix epoch.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("kid", &self.kid)
            .field("material", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// On-disk key file, shaped like a symmetric JWK.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    kid: String,
    alg: String,
    k: String,
    created_at: u64,
}

/// Load the master key from `path`, or generate and persist one.
///
/// - File present: parse and validate against `algorithm`; `KeyCorrupt`-class
///   failures abort startup.
/// - File absent with `auto_generate`: produce CSPRNG material, write it to a
///   temp file with owner-only permissions, and publish it with atomic
///   create-if-absent semantics. If another process wins the race the freshly
///   generated key is discarded and the winner's file is loaded instead.
/// - File absent without `auto_generate`: fail with [`KeyError::Missing`].
pub fn load_or_create(
    path: &Path,
    algorithm: EncryptionAlgorithm,
    auto_generate: bool,
) -> KeyResult<MasterKey> {
    match fs::read(path) {
        Ok(bytes) => parse_key_file(path, &bytes, algorithm),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if !auto_generate {
                return Err(KeyError::Missing(path.to_path_buf()));
            }
            generate_key_file(path, algorithm)
        }
        Err(err) => Err(KeyError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

fn parse_key_file(path: &Path, bytes: &[u8], algorithm: EncryptionAlgorithm) -> KeyResult<MasterKey> {
    let corrupt = |reason: String| KeyError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let file: KeyFile = serde_json::from_slice(bytes).map_err(|err| corrupt(err.to_string()))?;

    let file_algorithm: EncryptionAlgorithm =
        file.alg.parse().map_err(|_| corrupt(format!("unknown algorithm {}", file.alg)))?;
    if file_algorithm != algorithm {
        return Err(corrupt(format!(
            "key was generated for {file_algorithm}, store is configured for {algorithm}"
        )));
    }

    let material = STANDARD
        .decode(file.k.as_bytes())
        .map_err(|err| corrupt(format!("key material is not valid base64: {err}")))?;
    if material.len() != algorithm.key_len() {
        return Err(corrupt(format!(
            "key material is {} bytes, {algorithm} requires {}",
            material.len(),
            algorithm.key_len()
        )));
    }

    Ok(MasterKey::new(file.kid, material, file.created_at))
}

fn generate_key_file(path: &Path, algorithm: EncryptionAlgorithm) -> KeyResult<MasterKey> {
    let io_err = |source: std::io::Error| KeyError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut rng = rand::thread_rng();
    let mut material = vec![0u8; algorithm.key_len()];
    rng.fill_bytes(&mut material);

    let mut kid_bytes = [0u8; 16];
    rng.fill_bytes(&mut kid_bytes);
    let kid: String = kid_bytes.iter().map(|b| format!("{b:02x}")).collect();

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let file = KeyFile {
        kid: kid.clone(),
        alg: algorithm.as_str().to_string(),
        k: STANDARD.encode(&material),
        created_at,
    };
    let contents = serde_json::to_vec_pretty(&file).map_err(|err| KeyError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let tmp = temp_path(path, &kid);
    write_owner_only(&tmp, &contents).map_err(io_err)?;

    // Publish via hard link: creation fails if the key file already exists,
    // which settles a race between two first-time startups in favour of
    // whichever process linked first.
    match fs::hard_link(&tmp, path) {
        Ok(()) => {
            let _ = fs::remove_file(&tmp);
            Ok(MasterKey::new(kid, material, created_at))
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = fs::remove_file(&tmp);
            let bytes = fs::read(path).map_err(io_err)?;
            parse_key_file(path, &bytes, algorithm)
        }
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(io_err(err))
        }
    }
}

fn temp_path(path: &Path, kid: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "master-key".into());
    path.with_file_name(format!(".{name}.{kid}.tmp"))
}

fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
