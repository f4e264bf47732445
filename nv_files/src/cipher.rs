//! Encryption backends for handle files.
//!
//! A backend turns the file at a path into a plaintext byte stream and
//! replaces it from one. Replacement always goes through a temporary file in
//! the same directory that is synced and renamed over the target, so readers
//! see either the old or the new content.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use futures::{Stream, StreamExt, stream};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::{ReaderStream, StreamReader};
use zeroize::Zeroize;

/// Plaintext flowing in or out of a backend.
pub type ByteStream = Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + Unpin + 'static>;

pub const NONCE_LEN: usize = 24;

const KEY_CONTEXT: &str = "notevault/files/xchacha20";

#[async_trait]
pub trait CipherBackend: fmt::Debug + Send + Sync + 'static {
    /// Opens `path` as a plaintext stream. A missing file reads as empty.
    async fn decrypt(&self, path: &Path) -> anyhow::Result<ByteStream>;

    /// Consumes `plaintext`, writes it to a temporary file and renames that
    /// over `path`. Returns the number of plaintext bytes written.
    async fn encrypt_and_swap(&self, path: &Path, plaintext: ByteStream) -> anyhow::Result<u64>;
}

#[async_trait]
impl<T: CipherBackend + ?Sized> CipherBackend for Arc<T> {
    async fn decrypt(&self, path: &Path) -> anyhow::Result<ByteStream> {
        (**self).decrypt(path).await
    }

    async fn encrypt_and_swap(&self, path: &Path, plaintext: ByteStream) -> anyhow::Result<u64> {
        (**self).encrypt_and_swap(path, plaintext).await
    }
}

pub fn empty_stream() -> ByteStream {
    Box::new(stream::empty::<Result<Bytes, io::Error>>())
}

pub fn bytes_stream(bytes: Bytes) -> ByteStream {
    if bytes.is_empty() {
        return empty_stream();
    }
    Box::new(stream::iter([Ok::<_, io::Error>(bytes)]))
}

/// Drains `stream` into one buffer.
pub async fn collect_stream(mut stream: ByteStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

fn temp_dir_for(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Writes `bytes` next to `path` and renames it into place.
async fn swap_in(path: &Path, bytes: Vec<u8>) -> anyhow::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        use std::io::Write;
        let mut temp_file = NamedTempFile::new_in(temp_dir_for(&path))?;
        temp_file.write_all(&bytes)?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&path)
            .with_context(|| format!("while replacing {}", path.display()))?;
        Ok(())
    })
    .await?
}

/// XChaCha20-Poly1305 over the whole file.
///
/// File layout: `nonce (24 bytes) || ciphertext`. A fresh random nonce is
/// drawn on every write.
pub struct XChaChaCipher {
    key: [u8; 32],
}

impl XChaChaCipher {
    pub fn from_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derives the file key from a vault secret with BLAKE3.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::from_key(blake3::derive_key(KEY_CONTEXT, secret))
    }

    fn aead(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(&self.key.into())
    }

    pub fn seal(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead()
            .encrypt(&nonce, plaintext)
            .map_err(|_| anyhow!("encryption failed"))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(anyhow!(
                "ciphertext too short: {} bytes, need at least {NONCE_LEN}",
                sealed.len()
            ));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.aead()
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("decryption failed: wrong key or corrupt file"))
    }
}

impl Drop for XChaChaCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for XChaChaCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XChaChaCipher").finish_non_exhaustive()
    }
}

#[async_trait]
impl CipherBackend for XChaChaCipher {
    async fn decrypt(&self, path: &Path) -> anyhow::Result<ByteStream> {
        let sealed = match tokio::fs::read(path).await {
            Ok(sealed) => sealed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(empty_stream()),
            Err(e) => return Err(e).with_context(|| format!("while reading {}", path.display())),
        };
        if sealed.is_empty() {
            return Ok(empty_stream());
        }
        let plaintext = self
            .open(&sealed)
            .with_context(|| format!("while decrypting {}", path.display()))?;
        Ok(bytes_stream(plaintext.into()))
    }

    async fn encrypt_and_swap(&self, path: &Path, plaintext: ByteStream) -> anyhow::Result<u64> {
        let plaintext = collect_stream(plaintext).await?;
        let sealed = self.seal(&plaintext)?;
        swap_in(path, sealed).await?;
        Ok(plaintext.len() as u64)
    }
}

/// Stores plaintext as-is. Used for unencrypted vaults and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

#[async_trait]
impl CipherBackend for PlaintextCipher {
    async fn decrypt(&self, path: &Path) -> anyhow::Result<ByteStream> {
        match tokio::fs::File::open(path).await {
            Ok(file) => Ok(Box::new(ReaderStream::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(empty_stream()),
            Err(e) => Err(e).with_context(|| format!("while opening {}", path.display())),
        }
    }

    async fn encrypt_and_swap(&self, path: &Path, plaintext: ByteStream) -> anyhow::Result<u64> {
        let dir = temp_dir_for(path);
        let (file, temp_path) = tokio::task::spawn_blocking(move || {
            NamedTempFile::new_in(dir).map(NamedTempFile::into_parts)
        })
        .await??;
        let mut file = tokio::fs::File::from_std(file);
        let mut reader = StreamReader::new(plaintext);
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            temp_path
                .persist(&target)
                .with_context(|| format!("while replacing {}", target.display()))
        })
        .await??;
        Ok(written)
    }
}
