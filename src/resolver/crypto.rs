//! Encoding, hashing and cipher helpers used by the `__base64`, `__sha`,
//! `__md5`, `__hmac`, `__aes` and `__rsa` template functions.
//!
//! Every helper returns text: hex for digests, standard Base64 for binary
//! cipher output. Bad keys or ciphertext surface as argument errors so the
//! enclosing step fails with a readable message.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha512};

use crate::errors::{FlowpulseError, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Fixed IV shared with the services under test
const AES_IV: [u8; 16] = *b"1234567890123456";

fn arg_err(func: &str, msg: impl std::fmt::Display) -> FlowpulseError {
    FlowpulseError::Argument(format!("{}: {}", func, msg))
}

pub fn base64_encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

pub fn base64_decode(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| arg_err("base64", format!("invalid input: {}", e)))?;
    String::from_utf8(bytes).map_err(|_| arg_err("base64", "decoded bytes are not UTF-8"))
}

/// Compute SHA-256 hash and return as hex string
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Compute SHA-512 hash and return as hex string
pub fn sha512_hex(text: &str) -> String {
    hex::encode(Sha512::digest(text.as_bytes()))
}

pub fn md5_hex(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

pub fn hmac_hex(text: &str, key: &str, bits: u16) -> Result<String> {
    let out = match bits {
        512 => {
            let mut mac = HmacSha512::new_from_slice(key.as_bytes())
                .map_err(|e| arg_err("hmac", e))?;
            mac.update(text.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        _ => {
            let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                .map_err(|e| arg_err("hmac", e))?;
            mac.update(text.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(hex::encode(out))
}

/// Key bytes truncated or zero-padded to 16
fn aes_key(key: &str) -> [u8; 16] {
    let mut padded = [0u8; 16];
    let bytes = key.as_bytes();
    let n = bytes.len().min(16);
    padded[..n].copy_from_slice(&bytes[..n]);
    padded
}

/// AES-128-CBC with PKCS#7 padding, Base64 output
pub fn aes_encrypt(plain: &str, key: &str) -> String {
    let key = aes_key(key);
    let encrypted = Aes128CbcEnc::new(&key.into(), &AES_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
    STANDARD.encode(encrypted)
}

pub fn aes_decrypt(cipher_text: &str, key: &str) -> Result<String> {
    let key = aes_key(key);
    let bytes = STANDARD
        .decode(cipher_text.trim())
        .map_err(|e| arg_err("aes", format!("ciphertext is not Base64: {}", e)))?;
    let plain = Aes128CbcDec::new(&key.into(), &AES_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
        .map_err(|_| arg_err("aes", "decryption failed (wrong key or corrupt data)"))?;
    String::from_utf8(plain).map_err(|_| arg_err("aes", "plaintext is not UTF-8"))
}

fn decode_key(func: &str, key: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(key.trim())
        .map_err(|e| arg_err(func, format!("key is not Base64: {}", e)))
}

fn public_key(key: &str) -> Result<RsaPublicKey> {
    let der = decode_key("rsa", key)?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| arg_err("rsa", format!("bad public key: {}", e)))
}

fn private_key(key: &str) -> Result<RsaPrivateKey> {
    let der = decode_key("rsa", key)?;
    RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| arg_err("rsa", format!("bad private key: {}", e)))
}

/// RSA PKCS#1 v1.5 encryption with an X.509 (SPKI) public key
pub fn rsa_encrypt(plain: &str, public_key_b64: &str) -> Result<String> {
    let key = public_key(public_key_b64)?;
    let mut rng = rsa::rand_core::OsRng;
    let encrypted = key
        .encrypt(&mut rng, Pkcs1v15Encrypt, plain.as_bytes())
        .map_err(|e| arg_err("rsa", format!("encryption failed: {}", e)))?;
    Ok(STANDARD.encode(encrypted))
}

/// RSA PKCS#1 v1.5 decryption with a PKCS#8 private key
pub fn rsa_decrypt(cipher_text: &str, private_key_b64: &str) -> Result<String> {
    let key = private_key(private_key_b64)?;
    let bytes = STANDARD
        .decode(cipher_text.trim())
        .map_err(|e| arg_err("rsa", format!("ciphertext is not Base64: {}", e)))?;
    let plain = key
        .decrypt(Pkcs1v15Encrypt, &bytes)
        .map_err(|e| arg_err("rsa", format!("decryption failed: {}", e)))?;
    String::from_utf8(plain).map_err(|_| arg_err("rsa", "plaintext is not UTF-8"))
}

/// SHA256withRSA signature, Base64 encoded
pub fn rsa_sign(data: &str, private_key_b64: &str) -> Result<String> {
    let key = private_key(private_key_b64)?;
    let signing_key = SigningKey::<Sha256>::new(key);
    let signature = signing_key.sign(data.as_bytes());
    Ok(STANDARD.encode(signature.to_vec()))
}
