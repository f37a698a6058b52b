use crate::error::{CrawlError, Result};
use crate::models::{Credential, CredentialRecord, ProtectionMethod};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

// Fixed IV: protects a local file only. Changing this string invalidates every
// saved credential.
const IV_SEED: &str = "hw_crawler local credential store";

// Prepended to the plaintext so a wrong factor cannot decrypt into garbage that
// happens to have valid padding.
const PLAINTEXT_MARKER: &str = "hwc1:";

fn derive_key(factor: &str) -> [u8; 32] {
    Sha256::digest(factor.as_bytes()).into()
}

fn derive_iv() -> [u8; 16] {
    let digest = Sha256::digest(IV_SEED.as_bytes());
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}

fn factor_label(method: ProtectionMethod) -> &'static str {
    match method {
        ProtectionMethod::Pin => "pin",
        _ => "password",
    }
}

/// Check a pin or password against the formats the credential prompt accepts.
pub fn validate_factor(method: ProtectionMethod, factor: &str) -> bool {
    match method {
        ProtectionMethod::None => true,
        ProtectionMethod::Pin => factor.len() == 4 && factor.chars().all(|c| c.is_ascii_digit()),
        ProtectionMethod::Password => {
            !factor.is_empty() && factor.chars().all(|c| c.is_ascii_alphanumeric())
        }
    }
}

/// Encrypt `secret` for storage. `ProtectionMethod::None` returns it unchanged.
pub fn protect(secret: &str, method: ProtectionMethod, factor: &str) -> Result<String> {
    if method == ProtectionMethod::None {
        return Ok(secret.to_string());
    }

    let key = derive_key(factor);
    let iv = derive_iv();
    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|e| CrawlError::Config(format!("cipher setup failed: {}", e)))?;

    let plaintext = format!("{}{}", PLAINTEXT_MARKER, secret);
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}

/// Decrypt a stored secret. A wrong `factor` yields `CrawlError::Decrypt`.
pub fn reveal(ciphertext: &str, method: ProtectionMethod, factor: &str) -> Result<String> {
    if method == ProtectionMethod::None {
        return Ok(ciphertext.to_string());
    }
    let wrong_factor = || CrawlError::Decrypt(factor_label(method));

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| wrong_factor())?;

    let key = derive_key(factor);
    let iv = derive_iv();
    let cipher = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| CrawlError::Config(format!("cipher setup failed: {}", e)))?;

    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
        .map_err(|_| wrong_factor())?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| wrong_factor())?;

    plaintext
        .strip_prefix(PLAINTEXT_MARKER)
        .map(str::to_string)
        .ok_or_else(wrong_factor)
}

/// On-disk credential record at `<state_dir>/creds.json`.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Credential store under `state_dir`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("creds.json"),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the record without decrypting it. A file in any other layout is a
    /// format error, never a wrong factor.
    pub fn load(&self) -> Result<CredentialRecord> {
        let text = std::fs::read_to_string(&self.path)?;
        let record: CredentialRecord = serde_json::from_str(&text)?;
        if record.identity.is_empty() {
            return Err(CrawlError::Config(format!(
                "{} has no identity",
                self.path.display()
            )));
        }
        Ok(record)
    }

    /// Encrypt and persist `credential`.
    pub fn save(&self, credential: &Credential, method: ProtectionMethod, factor: &str) -> Result<()> {
        let record = CredentialRecord {
            method,
            identity: credential.identity.clone(),
            secret: protect(&credential.secret, method, factor)?,
        };
        crate::store::write_json(&self.path, &record)
    }

    /// Load the record and decrypt it with `factor` (ignored for `None`).
    pub fn unlock(&self, factor: &str) -> Result<Credential> {
        let record = self.load()?;
        let secret = reveal(&record.secret, record.method, factor)?;
        Ok(Credential {
            identity: record.identity,
            secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_pin_and_password() {
        for (method, factor) in [
            (ProtectionMethod::Pin, "4821"),
            (ProtectionMethod::Password, "hunter2"),
        ] {
            let secret = "correct horse battery staple";
            let sealed = protect(secret, method, factor).unwrap();
            assert_ne!(sealed, secret);
            assert_eq!(reveal(&sealed, method, factor).unwrap(), secret);
        }
    }

    #[test]
    fn test_wrong_factor_is_distinguishable() {
        let sealed = protect("s3cret", ProtectionMethod::Pin, "1234").unwrap();
        for wrong in ["1235", "0000", "9999"] {
            let err = reveal(&sealed, ProtectionMethod::Pin, wrong).unwrap_err();
            assert!(matches!(err, CrawlError::Decrypt("pin")));
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_none_stores_plaintext() {
        let sealed = protect("plain", ProtectionMethod::None, "").unwrap();
        assert_eq!(sealed, "plain");
        assert_eq!(reveal(&sealed, ProtectionMethod::None, "ignored").unwrap(), "plain");
    }

    #[test]
    fn test_validate_factor() {
        assert!(validate_factor(ProtectionMethod::Pin, "0042"));
        assert!(!validate_factor(ProtectionMethod::Pin, "42"));
        assert!(!validate_factor(ProtectionMethod::Pin, "abcd"));
        assert!(validate_factor(ProtectionMethod::Password, "abc123"));
        assert!(!validate_factor(ProtectionMethod::Password, ""));
        assert!(!validate_factor(ProtectionMethod::Password, "with space"));
    }

    #[test]
    fn test_store_save_and_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        assert!(!store.exists());

        let credential = Credential {
            identity: "teacher@school.org".into(),
            secret: "portal-pass".into(),
        };
        store.save(&credential, ProtectionMethod::Password, "vault1").unwrap();
        assert!(store.exists());

        let raw = std::fs::read_to_string(dir.path().join("creds.json")).unwrap();
        assert!(!raw.contains("portal-pass"));

        let unlocked = store.unlock("vault1").unwrap();
        assert_eq!(unlocked.identity, "teacher@school.org");
        assert_eq!(unlocked.secret, "portal-pass");
        assert!(matches!(store.unlock("vault2"), Err(CrawlError::Decrypt(_))));
    }

    #[test]
    fn test_foreign_record_layout_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("creds.json"),
            r#"{"method":"pwd","email":"teacher@school.org","password":"9f86d081884c7d65"}"#,
        )
        .unwrap();
        let store = CredentialStore::new(dir.path());
        assert!(store.exists());
        assert!(matches!(store.load(), Err(CrawlError::Json(_))));
        assert!(matches!(store.unlock("1234"), Err(CrawlError::Json(_))));
    }
}
