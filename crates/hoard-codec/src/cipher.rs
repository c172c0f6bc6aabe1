//! Stream ciphers applied before table or payload parsing.
//!
//! Key material always comes from game configuration; archives never carry
//! their own keys.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};

use crate::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes.
pub const AES_BLOCK: usize = 16;

/// XOR `data` in place with a repeating key.
///
/// `key_offset` is the key position of `data[0]`, so a buffer can be
/// decrypted in pieces or starting mid-stream.
///
/// ```
/// use hoard_codec::cipher::xor_in_place;
///
/// let mut data = *b"secret";
/// xor_in_place(&mut data, b"key", 0);
/// xor_in_place(&mut data, b"key", 0);
/// assert_eq!(&data, b"secret");
/// ```
pub fn xor_in_place(data: &mut [u8], key: &[u8], key_offset: usize) {
    if key.is_empty() {
        return;
    }
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(key_offset + i) % key.len()];
    }
}

/// Decrypt AES-CBC data in place without padding removal.
///
/// The key length selects AES-128, AES-192 or AES-256. The data length
/// must be a multiple of the block size.
pub fn decrypt_aes_cbc_in_place(data: &mut [u8], key: &[u8], iv: &[u8; AES_BLOCK]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    if data.len() % AES_BLOCK != 0 {
        return Err(Error::Decryption("data length must be a multiple of 16 bytes"));
    }

    let result = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?
            .decrypt_padded_mut::<NoPadding>(data)
            .map(|_| ()),
        24 => Aes192CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?
            .decrypt_padded_mut::<NoPadding>(data)
            .map(|_| ()),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?
            .decrypt_padded_mut::<NoPadding>(data)
            .map(|_| ()),
        other => return Err(Error::InvalidKeyLength(other)),
    };

    result.map_err(|_| Error::Decryption("decryption failed"))
}

/// Decrypt AES-CBC data with a zero IV into a new buffer.
pub fn decrypt_aes_cbc(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = data.to_vec();
    decrypt_aes_cbc_in_place(&mut buffer, key, &[0u8; AES_BLOCK])?;
    Ok(buffer)
}

/// Length of `data` once trailing zero padding is removed.
pub fn trim_zero_padding(data: &[u8]) -> usize {
    data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1)
}
